pub mod assets;
pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod harvester;
pub mod normalize;
pub mod roster;
pub mod scores;
pub mod store;
pub mod types;
