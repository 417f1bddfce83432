use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub initial_jitter_ms: u64,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            initial_jitter_ms: 500,
            timeout_secs: 30,
        }
    }
}

impl FetchConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Header values sent with every request so the site serves the regular desktop page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapingConfig {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathsConfig {
    pub leagues_file: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            leagues_file: PathBuf::from("leagues.csv"),
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistConfig {
    /// Rewrite the league table after every team instead of once per league.
    pub flush_each_team: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScraperConfig {
    pub fetch: FetchConfig,
    pub scraping: ScrapingConfig,
    pub paths: PathsConfig,
    pub persist: PersistConfig,
}

fn parsed_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl ScraperConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(retries) = parsed_var("SCRAPER_MAX_RETRIES") {
            config.fetch.max_retries = retries;
        }
        if let Some(delay) = parsed_var("SCRAPER_BASE_DELAY_MS") {
            config.fetch.base_delay_ms = delay;
        }
        if let Some(jitter) = parsed_var("SCRAPER_INITIAL_JITTER_MS") {
            config.fetch.initial_jitter_ms = jitter;
        }
        if let Some(timeout) = parsed_var("SCRAPER_TIMEOUT_SECS") {
            config.fetch.timeout_secs = timeout;
        }
        if let Ok(user_agent) = env::var("SCRAPER_USER_AGENT") {
            config.scraping.user_agent = user_agent;
        }
        if let Ok(path) = env::var("SCRAPER_LEAGUES_FILE") {
            config.paths.leagues_file = PathBuf::from(path);
        }
        if let Ok(path) = env::var("SCRAPER_OUTPUT_DIR") {
            config.paths.output_dir = PathBuf::from(path);
        }
        if let Some(flush) = parsed_var("SCRAPER_FLUSH_EACH_TEAM") {
            config.persist.flush_each_team = flush;
        }

        config
    }
}
