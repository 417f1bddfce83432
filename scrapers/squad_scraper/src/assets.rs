use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use crate::fetcher::{Fetcher, HttpTransport, Sleeper};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    TeamLogo,
    PlayerImage,
}

impl AssetKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            AssetKind::TeamLogo => "team_logos",
            AssetKind::PlayerImage => "player_images",
        }
    }

    pub fn default_extension(self) -> &'static str {
        match self {
            AssetKind::TeamLogo => ".png",
            AssetKind::PlayerImage => ".jpg",
        }
    }
}

/// Extension of the last path segment, ignoring query string and fragment.
pub fn extension_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let without_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
    let (_, segment) = without_scheme.rsplit_once('/')?;
    Path::new(segment)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
}

/// Entity IDs come from scraped text; anything outside `[A-Za-z0-9_-]` becomes
/// `_` so the name stays a single path component.
pub fn file_stem(entity_id: &str) -> String {
    entity_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

pub fn asset_file_name(entity_id: &str, url: &str, kind: AssetKind) -> String {
    let extension = extension_from_url(url).unwrap_or_else(|| kind.default_extension().to_string());
    format!("{}{}", file_stem(entity_id), extension)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Downloads logos and portraits into a league directory. A file already on
/// disk is never fetched again.
pub struct AssetDownloader<'a, T, S> {
    fetcher: &'a Fetcher<T, S>,
}

impl<'a, T: HttpTransport, S: Sleeper> AssetDownloader<'a, T, S> {
    pub fn new(fetcher: &'a Fetcher<T, S>) -> Self {
        Self { fetcher }
    }

    pub fn maybe_download(&self, url: &str, dest: &Path) -> Option<PathBuf> {
        if dest.exists() {
            debug!("Asset already present at {:?}, skipping download", dest);
            return Some(dest.to_path_buf());
        }

        let response = match self.fetcher.fetch(url) {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to download {}: {}", url, e);
                return None;
            }
        };
        if !response.is_success() {
            warn!("Failed to download {}: HTTP {}", url, response.status);
            return None;
        }

        if let Some(parent) = dest.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create {:?}: {}", parent, e);
                return None;
            }
        }
        // Written aside and renamed so an interrupted write never looks complete.
        let partial = partial_path(dest);
        match fs::write(&partial, &response.body).and_then(|()| fs::rename(&partial, dest)) {
            Ok(()) => {
                info!("Downloaded {} to {:?}", url, dest);
                Some(dest.to_path_buf())
            }
            Err(e) => {
                warn!("Failed to write {:?}: {}", dest, e);
                let _ = fs::remove_file(&partial);
                None
            }
        }
    }

    /// Returns the stored file name (relative to the asset directory) when the
    /// asset is available locally after the call.
    pub fn download_for(&self, url: Option<&str>, league_dir: &Path, entity_id: &str, kind: AssetKind) -> Option<String> {
        let url = url?;
        let file_name = asset_file_name(entity_id, url, kind);
        let asset_dir = league_dir.join(kind.dir_name());
        let dest = asset_dir.join(&file_name);
        if dest.parent() != Some(asset_dir.as_path()) {
            warn!("Refusing to store {} outside {:?}", file_name, asset_dir);
            return None;
        }
        self.maybe_download(url, &dest).map(|_| file_name)
    }
}
