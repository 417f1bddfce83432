use std::{
    collections::{HashMap, HashSet},
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{assets::AssetKind, normalize::normalize, types::PlayerRecord};

const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write table {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Reads a table file, dropping a leading byte-order mark if present.
pub fn read_table_text(path: &Path) -> io::Result<String> {
    let text = fs::read_to_string(path)?;
    Ok(match text.strip_prefix(UTF8_BOM) {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

/// Creates a CSV writer that prefixes the file with a UTF-8 BOM so
/// spreadsheet tools keep non-ASCII names intact.
pub fn create_table_writer(path: &Path) -> io::Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(UTF8_BOM.as_bytes())?;
    Ok(csv::Writer::from_writer(file))
}

/// Previously persisted state for one league.
#[derive(Debug, Default)]
pub struct ExistingTable {
    pub records: Vec<PlayerRecord>,
    pub covered_teams: HashSet<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PersistOutcome {
    Written {
        path: PathBuf,
        rows: usize,
        duplicate_ids: Vec<String>,
    },
    NoData,
}

/// Owns the on-disk layout: `<root>/<league>/<league>_players.csv` plus the
/// asset directories next to it.
#[derive(Debug, Clone)]
pub struct LeagueStore {
    root: PathBuf,
}

impl LeagueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn league_slug(league: &str) -> String {
        normalize(league)
    }

    pub fn league_dir(&self, league: &str) -> PathBuf {
        self.root.join(Self::league_slug(league))
    }

    pub fn table_path(&self, league: &str) -> PathBuf {
        self.league_dir(league)
            .join(format!("{}_players.csv", Self::league_slug(league)))
    }

    pub fn scored_table_path(&self, league: &str) -> PathBuf {
        self.league_dir(league)
            .join(format!("{}_players_with_scor.csv", Self::league_slug(league)))
    }

    /// Creates the league directory and its asset subdirectories.
    pub fn prepare(&self, league: &str) -> Result<PathBuf, StoreError> {
        let dir = self.league_dir(league);
        for kind in [AssetKind::TeamLogo, AssetKind::PlayerImage] {
            let sub = dir.join(kind.dir_name());
            fs::create_dir_all(&sub).map_err(|source| StoreError::Io { path: sub, source })?;
        }
        Ok(dir)
    }

    /// Best effort: a missing or unreadable table is treated as a clean start.
    pub fn load(&self, league: &str) -> ExistingTable {
        let path = self.table_path(league);
        if !path.exists() {
            info!("No existing table for {} at {:?}, starting fresh", league, path);
            return ExistingTable::default();
        }

        let records = read_table_text(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| {
                csv::Reader::from_reader(text.as_bytes())
                    .deserialize()
                    .collect::<Result<Vec<PlayerRecord>, _>>()
                    .map_err(|e| e.to_string())
            });

        match records {
            Ok(records) => {
                let covered_teams: HashSet<String> = records.iter().map(|r| r.team.clone()).collect();
                info!(
                    "Loaded {} existing rows for {} covering {} teams",
                    records.len(),
                    league,
                    covered_teams.len()
                );
                ExistingTable { records, covered_teams }
            }
            Err(e) => {
                warn!("Could not read existing table {:?} ({}), starting fresh", path, e);
                ExistingTable::default()
            }
        }
    }

    /// Writes `existing` followed by `new`. Rows are not deduplicated; repeated
    /// player IDs are reported in the outcome and logged.
    pub fn persist(&self, league: &str, existing: &[PlayerRecord], new: &[PlayerRecord]) -> Result<PersistOutcome, StoreError> {
        if existing.is_empty() && new.is_empty() {
            warn!("No data was collected for {}", league);
            return Ok(PersistOutcome::NoData);
        }

        let path = self.table_path(league);
        let io_error = |source| StoreError::Io { path: path.clone(), source };
        let csv_error = |source| StoreError::Csv { path: path.clone(), source };

        let mut wtr = create_table_writer(&path).map_err(io_error)?;
        for record in existing.iter().chain(new) {
            wtr.serialize(record).map_err(csv_error)?;
        }
        wtr.flush().map_err(io_error)?;

        let duplicate_ids = duplicate_ids(existing.iter().chain(new));
        if !duplicate_ids.is_empty() {
            warn!(
                "{} player IDs appear more than once in {:?}: {}",
                duplicate_ids.len(),
                path,
                duplicate_ids.join(", ")
            );
        }

        let rows = existing.len() + new.len();
        info!("Saved {} rows ({} new) for {} to {:?}", rows, new.len(), league, path);
        Ok(PersistOutcome::Written { path, rows, duplicate_ids })
    }
}

fn duplicate_ids<'a>(records: impl Iterator<Item = &'a PlayerRecord>) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    for record in records {
        let count = counts.entry(record.player_id.as_str()).or_insert(0);
        *count += 1;
        if *count == 2 {
            order.push(record.player_id.clone());
        }
    }
    order
}
