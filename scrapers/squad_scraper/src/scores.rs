use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::store::{create_table_writer, read_table_text, LeagueStore};

pub const KEY_COLUMN: &str = "PlayerID";
pub const SCORE_COLUMN: &str = "Scor";

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("{0:?} not found")]
    MissingTable(PathBuf),
    #[error("{path:?} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error in {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeSummary {
    pub total: usize,
    pub with_score: usize,
    pub without_score: usize,
    /// Min, max and mean over scores that parse as numbers.
    pub score_stats: Option<(f64, f64, f64)>,
}

struct Table {
    headers: csv::StringRecord,
    rows: Vec<csv::StringRecord>,
}

fn read_table(path: &Path) -> Result<Table, ScoreError> {
    if !path.exists() {
        return Err(ScoreError::MissingTable(path.to_path_buf()));
    }
    let csv_error = |source| ScoreError::Csv { path: path.to_path_buf(), source };
    let text = read_table_text(path).map_err(|source| ScoreError::Io { path: path.to_path_buf(), source })?;

    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(text.as_bytes());
    let headers = rdr.headers().map_err(csv_error)?.clone();
    let rows = rdr.records().collect::<Result<Vec<_>, _>>().map_err(csv_error)?;
    Ok(Table { headers, rows })
}

fn column(table: &Table, path: &Path, name: &'static str) -> Result<usize, ScoreError> {
    table
        .headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| ScoreError::MissingColumn { path: path.to_path_buf(), column: name })
}

/// Left join of `players` with `scores` on `PlayerID`: every player row is kept
/// in order, with a `Scor` column appended that is empty when no score matches.
/// The output carries the same UTF-8 BOM as the league tables.
pub fn merge_scores(players: &Path, scores: &Path, output: &Path) -> Result<MergeSummary, ScoreError> {
    let player_table = read_table(players)?;
    let score_table = read_table(scores)?;
    let player_key = column(&player_table, players, KEY_COLUMN)?;
    let score_key = column(&score_table, scores, KEY_COLUMN)?;
    let score_value = column(&score_table, scores, SCORE_COLUMN)?;

    let lookup: HashMap<&str, &str> = score_table
        .rows
        .iter()
        .filter_map(|row| Some((row.get(score_key)?.trim(), row.get(score_value)?.trim())))
        .filter(|(_, score)| !score.is_empty())
        .collect();
    info!("Found {} players in {:?} and {} scores in {:?}", player_table.rows.len(), players, lookup.len(), scores);

    let io_error = |source| ScoreError::Io { path: output.to_path_buf(), source };
    let csv_error = |source| ScoreError::Csv { path: output.to_path_buf(), source };
    let mut wtr = create_table_writer(output).map_err(io_error)?;

    let mut headers = player_table.headers.clone();
    headers.push_field(SCORE_COLUMN);
    wtr.write_record(&headers).map_err(csv_error)?;

    let mut with_score = 0;
    let mut numeric = Vec::new();
    for row in &player_table.rows {
        let score = row.get(player_key).and_then(|id| lookup.get(id.trim()).copied());
        if let Some(score) = score {
            with_score += 1;
            if let Ok(value) = score.parse::<f64>() {
                numeric.push(value);
            }
        }
        let mut merged = row.clone();
        merged.push_field(score.unwrap_or(""));
        wtr.write_record(&merged).map_err(csv_error)?;
    }
    wtr.flush().map_err(io_error)?;

    let score_stats = if numeric.is_empty() {
        None
    } else {
        let min = numeric.iter().copied().fold(f64::INFINITY, f64::min);
        let max = numeric.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = numeric.iter().sum::<f64>() / numeric.len() as f64;
        Some((min, max, mean))
    };

    let summary = MergeSummary {
        total: player_table.rows.len(),
        with_score,
        without_score: player_table.rows.len() - with_score,
        score_stats,
    };
    info!(
        "Merged scores into {:?}: {} with score, {} without, {} total",
        output, summary.with_score, summary.without_score, summary.total
    );
    if let Some((min, max, mean)) = summary.score_stats {
        info!("Score range {} to {}, average {:.2}", min, max, mean);
    }
    Ok(summary)
}

/// Runs [`merge_scores`] for every league whose table exists, writing the
/// `_with_scor` table next to it.
pub fn apply_scores_to_leagues(
    store: &LeagueStore,
    leagues: &[&str],
    scores: &Path,
) -> Vec<(String, Result<MergeSummary, ScoreError>)> {
    let mut results = Vec::new();
    for league in leagues {
        let players = store.table_path(league);
        if !players.exists() {
            warn!("{:?} not found, skipping {}", players, league);
            continue;
        }
        let result = merge_scores(&players, scores, &store.scored_table_path(league));
        if let Err(e) = &result {
            warn!("Failed to add scores for {}: {}", league, e);
        }
        results.push((league.to_string(), result));
    }
    results
}
