use std::{
    io::Read,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::{normalize::normalize, store::read_table_text, types::LeagueEntry};

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("roster table {0:?} not found")]
    Missing(PathBuf),
    #[error("failed to read roster table {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse roster table: {0}")]
    Csv(#[from] csv::Error),
    #[error("unknown league '{name}'. Available leagues: {}", .available.join(", "))]
    UnknownLeague { name: String, available: Vec<String> },
    #[error("unknown team '{name}'. Available teams: {}", .available.join(", "))]
    UnknownTeam { name: String, available: Vec<String> },
}

/// The static list of team pages, in table order.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<LeagueEntry>,
}

/// One league's worth of work after filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeagueSelection<'a> {
    pub league: &'a str,
    pub teams: Vec<&'a LeagueEntry>,
}

fn same_name(a: &str, b: &str) -> bool {
    a == b || normalize(a.trim()) == normalize(b.trim())
}

impl Roster {
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        if !path.exists() {
            return Err(RosterError::Missing(path.to_path_buf()));
        }
        let text = read_table_text(path).map_err(|source| RosterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(text.as_bytes())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RosterError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let entries = rdr.deserialize().collect::<Result<Vec<LeagueEntry>, _>>()?;
        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<LeagueEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[LeagueEntry] {
        &self.entries
    }

    /// League names in order of first appearance.
    pub fn leagues(&self) -> Vec<&str> {
        let mut leagues: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !leagues.contains(&entry.league.as_str()) {
                leagues.push(&entry.league);
            }
        }
        leagues
    }

    pub fn teams(&self, league: &str) -> Vec<&LeagueEntry> {
        self.entries.iter().filter(|e| e.league == league).collect()
    }

    pub fn find_league(&self, name: &str) -> Result<&str, RosterError> {
        let leagues = self.leagues();
        leagues
            .iter()
            .find(|l| same_name(l, name))
            .copied()
            .ok_or_else(|| RosterError::UnknownLeague {
                name: name.to_string(),
                available: leagues.iter().map(|l| l.to_string()).collect(),
            })
    }

    /// Applies the command-line filters. No league means every league; a team
    /// without a league is looked up across all of them.
    pub fn select(&self, league: Option<&str>, team: Option<&str>) -> Result<Vec<LeagueSelection<'_>>, RosterError> {
        let leagues = match league {
            Some(name) => vec![self.find_league(name)?],
            None => self.leagues(),
        };

        let mut selections = Vec::new();
        for league in leagues {
            let mut teams = self.teams(league);
            if let Some(team) = team {
                teams.retain(|e| same_name(&e.team, team));
            }
            if !teams.is_empty() {
                selections.push(LeagueSelection { league, teams });
            }
        }

        if let (Some(team), true) = (team, selections.is_empty()) {
            let available = match league {
                Some(name) => self.teams(self.find_league(name)?),
                None => self.entries.iter().collect(),
            };
            return Err(RosterError::UnknownTeam {
                name: team.to_string(),
                available: available.iter().map(|e| e.team.clone()).collect(),
            });
        }

        Ok(selections)
    }
}
