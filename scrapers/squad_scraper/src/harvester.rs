use std::{collections::HashSet, fmt, path::PathBuf};
use tracing::{info, warn};

use crate::{
    assets::{AssetDownloader, AssetKind},
    extractor::{SkipReason, SquadExtractor},
    fetcher::{FetchError, Fetcher, HttpTransport, Sleeper},
    normalize::team_id,
    store::{LeagueStore, PersistOutcome, StoreError},
    types::{LeagueEntry, PlayerRecord},
};

/// Why a whole team contributed no rows.
#[derive(Debug)]
pub enum TeamSkip {
    AlreadyCovered,
    Fetch(FetchError),
    Http(u16),
    Page(SkipReason),
    NoPlayers,
}

impl fmt::Display for TeamSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamSkip::AlreadyCovered => write!(f, "already present in the league table"),
            TeamSkip::Fetch(e) => write!(f, "{}", e),
            TeamSkip::Http(status) => write!(f, "squad page returned HTTP {}", status),
            TeamSkip::Page(reason) => write!(f, "{}", reason),
            TeamSkip::NoPlayers => write!(f, "squad table had no usable rows"),
        }
    }
}

#[derive(Debug, Default)]
pub struct HarvestReport {
    pub records: Vec<PlayerRecord>,
    pub harvested: Vec<String>,
    pub already_covered: Vec<String>,
    pub failed: Vec<(String, TeamSkip)>,
}

/// Walks one league's teams in order, one team at a time.
pub struct LeagueHarvester<'a, T, S> {
    fetcher: &'a Fetcher<T, S>,
    extractor: SquadExtractor,
    league_dir: PathBuf,
}

impl<'a, T: HttpTransport, S: Sleeper> LeagueHarvester<'a, T, S> {
    pub fn new(fetcher: &'a Fetcher<T, S>, league_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            extractor: SquadExtractor::new(),
            league_dir: league_dir.into(),
        }
    }

    /// Fetches, extracts and downloads assets for a single team. League and
    /// country are taken from `league` and the roster entry.
    pub fn harvest_team(&self, league: &str, entry: &LeagueEntry) -> Result<Vec<PlayerRecord>, TeamSkip> {
        let response = self.fetcher.fetch(&entry.url).map_err(TeamSkip::Fetch)?;
        if !response.is_success() {
            return Err(TeamSkip::Http(response.status));
        }

        let page = self
            .extractor
            .extract(&response.text(), &entry.team)
            .map_err(TeamSkip::Page)?;
        for reason in page.skipped() {
            warn!("Skipping row for {}: {}", entry.team, reason);
        }

        let downloader = AssetDownloader::new(self.fetcher);
        let team_id = team_id(&entry.team);
        let team_logo = downloader.download_for(page.logo_url.as_deref(), &self.league_dir, &team_id, AssetKind::TeamLogo);

        let records: Vec<PlayerRecord> = page
            .players()
            .map(|player| {
                let image = downloader.download_for(
                    player.image_url.as_deref(),
                    &self.league_dir,
                    &player.player_id,
                    AssetKind::PlayerImage,
                );
                PlayerRecord {
                    player_id: player.player_id.clone(),
                    team_id: player.team_id.clone(),
                    team: entry.team.clone(),
                    team_logo: team_logo.clone(),
                    number: player.number.clone(),
                    name: player.name.clone(),
                    position: player.position.clone(),
                    age: player.age.clone(),
                    nationality: player.nationality.clone(),
                    market_value: player.market_value.clone(),
                    image,
                    league: league.to_string(),
                    country: entry.country.clone(),
                }
            })
            .collect();

        if records.is_empty() {
            return Err(TeamSkip::NoPlayers);
        }
        Ok(records)
    }

    pub fn harvest(&self, league: &str, teams: &[&LeagueEntry], covered: &HashSet<String>) -> HarvestReport {
        self.harvest_with(league, teams, covered, |_| {})
    }

    /// Like [`harvest`](Self::harvest), calling `after_team` with every record
    /// gathered so far each time a team contributes rows.
    pub fn harvest_with<F>(&self, league: &str, teams: &[&LeagueEntry], covered: &HashSet<String>, mut after_team: F) -> HarvestReport
    where
        F: FnMut(&[PlayerRecord]),
    {
        let mut report = HarvestReport::default();
        // Teams in the table plus teams harvested earlier in this run, so a
        // roster listing a team twice still yields one set of rows.
        let mut seen = covered.clone();

        for entry in teams {
            if seen.contains(&entry.team) {
                info!("Skipping {}: {}", entry.team, TeamSkip::AlreadyCovered);
                report.already_covered.push(entry.team.clone());
                continue;
            }

            info!("Scraping data for {}...", entry.team);
            match self.harvest_team(league, entry) {
                Ok(records) => {
                    info!("Collected {} players for {}", records.len(), entry.team);
                    report.records.extend(records);
                    report.harvested.push(entry.team.clone());
                    seen.insert(entry.team.clone());
                    after_team(&report.records);
                }
                Err(skip) => {
                    warn!("Skipping {}: {}", entry.team, skip);
                    report.failed.push((entry.team.clone(), skip));
                }
            }
        }

        report
    }
}

#[derive(Debug)]
pub struct LeagueSummary {
    pub league: String,
    pub harvested: usize,
    pub already_covered: usize,
    pub failed: usize,
    pub new_rows: usize,
    pub outcome: PersistOutcome,
}

/// Load, harvest and persist one league. With `flush_each_team` the table is
/// rewritten after every successful team so an interrupted run keeps its work.
pub fn run_league<T: HttpTransport, S: Sleeper>(
    fetcher: &Fetcher<T, S>,
    store: &LeagueStore,
    league: &str,
    teams: &[&LeagueEntry],
    flush_each_team: bool,
) -> Result<LeagueSummary, StoreError> {
    info!("Processing {}...", league);
    let league_dir = store.prepare(league)?;
    let existing = store.load(league);

    let harvester = LeagueHarvester::new(fetcher, league_dir);
    let report = harvester.harvest_with(league, teams, &existing.covered_teams, |so_far| {
        if flush_each_team {
            if let Err(e) = store.persist(league, &existing.records, so_far) {
                warn!("Checkpoint write for {} failed: {}", league, e);
            }
        }
    });

    let outcome = store.persist(league, &existing.records, &report.records)?;
    let summary = LeagueSummary {
        league: league.to_string(),
        harvested: report.harvested.len(),
        already_covered: report.already_covered.len(),
        failed: report.failed.len(),
        new_rows: report.records.len(),
        outcome,
    };
    info!(
        "{}: {} teams scraped, {} already covered, {} failed, {} new rows",
        league, summary.harvested, summary.already_covered, summary.failed, summary.new_rows
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::FetchConfig,
        fetcher::{
            tests::{response, RecordingSleeper, ScriptedTransport},
            FetchResponse,
        },
    };
    use tempfile::tempdir;

    const SQUAD: &str = r#"<table class="items"><tbody>
        <tr class="odd"><td class="hauptlink"><a href="/p/1">Ana Pop</a></td></tr>
        <tr class="even"><td class="hauptlink"><a href="/p/2">Ion Ionescu</a></td></tr>
    </tbody></table>"#;

    fn entry(team: &str) -> LeagueEntry {
        LeagueEntry {
            league: "X".to_string(),
            team: team.to_string(),
            url: format!("http://example.test/{team}"),
            country: "CountryA".to_string(),
        }
    }

    fn fetcher(responses: Vec<FetchResponse>) -> Fetcher<ScriptedTransport, RecordingSleeper> {
        let config = FetchConfig {
            max_retries: 1,
            base_delay_ms: 0,
            initial_jitter_ms: 0,
            timeout_secs: 1,
        };
        let transport = ScriptedTransport::new(responses.into_iter().map(Ok).collect());
        Fetcher::with_parts(transport, RecordingSleeper::default(), config, Vec::new())
    }

    fn page(body: &str) -> FetchResponse {
        FetchResponse {
            status: 200,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_covered_teams_are_not_fetched() {
        let dir = tempdir().unwrap();
        let fetcher = fetcher(vec![page(SQUAD)]);
        let harvester = LeagueHarvester::new(&fetcher, dir.path());
        let (alpha, beta) = (entry("Alpha"), entry("Beta"));
        let covered = HashSet::from(["Alpha".to_string()]);

        let report = harvester.harvest("X", &[&alpha, &beta], &covered);

        assert_eq!(fetcher.transport().calls.get(), 1);
        assert_eq!(report.already_covered, vec!["Alpha".to_string()]);
        assert_eq!(report.harvested, vec!["Beta".to_string()]);
        assert_eq!(report.records.len(), 2);
        assert!(report.records.iter().all(|r| r.team == "Beta" && r.league == "X" && r.country == "CountryA"));
    }

    #[test]
    fn test_team_failure_does_not_stop_the_league() {
        let dir = tempdir().unwrap();
        let fetcher = fetcher(vec![response(404), page("<p>maintenance</p>"), page(SQUAD)]);
        let harvester = LeagueHarvester::new(&fetcher, dir.path());
        let (a, b, c) = (entry("A"), entry("B"), entry("C"));

        let report = harvester.harvest("X", &[&a, &b, &c], &HashSet::new());

        assert_eq!(report.failed.len(), 2);
        assert!(matches!(report.failed[0].1, TeamSkip::Http(404)));
        assert!(matches!(report.failed[1].1, TeamSkip::Page(SkipReason::NoSquadTable)));
        assert_eq!(report.harvested, vec!["C".to_string()]);
        assert_eq!(report.records.len(), 2);
    }

    #[test]
    fn test_team_listed_twice_is_harvested_once() {
        let dir = tempdir().unwrap();
        let fetcher = fetcher(vec![page(SQUAD), page(SQUAD)]);
        let harvester = LeagueHarvester::new(&fetcher, dir.path());
        let alpha = entry("Alpha");

        let report = harvester.harvest("X", &[&alpha, &alpha], &HashSet::new());

        assert_eq!(fetcher.transport().calls.get(), 1);
        assert_eq!(report.harvested, vec!["Alpha".to_string()]);
        assert_eq!(report.already_covered, vec!["Alpha".to_string()]);
        assert_eq!(report.records.len(), 2);
    }

    #[test]
    fn test_empty_table_counts_as_failure() {
        let dir = tempdir().unwrap();
        let fetcher = fetcher(vec![page(r#"<table class="items"></table>"#)]);
        let harvester = LeagueHarvester::new(&fetcher, dir.path());
        let a = entry("A");

        let report = harvester.harvest("X", &[&a], &HashSet::new());
        assert!(matches!(report.failed[0].1, TeamSkip::NoPlayers));
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_run_league_checkpoints_each_team() {
        let dir = tempdir().unwrap();
        let store = LeagueStore::new(dir.path());
        let fetcher = fetcher(vec![page(SQUAD), response(503)]);
        let (a, b) = (entry("A"), entry("B"));

        let summary = run_league(&fetcher, &store, "X", &[&a, &b], true).unwrap();

        assert_eq!(summary.harvested, 1);
        assert_eq!(summary.failed, 1);
        assert!(matches!(summary.outcome, PersistOutcome::Written { rows: 2, .. }));
        assert_eq!(store.load("X").covered_teams, HashSet::from(["A".to_string()]));
    }
}
