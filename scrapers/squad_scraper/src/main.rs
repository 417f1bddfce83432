use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use squad_scraper::{
    config::ScraperConfig,
    fetcher::Fetcher,
    harvester::run_league,
    roster::Roster,
    scores::{apply_scores_to_leagues, merge_scores},
    store::LeagueStore,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Harvest league squads into per-league tables", long_about = None)]
struct Cli {
    /// Only process this league
    #[arg(short, long)]
    league: Option<String>,

    /// Only process this team (within --league when given)
    #[arg(short, long)]
    team: Option<String>,

    /// Print the leagues in the roster table and exit
    #[arg(long)]
    list_leagues: bool,

    /// Print the teams in the roster table (optionally for --league) and exit
    #[arg(long)]
    list_teams: bool,

    /// Roster table with Liga, Echipa, Link and Tara columns
    #[arg(long)]
    leagues_file: Option<PathBuf>,

    /// Directory that receives one folder per league
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Join a players table with a score table on PlayerID
    MergeScores {
        #[arg(long)]
        players: PathBuf,
        #[arg(long)]
        scores: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Add scores to every league table found under the output directory
    ApplyScores {
        #[arg(long)]
        scores: PathBuf,
    },
}

fn list_teams(roster: &Roster, league: Option<&str>) {
    let leagues = match league {
        Some(name) => match roster.find_league(name) {
            Ok(league) => vec![league],
            Err(e) => {
                error!("{}", e);
                return;
            }
        },
        None => roster.leagues(),
    };
    for league in leagues {
        println!("{}:", league);
        for entry in roster.teams(league) {
            println!("  {}", entry.team);
        }
    }
}

fn harvest(cli: &Cli, config: &ScraperConfig, roster: &Roster) -> Result<()> {
    let selections = match roster.select(cli.league.as_deref(), cli.team.as_deref()) {
        Ok(selections) => selections,
        Err(e) => {
            error!("{}", e);
            return Ok(());
        }
    };

    let fetcher = Fetcher::new(config)?;
    let store = LeagueStore::new(&config.paths.output_dir);

    for selection in selections {
        match run_league(
            &fetcher,
            &store,
            selection.league,
            &selection.teams,
            config.persist.flush_each_team,
        ) {
            Ok(summary) => info!("Finished {} ({:?})", summary.league, summary.outcome),
            Err(e) => error!("Failed to save {}: {}", selection.league, e),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = ScraperConfig::from_env();
    if let Some(path) = &cli.leagues_file {
        config.paths.leagues_file = path.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.paths.output_dir = dir.clone();
    }

    if let Some(Commands::MergeScores { players, scores, output }) = &cli.command {
        let summary = merge_scores(players, scores, output).context("Failed to merge scores")?;
        info!("Output saved to {:?} ({} rows)", output, summary.total);
        return Ok(());
    }

    let roster = Roster::load(&config.paths.leagues_file)
        .with_context(|| format!("Failed to read roster table {:?}", config.paths.leagues_file))?;

    if let Some(Commands::ApplyScores { scores }) = &cli.command {
        let store = LeagueStore::new(&config.paths.output_dir);
        let results = apply_scores_to_leagues(&store, &roster.leagues(), scores);
        info!("Added scores to {} of {} leagues", results.iter().filter(|(_, r)| r.is_ok()).count(), results.len());
        return Ok(());
    }

    if cli.list_leagues {
        for league in roster.leagues() {
            println!("{}", league);
        }
        return Ok(());
    }
    if cli.list_teams {
        list_teams(&roster, cli.league.as_deref());
        return Ok(());
    }

    harvest(&cli, &config, &roster)
}
