mod api;
mod cli;
mod config;
mod db;
mod error;
mod models;
mod services;
mod settings;
mod utils;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "winmix")]
#[command(about = "Football results import and team lookup for WinMix leagues")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Defaults to WINMIX_PORT, then 3000
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Initialize the database
    InitDb {
        /// Delete all teams and matches
        #[arg(long)]
        reset: bool,
    },
    /// Load demo league rosters
    Seed,
    /// Import match results from a CSV file
    Import {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long)]
        league: Option<String>,
        /// Match day (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Fuzzy match threshold between 0 and 1
        #[arg(short, long)]
        threshold: Option<f64>,
        /// Replace unknown team names with their best suggestion
        #[arg(long)]
        accept_suggestions: bool,
        /// Validate and report without storing anything
        #[arg(long)]
        dry_run: bool,
        /// Write rows that failed validation to this CSV file
        #[arg(long)]
        errors_out: Option<PathBuf>,
    },
    /// Resolve a team name against a league roster
    Match {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        league: Option<String>,
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Query team statistics
    Team {
        #[arg(short, long)]
        name: String,
    },
    /// Head-to-head record between two teams
    H2h {
        #[arg(long)]
        home: String,
        #[arg(long)]
        away: String,
    },
    /// Show or change stored preferences
    Settings {
        #[arg(long)]
        default_league: Option<String>,
        #[arg(long)]
        import_threshold: Option<f64>,
        #[arg(long)]
        match_threshold: Option<f64>,
        #[arg(long)]
        add_favorite: Option<String>,
        #[arg(long)]
        remove_favorite: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port }) => {
            let port = port.unwrap_or(config.port);
            tracing::info!("Starting WinMix API server on port {}", port);
            api::serve(&config.database_url, port).await?;
        }
        Some(Commands::InitDb { reset }) => {
            tracing::info!("Initializing database...");
            cli::init_db(reset).await?;
        }
        Some(Commands::Seed) => {
            cli::seed().await?;
        }
        Some(Commands::Import {
            file,
            league,
            date,
            threshold,
            accept_suggestions,
            dry_run,
            errors_out,
        }) => {
            tracing::info!("Importing {}", file.display());
            cli::import_file(cli::ImportOptions {
                file,
                league,
                date,
                threshold,
                accept_suggestions,
                dry_run,
                errors_out,
            })
            .await?;
        }
        Some(Commands::Match { name, league, threshold }) => {
            cli::match_team(&name, league, threshold).await?;
        }
        Some(Commands::Team { name }) => {
            tracing::info!("Querying team: {}", name);
            cli::query_team(&name).await?;
        }
        Some(Commands::H2h { home, away }) => {
            cli::query_head_to_head(&home, &away).await?;
        }
        Some(Commands::Settings {
            default_league,
            import_threshold,
            match_threshold,
            add_favorite,
            remove_favorite,
        }) => {
            cli::settings(cli::SettingsUpdate {
                default_league,
                import_threshold,
                match_threshold,
                add_favorite,
                remove_favorite,
            })
            .await?;
        }
        None => {
            // Default to serving
            tracing::info!("Starting WinMix API server on port {}", config.port);
            api::serve(&config.database_url, config.port).await?;
        }
    }

    Ok(())
}
