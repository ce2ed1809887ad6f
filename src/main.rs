//! # Tweet Harness CLI (`twh`)
//!
//! ## Usage
//!
//! ```bash
//! twh --config ./config/twh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `twh init` | Create the SQLite database and run schema migrations |
//! | `twh serve` | Start the HTTP server |
//! | `twh enqueue <id>` | Dispatch a criteria to the scraper |
//! | `twh resume` | Re-dispatch criteria whose executions are still active |
//! | `twh ingest <file>` | Ingest a JSON array of tweets |
//! | `twh criteria add <file>` | Register a search criteria from JSON |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tweet_harness::{commands, config, logging, migrate, server};

/// Tweet Harness: dispatches search criteria to a scraper worker and
/// ingests the tweets it returns.
#[derive(Parser)]
#[command(name = "twh", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/twh.toml")]
    config: PathBuf,

    /// Production mode: log at `info` at most.
    #[arg(long, global = true)]
    prod: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Safe to run more than once.
    Init,

    /// Start the HTTP server.
    ///
    /// Re-dispatches active executions first, then binds to `[server].bind`.
    Serve,

    /// Dispatch a search criteria to the scraper.
    Enqueue {
        /// Criteria id.
        id: i64,

        /// Dispatch even if an execution is already pending or in progress.
        #[arg(long)]
        forced: bool,
    },

    /// Re-dispatch every criteria with a pending or in-progress execution.
    Resume,

    /// Ingest tweets from a JSON file (same body as `POST /tweets/v1`).
    Ingest {
        file: PathBuf,
    },

    /// Manage search criteria.
    Criteria {
        #[command(subcommand)]
        action: CriteriaAction,
    },
}

#[derive(Subcommand)]
enum CriteriaAction {
    /// Insert a criteria from a JSON file and print its id.
    Add {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging, cli.prod);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Enqueue { id, forced } => {
            commands::run_enqueue(&cfg, id, forced).await?;
        }
        Commands::Resume => {
            commands::run_resume(&cfg).await?;
        }
        Commands::Ingest { file } => {
            commands::run_ingest_file(&cfg, &file).await?;
        }
        Commands::Criteria { action } => match action {
            CriteriaAction::Add { file } => {
                commands::run_add_criteria(&cfg, &file).await?;
            }
        },
    }

    Ok(())
}
