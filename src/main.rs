//! # txmail CLI
//!
//! ```bash
//! txmail --config ./config/txmail.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `txmail init` | Create the SQLite database and schema |
//! | `txmail serve` | Run the polling scheduler and the HTTP API |
//! | `txmail sync` | Run one ingestion cycle and print the report |
//! | `txmail stats` | Show stored transaction counts and the cursor |
//! | `txmail recent` | List the newest stored transactions |
//! | `txmail parse <file>` | Extract fields from a saved email body |
//! | `txmail prune` | Delete transactions past the retention window |
//!
//! Gmail credentials are read from `GMAIL_CLIENT_ID`,
//! `GMAIL_CLIENT_SECRET`, and `GMAIL_REFRESH_TOKEN`. Log verbosity follows
//! `RUST_LOG` (default `info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use txmail::config::{self, Config, GmailCredentials};
use txmail::gmail::GmailMailbox;
use txmail::ingest::Orchestrator;
use txmail::sqlite_store::SqliteStore;
use txmail::{inspect, migrate, retention, scheduler, server, stats};
use txmail_core::assemble::Assembler;
use txmail_core::extract::Extractor;
use txmail_core::fields::LabelTable;

/// txmail: ingest bank transaction notification emails into SQLite.
#[derive(Parser)]
#[command(
    name = "txmail",
    about = "txmail: ingest bank transaction notification emails into SQLite",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/txmail.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Poll the mailbox on the configured interval and serve the HTTP API.
    Serve,

    /// Run a single ingestion cycle and print its report.
    Sync,

    /// Show stored transaction counts and the sync cursor.
    Stats,

    /// List the most recently stored transactions.
    Recent {
        #[arg(long, default_value = "10")]
        limit: i64,
    },

    /// Extract fields from a saved email body (HTML) without touching
    /// the mailbox or the database.
    Parse {
        /// Path to the HTML file.
        file: PathBuf,
    },

    /// Delete transactions older than the retention window.
    Prune {
        /// Override `[retention] days`.
        #[arg(long)]
        days: Option<i64>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_target(false)
        .init();
}

async fn build_orchestrator(cfg: &Config) -> Result<Arc<Orchestrator>> {
    let store = Arc::new(SqliteStore::open(cfg).await?);
    let mailbox = Arc::new(GmailMailbox::new(&cfg.mailbox, GmailCredentials::from_env()?)?);
    let assembler = Assembler::new(Extractor::new(cfg.extraction.label_table()?));
    Ok(Arc::new(Orchestrator::new(
        mailbox,
        store,
        cfg.mailbox.filter(),
        assembler,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Parsing works without a config file; extra labels apply when one loads.
    if let Commands::Parse { file } = &cli.command {
        let labels = match config::load_config(&cli.config) {
            Ok(cfg) => cfg.extraction.label_table()?,
            Err(_) => LabelTable::default(),
        };
        return inspect::run_parse(file, labels);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            let orchestrator = build_orchestrator(&cfg).await?;
            scheduler::spawn_ingestion(
                orchestrator.clone(),
                Duration::from_secs(cfg.schedule.interval_secs),
            );
            scheduler::spawn_retention(orchestrator.clone(), cfg.retention.days);
            if let Some(secs) = cfg.server.keep_alive_secs {
                scheduler::spawn_keep_alive(
                    scheduler::local_health_url(&cfg.server.bind),
                    Duration::from_secs(secs),
                );
            }
            server::run_server(&cfg.server.bind, orchestrator).await?;
        }
        Commands::Sync => {
            let orchestrator = build_orchestrator(&cfg).await?;
            let report = orchestrator.run_ingestion_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Recent { limit } => {
            stats::run_recent(&cfg, limit.clamp(1, 100)).await?;
        }
        Commands::Prune { days } => {
            retention::run_prune(&cfg, days).await?;
        }
        Commands::Parse { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
