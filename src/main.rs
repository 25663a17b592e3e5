//! # Notes CLI (`notes`)
//!
//! Runs the notes HTTP server and exposes the enrichment backend for
//! one-off use.
//!
//! ## Usage
//!
//! ```bash
//! notes --config ./config/notes.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `notes serve` | Start the HTTP server |
//! | `notes schema` | Print the enrichment JSON Schema |
//! | `notes enrich "<text>"` | Enrich a piece of text and print the metadata |
//!
//! ## Examples
//!
//! ```bash
//! # Start with the stub backend (no API key needed)
//! notes serve
//!
//! # Try the Gemini backend on a single text
//! GEMINI_API_KEY=... notes --config ./config/notes.toml enrich "Ship the release on Friday"
//! ```

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use note_enricher::backend::create_backend;
use note_enricher::config::{self, Config};
use note_enricher::server;
use note_enricher_core::enrichment::enrichment_schema;

const DEFAULT_CONFIG_PATH: &str = "./config/notes.toml";

/// Notes service with LLM-powered enrichment.
///
/// Configuration is read from a TOML file. Without `--config`, a missing
/// `./config/notes.toml` means built-in defaults (stub backend).
#[derive(Parser)]
#[command(
    name = "notes",
    about = "In-memory notes service with LLM-powered enrichment",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Print the JSON Schema every enrichment result must satisfy.
    Schema,

    /// Run the configured backend once and print the resulting metadata.
    Enrich {
        /// Text to analyze.
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "note_enricher=info,notes=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&enrichment_schema())?);
        }
        Commands::Serve => {
            let cfg = resolve_config(cli.config.as_deref())?;
            server::run_server(&cfg).await?;
        }
        Commands::Enrich { text } => {
            let cfg = resolve_config(cli.config.as_deref())?;
            let backend = create_backend(&cfg.enrichment)?;
            let metadata = backend.enrich(&text).await?.into_metadata(Utc::now());
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
    }

    Ok(())
}

/// An explicit `--config` must exist; the default path may be absent.
fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => config::load_config(path),
        None => config::load_config_or_default(Path::new(DEFAULT_CONFIG_PATH)),
    }
}
