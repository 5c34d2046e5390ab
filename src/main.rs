//! # Clarion CLI (`clarion`)
//!
//! The `clarion` binary manages a store of clarification records: batch
//! upload from spreadsheet exports, single-record create and edit, fuzzy
//! search, filtered listing, statistics, and the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! clarion --config ./config/clarion.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `clarion init` | Create the SQLite database and schema |
//! | `clarion upload <file>` | Ingest a sheet export, skipping duplicates |
//! | `clarion add --set field=value ...` | Save one record |
//! | `clarion edit <id> --set field=value ...` | Change fields of a stored record |
//! | `clarion get <id>` | Show one record |
//! | `clarion list` | List records with optional filters |
//! | `clarion export --out <file>` | Write filtered records as CSV |
//! | `clarion search "<query>"` | Typo-tolerant ranked search |
//! | `clarion stats` | Counts by status, priority and module |
//! | `clarion uploads` | Upload history, newest first |
//! | `clarion ask "<message>"` | Search only if the message reads like a lookup |
//! | `clarion serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! clarion init
//! clarion upload ./tracker.json
//! clarion search "authroity conflikt near mile post 40"
//! clarion list --status Open --module Dispatch
//! clarion serve
//! ```

mod ask;
mod config;
mod db;
mod export;
mod import;
mod ingest;
mod logging;
mod migrate;
mod records;
mod search;
mod server;
mod sqlite_store;
mod stats;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use clarion_core::filter::RecordFilter;
use clarion_core::models::RecordField;

/// Clarion: deduplicating store and fuzzy search for clarification records.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/clarion.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "clarion",
    about = "Clarion: deduplicating store and fuzzy search for clarification records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/clarion.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest a JSON sheet export.
    ///
    /// Rows whose content hash is already stored are counted as duplicates
    /// and skipped. Every upload is recorded in the audit history.
    Upload {
        /// Path to the export (`[...]`, `{ "rows": [...] }` or `{ "sheets": {...} }`).
        file: PathBuf,

        /// Sheet to read when the file holds several.
        #[arg(long)]
        sheet: Option<String>,
    },

    /// Save a single record.
    Add {
        /// Field assignment, repeatable. Example: `--set status=Open`.
        #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = records::parse_assignment)]
        assignments: Vec<(RecordField, String)>,
    },

    /// Edit a stored record. Unassigned fields keep their values.
    Edit {
        /// Record UUID.
        id: String,

        #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = records::parse_assignment)]
        assignments: Vec<(RecordField, String)>,
    },

    /// Show one record by UUID.
    Get {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// List records, numbered rows first.
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        module: Option<String>,
        #[arg(long)]
        assigned_to: Option<String>,
        /// Earliest date, inclusive (YYYY-MM-DD).
        #[arg(long)]
        date_from: Option<String>,
        /// Latest date, inclusive (YYYY-MM-DD).
        #[arg(long)]
        date_to: Option<String>,
        /// Plain substring match over module, scenario and comments.
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Export records as CSV, with the same filters as `list`.
    Export {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        module: Option<String>,
        #[arg(long)]
        assigned_to: Option<String>,
        #[arg(long)]
        date_from: Option<String>,
        #[arg(long)]
        date_to: Option<String>,
        #[arg(long)]
        search: Option<String>,
        /// Output file. Writes to stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Fuzzy search over all stored records.
    Search {
        query: String,

        /// Maximum number of results (defaults to `[search].top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Show store statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Show upload history.
    Uploads {
        #[arg(long)]
        json: bool,
    },

    /// Answer a free-form message with a search when it asks for one.
    Ask { message: String },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(cfg.logging.format);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Upload { file, sheet } => {
            ingest::run_upload(&cfg, &file, sheet.as_deref()).await?;
        }
        Commands::Add { assignments } => {
            records::run_add(&cfg, &assignments).await?;
        }
        Commands::Edit { id, assignments } => {
            records::run_edit(&cfg, &id, &assignments).await?;
        }
        Commands::Get { id, json } => {
            records::run_get(&cfg, &id, json).await?;
        }
        Commands::List {
            status,
            priority,
            module,
            assigned_to,
            date_from,
            date_to,
            search,
            json,
        } => {
            let filter = RecordFilter {
                status,
                priority,
                module,
                assigned_to,
                date_from,
                date_to,
                search,
            };
            records::run_list(&cfg, &filter, json).await?;
        }
        Commands::Export {
            status,
            priority,
            module,
            assigned_to,
            date_from,
            date_to,
            search,
            out,
        } => {
            let filter = RecordFilter {
                status,
                priority,
                module,
                assigned_to,
                date_from,
                date_to,
                search,
            };
            export::run_export(&cfg, &filter, out.as_deref()).await?;
        }
        Commands::Search { query, top_k, json } => {
            if matches!(top_k, Some(0)) {
                anyhow::bail!("--top-k must be >= 1");
            }
            search::run_search(&cfg, &query, top_k, json).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Uploads { json } => {
            stats::run_uploads(&cfg, json).await?;
        }
        Commands::Ask { message } => {
            ask::run_ask(&cfg, &message).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
