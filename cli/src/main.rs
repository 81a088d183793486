//! weaveindex CLI — import blocks, promote finalized data, inspect a database.
//!
//! Usage:
//! ```bash
//! weaveindex info
//! weaveindex stats   --db ./weave.db
//! weaveindex import  --db ./weave.db --file blocks.jsonl [--depth 50] [--no-flush]
//! weaveindex flush   --db ./weave.db --depth 50
//! weaveindex missing --db ./weave.db --limit 100
//! weaveindex cursor  encode-tx 1138 42 | encode-block 1138 | decode-tx <c> | decode-block <c>
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::BufReader;
use tracing::info;

use weaveindex_core::indexer::DEFAULT_CONFIRMATION_DEPTH;
use weaveindex_core::{
    decode_block_cursor, decode_transaction_cursor, encode_block_cursor,
    encode_transaction_cursor, BlockImporter, ChainDatabase, IndexerConfig,
};
use weaveindex_storage::SqliteStorage;

mod cmd_import;
mod logging;

use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "weaveindex",
    about = "Finality-aware block and transaction index — WeaveIndex CLI",
    long_about = "
WeaveIndex CLI: ingest blocks into a SQLite index, promote blocks buried
under the confirmation depth to the stable region, and inspect the result.

ENVIRONMENT VARIABLES:
  WEAVEINDEX_DB                  Database path (instead of --db)
  WEAVEINDEX_CONFIRMATION_DEPTH  Confirmation depth (instead of --depth)
  WEAVEINDEX_LOG                 Log filter directives (default: info)
",
    version
)]
struct Cli {
    /// Log filter directives, e.g. "debug" or "info,weaveindex_storage=debug"
    #[arg(long, global = true, env = "WEAVEINDEX_LOG", default_value = "info")]
    log: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version and defaults
    Info,

    /// Print per-table row counts as JSON
    Stats {
        /// Path to the SQLite database
        #[arg(long, env = "WEAVEINDEX_DB")]
        db: String,
    },

    /// Import JSON-lines block records
    Import {
        /// Path to the SQLite database (created if missing)
        #[arg(long, env = "WEAVEINDEX_DB")]
        db: String,
        /// JSON-lines file of {"block", "txs", "missing_tx_ids"} records
        #[arg(long)]
        file: PathBuf,
        /// Blocks a block must be buried under before promotion
        #[arg(
            long,
            env = "WEAVEINDEX_CONFIRMATION_DEPTH",
            default_value_t = DEFAULT_CONFIRMATION_DEPTH
        )]
        depth: u64,
        /// Skip the flush after each block
        #[arg(long)]
        no_flush: bool,
    },

    /// Promote every block buried under `depth` blocks
    Flush {
        /// Path to the SQLite database
        #[arg(long, env = "WEAVEINDEX_DB")]
        db: String,
        /// Confirmation depth
        #[arg(
            long,
            env = "WEAVEINDEX_CONFIRMATION_DEPTH",
            default_value_t = DEFAULT_CONFIRMATION_DEPTH
        )]
        depth: u64,
    },

    /// List ids of transactions that still need fetching
    Missing {
        /// Path to the SQLite database
        #[arg(long, env = "WEAVEINDEX_DB")]
        db: String,
        /// Maximum number of ids
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },

    /// Encode or decode pagination cursors
    Cursor {
        #[command(subcommand)]
        action: CursorAction,
    },
}

#[derive(Subcommand)]
enum CursorAction {
    /// Cursor for a transaction position
    #[command(name = "encode-tx")]
    EncodeTx {
        height: u64,
        block_transaction_index: u32,
    },
    /// Cursor for a block height
    #[command(name = "encode-block")]
    EncodeBlock { height: u64 },
    /// Decode a transaction cursor
    #[command(name = "decode-tx")]
    DecodeTx { cursor: String },
    /// Decode a block cursor
    #[command(name = "decode-block")]
    DecodeBlock { cursor: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&LogConfig {
        level: cli.log,
        json: cli.log_json,
    });

    match cli.command {
        Commands::Info => {
            cmd_info();
            Ok(())
        }

        Commands::Stats { db } => cmd_stats(&db).await,

        Commands::Import {
            db,
            file,
            depth,
            no_flush,
        } => {
            let config = IndexerConfig::default()
                .with_confirmation_depth(depth)
                .with_flush_after_ingest(!no_flush);
            cmd_import_file(&db, &file, config).await
        }

        Commands::Flush { db, depth } => cmd_flush(&db, depth).await,

        Commands::Missing { db, limit } => cmd_missing(&db, limit).await,

        Commands::Cursor { action } => cmd_cursor(action),
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

fn cmd_info() {
    println!("WeaveIndex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default confirmation depth: {DEFAULT_CONFIRMATION_DEPTH} blocks");
    println!("  Flush after each import:    yes (disable with --no-flush)");
    println!("  Storage backends: memory, SQLite");
    println!("  Regions: new (unconfirmed) → stable (confirmed)");
}

async fn open(db: &str) -> Result<SqliteStorage> {
    SqliteStorage::open(db)
        .await
        .with_context(|| format!("failed to open database '{db}'"))
}

async fn cmd_stats(db: &str) -> Result<()> {
    let store = open(db).await?;
    let info = store.get_debug_info().await?;
    let max_height = store.get_max_height().await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "max_height": max_height,
            "counts": info.counts,
        }))?
    );
    store.close().await;
    Ok(())
}

async fn cmd_import_file(db: &str, file: &Path, config: IndexerConfig) -> Result<()> {
    let store = open(db).await?;
    let input = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("failed to open '{}'", file.display()))?;

    let importer = BlockImporter::new(store, config);
    let summary = cmd_import::run(&importer, BufReader::new(input)).await?;
    info!(
        blocks = summary.blocks,
        promoted = summary.promoted,
        "import finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    importer.into_database().close().await;
    Ok(())
}

async fn cmd_flush(db: &str, depth: u64) -> Result<()> {
    let store = open(db).await?;
    let promoted = store.flush(depth).await?;
    println!("{}", json!({ "promoted": promoted, "depth": depth }));
    store.close().await;
    Ok(())
}

async fn cmd_missing(db: &str, limit: u32) -> Result<()> {
    let store = open(db).await?;
    for id in store.get_missing_tx_ids(limit).await? {
        println!("{id}");
    }
    store.close().await;
    Ok(())
}

fn cmd_cursor(action: CursorAction) -> Result<()> {
    match action {
        CursorAction::EncodeTx {
            height,
            block_transaction_index,
        } => println!("{}", encode_transaction_cursor(height, block_transaction_index)),
        CursorAction::EncodeBlock { height } => println!("{}", encode_block_cursor(height)),
        CursorAction::DecodeTx { cursor } => {
            let decoded = decode_transaction_cursor(Some(&cursor))?;
            println!(
                "{}",
                json!({
                    "height": decoded.height,
                    "block_transaction_index": decoded.block_transaction_index,
                })
            );
        }
        CursorAction::DecodeBlock { cursor } => {
            let height = decode_block_cursor(Some(&cursor))?;
            println!("{}", json!({ "height": height }));
        }
    }
    Ok(())
}
