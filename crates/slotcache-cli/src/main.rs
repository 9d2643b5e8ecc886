//! slotcache command-line tool.
//!
//! One-shot admin commands over a cache file plus an interactive shell.
//!
//! # Quick Start
//!
//! ```bash
//! # Create a file: 8-byte keys, 4-byte indexes, 1024 slots
//! slotcache create ./index.slc --key-size 8 --index-size 4 --capacity 1024
//!
//! # Write and read
//! slotcache put ./index.slc 0102030405060708 1 aabbccdd
//! slotcache get ./index.slc 0102030405060708
//!
//! # Inspect and check
//! slotcache info ./index.slc
//! slotcache check ./index.slc
//!
//! # Interactive shell
//! slotcache shell ./index.slc
//! ```
//!
//! Existing files are opened by inspection: the header supplies the
//! configuration, so only `create` needs the geometry flags.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// slotcache - single-file embedded key -> (revision, index) store.
#[derive(Parser)]
#[command(name = "slotcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new cache file.
    Create {
        /// Path of the file to create.
        path: String,

        /// Key width in bytes (1-512).
        #[arg(long)]
        key_size: u32,

        /// Index payload width in bytes.
        #[arg(long, default_value = "0")]
        index_size: u32,

        /// Fixed slot capacity.
        #[arg(long)]
        capacity: u64,

        /// Require nondecreasing key order and enable range scans.
        #[arg(long)]
        ordered: bool,

        /// Opaque schema discriminator recorded in the header.
        #[arg(long, default_value = "0")]
        user_version: u64,
    },

    /// Show the header and counters of a cache file.
    Info {
        path: String,

        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Look up one key (hex).
    Get { path: String, key: String },

    /// Insert or update one key (hex) with a revision and index (hex).
    Put {
        path: String,
        key: String,
        revision: i64,
        index: String,
    },

    /// Delete one key (hex).
    Delete { path: String, key: String },

    /// List live entries in slot order.
    Scan {
        path: String,

        /// Iterate newest slots first.
        #[arg(long)]
        reverse: bool,

        /// Skip this many entries.
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Stop after this many entries (0 = unlimited).
        #[arg(long, default_value = "0")]
        limit: usize,

        /// Only keys starting with this hex prefix.
        #[arg(long)]
        prefix: Option<String>,
    },

    /// List live entries with keys in [start, end) (ordered files only).
    Range {
        path: String,

        /// Inclusive hex lower bound.
        #[arg(long)]
        start: Option<String>,

        /// Exclusive hex upper bound.
        #[arg(long)]
        end: Option<String>,
    },

    /// Run the raw file-format validator.
    Check { path: String },

    /// Mark the file invalidated. Terminal and irreversible.
    Invalidate {
        path: String,

        /// Confirm the irreversible invalidation.
        #[arg(long)]
        yes: bool,
    },

    /// Interactive shell.
    Shell { path: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Create {
            path,
            key_size,
            index_size,
            capacity,
            ordered,
            user_version,
        } => commands::create::run(&path, key_size, index_size, capacity, ordered, user_version),
        Commands::Info { path, json } => commands::info::run(&path, json),
        Commands::Get { path, key } => commands::kv::get(&path, &key),
        Commands::Put {
            path,
            key,
            revision,
            index,
        } => commands::kv::put(&path, &key, revision, &index),
        Commands::Delete { path, key } => commands::kv::delete(&path, &key),
        Commands::Scan {
            path,
            reverse,
            offset,
            limit,
            prefix,
        } => commands::scan::run(&path, reverse, offset, limit, prefix.as_deref()),
        Commands::Range { path, start, end } => {
            commands::scan::range(&path, start.as_deref(), end.as_deref())
        }
        Commands::Check { path } => commands::check::run(&path),
        Commands::Invalidate { path, yes } => commands::invalidate::run(&path, yes),
        Commands::Shell { path } => commands::shell::run(&path),
    }
}
