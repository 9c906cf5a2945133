// src/cli/mod.rs
//! CLI definitions for fdroid-sync
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! - `init` - Create the catalog database
//! - `repo` - Repository management
//! - `sync` - Run a sync pass over all repositories
//! - `updates` - List installed apps with an available update
//! - `ignore` - Ignore updates for an app
//! - `verify` - Check a downloaded APK against the catalog

use clap::{Parser, Subcommand};

mod repo;

pub use repo::RepoCommands;

#[derive(Parser)]
#[command(name = "fdroid-sync")]
#[command(author = "fdroid-sync Contributors")]
#[command(version)]
#[command(about = "Synchronize F-Droid repository indexes into a local catalog", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the catalog database
    Init {
        /// Path to the database file (overrides the config file)
        #[arg(short, long)]
        db_path: Option<String>,
    },

    /// Repository management
    #[command(subcommand)]
    Repo(RepoCommands),

    /// Fetch, verify and merge every enabled repository
    Sync {
        /// Path to the database file (overrides the config file)
        #[arg(short, long)]
        db_path: Option<String>,

        /// JSON snapshot of installed packages (overrides the config file)
        #[arg(long)]
        installed: Option<String>,

        /// Fetch repositories one at a time
        #[arg(long)]
        sequential: bool,

        /// Do not show a progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// List installed apps with an available update
    Updates {
        /// Path to the database file (overrides the config file)
        #[arg(short, long)]
        db_path: Option<String>,
    },

    /// Ignore updates for an app
    Ignore {
        /// Package name
        package: String,

        /// Ignore every future update
        #[arg(long, conflicts_with_all = ["until", "clear"])]
        all: bool,

        /// Ignore updates up to and including this version code
        #[arg(long, conflicts_with = "clear")]
        until: Option<i64>,

        /// Stop ignoring updates
        #[arg(long)]
        clear: bool,

        /// Path to the database file (overrides the config file)
        #[arg(short, long)]
        db_path: Option<String>,
    },

    /// Verify a downloaded APK against the digest in the catalog
    Verify {
        /// Path to the APK file
        file: String,

        /// Package name
        package: String,

        /// Version code
        version_code: i64,

        /// Repository that published the file (default: any)
        #[arg(long)]
        repo: Option<String>,

        /// Path to the database file (overrides the config file)
        #[arg(short, long)]
        db_path: Option<String>,
    },
}
