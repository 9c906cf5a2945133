// src/cli/repo.rs
//! Repository management commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum RepoCommands {
    /// Add a repository
    Add {
        /// Repository name
        name: String,

        /// Repository address (https://..., file://... or a local path)
        address: String,

        /// SHA-256 fingerprint of the signing certificate to pin
        ///
        /// Without it the first signed index is trusted.
        #[arg(long)]
        fingerprint: Option<String>,

        /// Processing priority (higher = processed later, wins metadata conflicts)
        #[arg(short, long, default_value = "0")]
        priority: i32,

        /// Username for HTTP basic auth
        #[arg(long, requires = "password")]
        username: Option<String>,

        /// Password for HTTP basic auth
        #[arg(long, requires = "username")]
        password: Option<String>,

        /// Mirror address, tried when the primary address fails (repeatable)
        #[arg(long = "mirror")]
        mirrors: Vec<String>,

        /// Add repository in disabled state
        #[arg(long)]
        disabled: bool,

        /// Path to the database file (overrides the config file)
        #[arg(short, long)]
        db_path: Option<String>,
    },

    /// List repositories
    List {
        /// Path to the database file (overrides the config file)
        #[arg(short, long)]
        db_path: Option<String>,
    },

    /// Remove a repository and its catalog entries
    Remove {
        /// Repository name
        name: String,

        /// Path to the database file (overrides the config file)
        #[arg(short, long)]
        db_path: Option<String>,
    },

    /// Enable a repository
    Enable {
        /// Repository name
        name: String,

        /// Path to the database file (overrides the config file)
        #[arg(short, long)]
        db_path: Option<String>,
    },

    /// Disable a repository; its entries are removed at the next sync
    Disable {
        /// Repository name
        name: String,

        /// Path to the database file (overrides the config file)
        #[arg(short, long)]
        db_path: Option<String>,
    },
}
