// src/main.rs

use anyhow::Result;
use clap::Parser;
use fdroid_sync::repository::NewRepository;

mod cli;
mod commands;

use cli::{Cli, Commands, RepoCommands};
use commands::load_config;

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Some(Commands::Init { db_path }) => {
            commands::cmd_init(&load_config(config_path, db_path)?)
        }

        Some(Commands::Repo(repo_cmd)) => match repo_cmd {
            RepoCommands::Add {
                name,
                address,
                fingerprint,
                priority,
                username,
                password,
                mirrors,
                disabled,
                db_path,
            } => {
                let config = load_config(config_path, db_path)?;
                let new = NewRepository {
                    name,
                    address,
                    fingerprint,
                    priority,
                    disabled,
                    username,
                    password,
                    mirrors,
                };
                commands::cmd_repo_add(&config, new)
            }
            RepoCommands::List { db_path } => {
                commands::cmd_repo_list(&load_config(config_path, db_path)?)
            }
            RepoCommands::Remove { name, db_path } => {
                commands::cmd_repo_remove(&load_config(config_path, db_path)?, &name)
            }
            RepoCommands::Enable { name, db_path } => {
                commands::cmd_repo_enable(&load_config(config_path, db_path)?, &name)
            }
            RepoCommands::Disable { name, db_path } => {
                commands::cmd_repo_disable(&load_config(config_path, db_path)?, &name)
            }
        },

        Some(Commands::Sync {
            db_path,
            installed,
            sequential,
            quiet,
        }) => {
            let config = load_config(config_path, db_path)?;
            commands::cmd_sync(&config, installed, sequential, quiet)
        }

        Some(Commands::Updates { db_path }) => {
            commands::cmd_updates(&load_config(config_path, db_path)?)
        }

        Some(Commands::Ignore {
            package,
            all,
            until,
            clear,
            db_path,
        }) => {
            let config = load_config(config_path, db_path)?;
            commands::cmd_ignore(&config, &package, all, until, clear)
        }

        Some(Commands::Verify {
            file,
            package,
            version_code,
            repo,
            db_path,
        }) => {
            let config = load_config(config_path, db_path)?;
            commands::cmd_verify(&config, &file, &package, version_code, repo.as_deref())
        }

        None => {
            // No command provided, show help
            println!("fdroid-sync v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'fdroid-sync --help' for usage information");
            Ok(())
        }
    }
}
