// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: database path
fn db_path_arg() -> Arg {
    Arg::new("db_path")
        .short('d')
        .long("db-path")
        .value_name("PATH")
        .help("Database path (overrides the config file)")
}

/// Common argument: repository name
fn name_arg() -> Arg {
    Arg::new("name").required(true).help("Repository name")
}

fn build_cli() -> Command {
    Command::new("fdroid-sync")
        .version(env!("CARGO_PKG_VERSION"))
        .author("fdroid-sync Contributors")
        .about("Synchronize F-Droid repository indexes into a local catalog")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Configuration file (TOML)"),
        )
        .subcommand(
            Command::new("init")
                .about("Initialize the catalog database")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("repo")
                .about("Repository management")
                .subcommand(
                    Command::new("add")
                        .about("Add a repository")
                        .arg(name_arg())
                        .arg(Arg::new("address").required(true).help("Repository address"))
                        .arg(
                            Arg::new("fingerprint")
                                .long("fingerprint")
                                .help("SHA-256 fingerprint of the signing certificate to pin"),
                        )
                        .arg(
                            Arg::new("priority")
                                .short('p')
                                .long("priority")
                                .default_value("0")
                                .help("Processing priority (higher wins metadata conflicts)"),
                        )
                        .arg(Arg::new("username").long("username").help("HTTP basic auth user"))
                        .arg(Arg::new("password").long("password").help("HTTP basic auth password"))
                        .arg(
                            Arg::new("mirror")
                                .long("mirror")
                                .action(clap::ArgAction::Append)
                                .help("Mirror address (repeatable)"),
                        )
                        .arg(
                            Arg::new("disabled")
                                .long("disabled")
                                .action(clap::ArgAction::SetTrue)
                                .help("Add repository in disabled state"),
                        )
                        .arg(db_path_arg()),
                )
                .subcommand(Command::new("list").about("List repositories").arg(db_path_arg()))
                .subcommand(
                    Command::new("remove")
                        .about("Remove a repository and its catalog entries")
                        .arg(name_arg())
                        .arg(db_path_arg()),
                )
                .subcommand(
                    Command::new("enable")
                        .about("Enable a repository")
                        .arg(name_arg())
                        .arg(db_path_arg()),
                )
                .subcommand(
                    Command::new("disable")
                        .about("Disable a repository")
                        .arg(name_arg())
                        .arg(db_path_arg()),
                ),
        )
        .subcommand(
            Command::new("sync")
                .about("Fetch, verify and merge every enabled repository")
                .arg(db_path_arg())
                .arg(
                    Arg::new("installed")
                        .long("installed")
                        .help("JSON snapshot of installed packages"),
                )
                .arg(
                    Arg::new("sequential")
                        .long("sequential")
                        .action(clap::ArgAction::SetTrue)
                        .help("Fetch repositories one at a time"),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .action(clap::ArgAction::SetTrue)
                        .help("Do not show a progress bar"),
                ),
        )
        .subcommand(
            Command::new("updates")
                .about("List installed apps with an available update")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("ignore")
                .about("Ignore updates for an app")
                .arg(Arg::new("package").required(true).help("Package name"))
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(clap::ArgAction::SetTrue)
                        .help("Ignore every future update"),
                )
                .arg(
                    Arg::new("until")
                        .long("until")
                        .help("Ignore updates up to and including this version code"),
                )
                .arg(
                    Arg::new("clear")
                        .long("clear")
                        .action(clap::ArgAction::SetTrue)
                        .help("Stop ignoring updates"),
                )
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify a downloaded APK against the digest in the catalog")
                .arg(Arg::new("file").required(true).help("Path to the APK file"))
                .arg(Arg::new("package").required(true).help("Package name"))
                .arg(Arg::new("version_code").required(true).help("Version code"))
                .arg(Arg::new("repo").long("repo").help("Repository that published the file"))
                .arg(db_path_arg()),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("fdroid-sync.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
