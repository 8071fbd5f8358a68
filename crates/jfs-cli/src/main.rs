use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jfs_config::JfsConfig;

mod commands;
mod errors;
mod logging;

const NO_CONFIG: &str =
    "No configuration file found. Use --config, set JFS_CONFIG, or create jfs.yaml";

#[derive(Parser)]
#[command(name = "jfs", version, about = "JFS - filesystem with database-backed extended attributes")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the datastore directories and the catalog database
    Init {
        /// Datastore root; overrides `store` from the configuration
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Mount the filesystem (blocks until unmounted)
    Mount {
        /// Mount point path
        mountpoint: PathBuf,
        /// Stay attached and log to stderr
        #[arg(short, long)]
        foreground: bool,
    },
    /// Print the effective configuration
    Config,
    /// Validate the configuration file
    Validate,
    /// List the extended attributes of an entry in the link tree
    Attrs {
        /// Path below the link tree root, e.g. /music/a.flac
        path: String,
    },
}

fn find_config() -> Option<PathBuf> {
    // 1. JFS_CONFIG environment variable
    if let Ok(path) = std::env::var("JFS_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. jfs.yaml in current directory
    let cwd_config = PathBuf::from("jfs.yaml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. ~/.config/jfs/jfs.yaml
    if let Some(home) = dirs_next::home_dir() {
        let home_config = home.join(".config/jfs/jfs.yaml");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Load, default and validate the configuration. `store` overrides the
/// configured store and stands in for a missing file.
fn load_config(
    path: Option<&Path>,
    store: Option<PathBuf>,
) -> Result<JfsConfig, Box<dyn std::error::Error>> {
    let mut config = match (path, &store) {
        (Some(path), _) => JfsConfig::from_file(path)?,
        (None, Some(store)) => JfsConfig::with_store(store.clone()),
        (None, None) => return Err(NO_CONFIG.into()),
    };
    if let Some(store) = store {
        config.store = store;
    }

    let config = config.effective();
    config.validate_or_err()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = cli.config.or_else(find_config);

    match cli.command {
        Commands::Validate => {
            let path = config_path.ok_or(NO_CONFIG)?;
            commands::validate::run(&path)
        }
        Commands::Config => {
            let config = load_config(config_path.as_deref(), None)?;
            commands::config::run(&config)
        }
        Commands::Init { store } => {
            let config = load_config(config_path.as_deref(), store)?;
            logging::init(&config.log, false)?;
            commands::init::run(&config)
        }
        Commands::Mount {
            mountpoint,
            foreground,
        } => {
            let config = load_config(config_path.as_deref(), None)?;
            logging::init(&config.log, foreground)?;
            tracing::debug!(store = %config.store.display(), "loaded configuration");
            commands::mount::run(
                &config,
                commands::mount::MountArgs {
                    mountpoint,
                    foreground,
                },
            )
        }
        Commands::Attrs { path } => {
            let config = load_config(config_path.as_deref(), None)?;
            logging::init(&config.log, false)?;
            commands::attrs::run(&config, &path)
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = err.exit_code().clamp(0, 255) as u8;
            return ExitCode::from(code);
        }
    };

    if let Err(e) = run(cli) {
        errors::print_error(e.as_ref());
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
