//! Move Everything Installer CLI
//!
//! Usage:
//!   move-installer connect   - Get SSH access to the Move
//!   move-installer install   - Install or update the core
//!   move-installer status    - Show what is installed and what can be upgraded

mod commands;
mod config;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Move Everything Installer - install and manage Move Everything on Ableton Move
#[derive(Parser)]
#[command(name = "move-installer")]
#[command(author = "Move Everything Installer Contributors")]
#[command(version)]
#[command(about = "Install and manage Move Everything on an Ableton Move")]
#[command(long_about = r#"
Installs the Move Everything firmware extension and its modules on an
Ableton Move over your local network.

First time:
  $ move-installer connect       (enter the code shown on the Move, then confirm)
  $ move-installer install

Afterwards:
  $ move-installer status
  $ move-installer modules upgrade
"#)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Device hostname or IP address (defaults to the configured hostname)
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pair with the device and get this computer's SSH key trusted
    Connect {
        /// Authorization code shown on the device (prompted for if omitted)
        #[arg(long)]
        code: Option<String>,
    },

    /// Show installed versions and available upgrades
    Status {
        /// Skip checking the release channel
        #[arg(long)]
        offline: bool,
    },

    /// Install or reinstall the Move Everything core
    Install {
        /// Install from a local tarball instead of downloading the latest release
        #[arg(long)]
        tarball: Option<PathBuf>,

        /// Reinstall even if the latest version is already installed
        #[arg(short, long)]
        force: bool,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Extra flags passed to the install script
        #[arg(last = true)]
        flags: Vec<String>,
    },

    /// Browse, install, upgrade and remove modules
    Modules {
        #[command(subcommand)]
        action: ModulesAction,
    },

    /// Manage module files on the device
    Assets {
        #[command(subcommand)]
        action: AssetsAction,
    },

    /// Remove temporary files filling the device's root partition
    CleanTmp,

    /// Repair ownership and executable bits of the installation
    FixPermissions,

    /// Show or change the on-device screen reader
    ScreenReader {
        #[arg(value_enum)]
        state: Option<Toggle>,
    },

    /// Remove Move Everything and restore the stock firmware
    Uninstall {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Generate the installer's SSH key
    Keygen {
        /// Replace an existing key
        #[arg(short, long)]
        force: bool,
    },

    /// Print a diagnostics report for bug reports
    Diagnostics {
        /// Error messages to include in the report
        #[arg(short, long)]
        error: Vec<String>,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
enum ModulesAction {
    /// List catalog modules with their installed state
    List,
    /// Install modules from the catalog
    Install {
        /// Module ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Upgrade every outdated module
    Upgrade {
        #[arg(short, long)]
        yes: bool,
    },
    /// Remove an installed module
    Remove {
        id: String,
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum AssetsAction {
    /// List a directory (relative paths start at the modules directory)
    Ls { path: String },
    /// Create a directory
    Mkdir { path: String },
    /// Delete a file or directory
    Rm {
        path: String,
        #[arg(short, long)]
        yes: bool,
    },
    /// Upload files and folders
    Upload {
        /// Local files or folders
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Remote directory
        #[arg(short, long, conflicts_with = "module")]
        to: Option<String>,
        /// Upload into an installed module's asset directory
        #[arg(short, long)]
        module: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Change a setting (hostname, address, repository, poll-interval)
    Set { key: String, value: String },
    /// List current configuration
    List,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_target(false)
        .init();

    if let Err(err) = run(cli).await {
        commands::report_error(&err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    use commands::DeviceContext;

    match cli.command {
        Commands::Connect { code } => commands::connect::run(DeviceContext::load(cli.host)?, code).await,
        Commands::Status { offline } => {
            commands::status::run(DeviceContext::load(cli.host)?, offline).await
        }
        Commands::Install { tarball, force, yes, flags } => {
            commands::install::run(DeviceContext::load(cli.host)?, tarball, force, yes, flags).await
        }
        Commands::Modules { action } => {
            let ctx = DeviceContext::load(cli.host)?;
            match action {
                ModulesAction::List => commands::modules::list(ctx).await,
                ModulesAction::Install { ids } => commands::modules::install(ctx, ids).await,
                ModulesAction::Upgrade { yes } => commands::modules::upgrade(ctx, yes).await,
                ModulesAction::Remove { id, yes } => commands::modules::remove(ctx, id, yes).await,
            }
        }
        Commands::Assets { action } => {
            let ctx = DeviceContext::load(cli.host)?;
            match action {
                AssetsAction::Ls { path } => commands::assets::list(ctx, path).await,
                AssetsAction::Mkdir { path } => commands::assets::mkdir(ctx, path).await,
                AssetsAction::Rm { path, yes } => commands::assets::remove(ctx, path, yes).await,
                AssetsAction::Upload { files, to, module } => {
                    commands::assets::upload(ctx, files, to, module).await
                }
            }
        }
        Commands::CleanTmp => commands::maintenance::clean_tmp(DeviceContext::load(cli.host)?).await,
        Commands::FixPermissions => {
            commands::maintenance::fix_permissions(DeviceContext::load(cli.host)?).await
        }
        Commands::ScreenReader { state } => {
            let enable = state.map(|s| matches!(s, Toggle::On));
            commands::maintenance::screen_reader(DeviceContext::load(cli.host)?, enable).await
        }
        Commands::Uninstall { yes } => {
            commands::maintenance::uninstall(DeviceContext::load(cli.host)?, yes).await
        }
        Commands::Keygen { force } => commands::keygen::run(force).await,
        Commands::Diagnostics { error, output } => {
            commands::diagnostics::run(DeviceContext::load(cli.host)?, error, output).await
        }
        Commands::Config { action } => run_config(action),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "move-installer", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn run_config(action: ConfigAction) -> Result<()> {
    use colored::Colorize;

    match action {
        ConfigAction::Set { key, value } => {
            let mut cfg = config::Config::load()?;
            cfg.set(&key, &value)?;
            cfg.save()?;
            commands::success(&format!("{} = {}", key.cyan(), value));
        }
        ConfigAction::List => {
            let cfg = config::Config::load()?;
            println!("{}", "Configuration:".bold());
            for (key, value) in cfg.entries() {
                println!("  {} {:<14} {}", "•".cyan(), key, value);
            }
        }
        ConfigAction::Path => {
            let path = config::Config::path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
