//! Binary entry point for registry-gc.
//!
//! This binary provides the CLI interface for the retention engine.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use registry_gc::cli::{self, GcCommand, GcOverrides};
use registry_gc::config::GcConfig;
use registry_gc::gc::KeepRule;
use registry_gc::observability::{self, InitOptions};
use registry_gc::registry::SnapshotRegistry;
use std::path::PathBuf;
use std::process::ExitCode;

/// registry-gc - Retention-policy garbage collection for registry images.
#[derive(Parser)]
#[command(name = "registry-gc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Show which images would be deleted, without deleting anything.
    Plan(GcArgs),

    /// Delete the images the retention policy allows.
    Apply {
        #[command(flatten)]
        args: GcArgs,

        /// Report the decision without deleting.
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage configuration.
    Config {
        /// Show current configuration.
        #[arg(long)]
        show: bool,
    },
}

/// Arguments shared by `plan` and `apply`.
#[derive(Args)]
struct GcArgs {
    /// Repository name.
    #[arg(long)]
    repo: Option<String>,

    /// Registry region.
    #[arg(long)]
    region: Option<String>,

    /// Tag prefix and how many images to keep, e.g. --keep release=4 --keep build=8.
    #[arg(long = "keep", value_name = "PREFIX=COUNT")]
    keep: Vec<KeepRule>,

    /// Delete untagged images.
    #[arg(long)]
    delete_untagged: bool,

    /// Path to a describe-images JSON snapshot.
    #[arg(long)]
    inventory: Option<PathBuf>,

    /// Maximum images per delete call.
    #[arg(long)]
    batch_size: Option<usize>,
}

impl From<GcArgs> for GcOverrides {
    fn from(args: GcArgs) -> Self {
        Self {
            repository: args.repo,
            region: args.region,
            keep: args.keep,
            delete_untagged: args.delete_untagged,
            inventory: args.inventory,
            batch_size: args.batch_size,
        }
    }
}

/// Main entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match GcConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_from_settings(
        &config.logging,
        InitOptions {
            verbose: cli.verbose,
        },
    ) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: GcConfig) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Plan(args) => cmd_gc(config, args, true),
        Commands::Apply { args, dry_run } => cmd_gc(config, args, dry_run),
        Commands::Config { show } => cmd_config(&config, show),
    }
}

/// Plan and apply commands.
fn cmd_gc(mut config: GcConfig, args: GcArgs, dry_run: bool) -> anyhow::Result<ExitCode> {
    GcOverrides::from(args).apply(&mut config);
    let command = GcCommand::from_config(&config, dry_run)?;

    let inventory = config
        .inventory
        .clone()
        .context("no inventory snapshot given (use --inventory, `inventory` or REGISTRY_GC_INVENTORY)")?;
    let registry = SnapshotRegistry::open(&inventory)
        .with_context(|| format!("opening inventory {}", inventory.display()))?
        .with_batch_size(config.batch_size);

    let mut stdout = std::io::stdout().lock();
    let outcome = command.execute(&registry, &registry, &mut stdout)?;

    if outcome.has_failures() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Config command.
fn cmd_config(config: &GcConfig, show: bool) -> anyhow::Result<ExitCode> {
    if show {
        cli::config::show(config, &mut std::io::stdout().lock())?;
    } else {
        println!("Use --show to print the effective configuration");
    }
    Ok(ExitCode::SUCCESS)
}
