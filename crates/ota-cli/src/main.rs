//! # ota CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ota_cli::bundle::{run_manifest, run_pack, ManifestArgs, PackArgs};
use ota_cli::check::{run_check, CheckArgs};
use ota_cli::keys::{run_keys, KeysArgs};
use ota_cli::publish::{run_publish, PublishArgs};
use ota_cli::reconcile::{run_reconcile, ReconcileArgs};
use ota_cli::DirOverrides;

/// OTA Stack CLI.
///
/// Packs content into bundles, publishes versions with full and delta
/// artifacts, answers update checks, and issues application credentials.
#[derive(Parser, Debug)]
#[command(name = "ota", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    dirs: DirOverrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the checksum manifest of a content directory.
    Manifest(ManifestArgs),

    /// Pack a content directory into a bundle archive.
    Pack(PackArgs),

    /// Publish a bundle as a new version.
    Publish(PublishArgs),

    /// Resolve an update check for a client version.
    Check(CheckArgs),

    /// Issue application credentials.
    Keys(KeysArgs),

    /// Repair state left by an interrupted publish.
    Reconcile(ReconcileArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level.
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Manifest(args) => run_manifest(args),
        Commands::Pack(args) => run_pack(args),
        Commands::Publish(args) => run_publish(args, &cli.dirs),
        Commands::Check(args) => run_check(args, &cli.dirs),
        Commands::Keys(args) => run_keys(args),
        Commands::Reconcile(args) => run_reconcile(args, &cli.dirs),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
