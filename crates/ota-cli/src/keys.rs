//! # Keys Subcommand
//!
//! `ota keys issue --app <id>` generates a publisher and a consumer key. The
//! keys are printed once; only their SHA-256 hashes belong in the registry
//! file the server loads. With `--registry <file>` the entry is appended to
//! that file directly.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use ota_api::registry::{InMemoryRegistry, IssuedKeys, RegistryFile};
use ota_core::AppId;

/// Keys subcommand arguments.
#[derive(Args, Debug)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub command: KeysCommand,
}

/// Available keys subcommands.
#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    /// Generate credentials for an application.
    Issue {
        /// Application identifier.
        #[arg(long)]
        app: String,

        /// Registry file to append the new entry to.
        #[arg(long)]
        registry: Option<PathBuf>,
    },
}

/// Execute the keys subcommand.
pub fn run_keys(args: &KeysArgs) -> Result<u8> {
    match &args.command {
        KeysCommand::Issue { app, registry } => run_issue(app, registry.as_deref()),
    }
}

fn run_issue(app: &str, registry: Option<&Path>) -> Result<u8> {
    let keys = IssuedKeys::generate(AppId::new(app)?);

    println!("  app:           {}", keys.app_id);
    println!("  publisher key: {}", keys.publisher_key);
    println!("  consumer key:  {}", keys.consumer_key);
    println!();

    match registry {
        Some(path) => {
            append_entry(path, &keys)?;
            println!("  registry:      {}", path.display());
        }
        None => {
            let file = RegistryFile {
                apps: vec![keys.entry()],
            };
            print!("{}", serde_yaml::to_string(&file)?);
        }
    }
    Ok(0)
}

/// Add the hashes of `keys` to a registry file, creating it when absent.
fn append_entry(path: &Path, keys: &IssuedKeys) -> Result<()> {
    let mut file: RegistryFile = if path.exists() {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&yaml).with_context(|| format!("parsing {}", path.display()))?
    } else {
        RegistryFile::default()
    };

    if file.apps.iter().any(|entry| entry.id == keys.app_id) {
        bail!(
            "application '{}' is already registered in {}",
            keys.app_id,
            path.display()
        );
    }
    file.apps.push(keys.entry());
    InMemoryRegistry::from_file(file.clone())
        .with_context(|| format!("validating {}", path.display()))?;

    std::fs::write(path, serde_yaml::to_string(&file)?)
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(app_id = %keys.app_id, apps = file.apps.len(), "registry updated");
    Ok(())
}
