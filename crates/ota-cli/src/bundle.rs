//! # Bundle Subcommands
//!
//! `ota manifest <dir>` prints the manifest the pipeline would freeze for a
//! content directory. `ota pack <dir> <out.zip>` produces an uploadable
//! bundle.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use ota_core::sha256_file;
use ota_dist::{compute_manifest, ArchiveCodec, ZipCodec};

/// Arguments for `ota manifest`.
#[derive(Args, Debug)]
pub struct ManifestArgs {
    /// Content directory to hash.
    pub dir: PathBuf,
}

/// Arguments for `ota pack`.
#[derive(Args, Debug)]
pub struct PackArgs {
    /// Content directory to pack.
    pub dir: PathBuf,

    /// Output archive path.
    pub out: PathBuf,
}

/// Execute `ota manifest`.
pub fn run_manifest(args: &ManifestArgs) -> Result<u8> {
    let manifest = compute_manifest(&args.dir)
        .with_context(|| format!("hashing {}", args.dir.display()))?;
    let json = manifest.to_json_vec()?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&json)?;
    writeln!(stdout)?;
    tracing::info!(files = manifest.len(), "manifest computed");
    Ok(0)
}

/// Execute `ota pack`.
pub fn run_pack(args: &PackArgs) -> Result<u8> {
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let files = ZipCodec
        .compress(&args.dir, &args.out)
        .with_context(|| format!("packing {}", args.dir.display()))?;
    let digest = sha256_file(&args.out)
        .with_context(|| format!("hashing {}", args.out.display()))?;

    println!("  bundle: {}", args.out.display());
    println!("  files:  {files}");
    println!("  sha256: {digest}");
    Ok(0)
}
