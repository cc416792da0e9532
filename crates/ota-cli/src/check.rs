//! # Check Subcommand
//!
//! `ota check --app <id> --version <client version>` answers an update check
//! exactly as the server would, printing the JSON response body.

use anyhow::Result;
use clap::Args;

use ota_core::AppId;
use ota_dist::Distributor;

use crate::DirOverrides;

/// Arguments for `ota check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Application identifier.
    #[arg(long)]
    pub app: String,

    /// Version the client currently runs.
    #[arg(long)]
    pub version: String,

    /// Prefix for artifact URLs, e.g. `https://cdn.example.com`.
    #[arg(long, default_value = "")]
    pub url_prefix: String,
}

/// Execute `ota check`.
pub fn run_check(args: &CheckArgs, dirs: &DirOverrides) -> Result<u8> {
    let app = AppId::new(args.app.as_str())?;
    let dist = Distributor::open(dirs.resolve()?)?;
    let check = dist.resolve(&app, &args.version, &args.url_prefix);
    println!("{}", serde_json::to_string(&check)?);
    Ok(0)
}
