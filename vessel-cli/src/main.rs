//! Command-line driver for the vessel constraint engine.
//!
//! Grows a few random trees, then alternates collision and domain
//! enforcement on them until both are satisfied. An optional TOML file
//! given as the first argument overrides the defaults; see
//! [`scenario::CliConfig`]. Log verbosity is read from `VESSEL_LOG`.

mod scenario;

use std::path::PathBuf;

use scenario::{CliConfig, Scenario};
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("VESSEL_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => CliConfig::load(&path)?,
        None => CliConfig::default(),
    };

    let mut scenario = Scenario::new(config);
    let report = scenario.run()?;
    if !report.settled {
        warn!("stopped before all constraints were satisfied");
    }
    Ok(())
}
