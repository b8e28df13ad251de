//! CLI Command Implementations

pub mod config;
pub mod fuzz;
pub mod simulate;

use anyhow::{Context, Result};
use stakehold_core::StakingConfig;
use std::path::Path;

/// Loads the staking configuration from `path`, or from `STAKEHOLD_*` variables when absent.
pub fn load_config(path: Option<&Path>) -> Result<StakingConfig> {
    match path {
        Some(p) => StakingConfig::from_json_file(p)
            .with_context(|| format!("Failed to load config from {}", p.display())),
        None => StakingConfig::from_env().context("Failed to load config from environment"),
    }
}
