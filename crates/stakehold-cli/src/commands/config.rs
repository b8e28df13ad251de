use anyhow::{Context, Result};
use stakehold_core::StakingConfig;

pub fn run(print_default: bool, effective: &StakingConfig) -> Result<()> {
    let config = if print_default {
        StakingConfig::default()
    } else {
        effective.clone()
    };
    let json = serde_json::to_string_pretty(&config).context("Failed to encode config")?;
    println!("{json}");
    Ok(())
}
