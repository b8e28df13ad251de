//! Configuration management for the staking ledger.
//!
//! # Configuration Sources
//!
//! Configuration can be loaded from:
//! - Environment variables (prefixed with `STAKEHOLD_`)
//! - JSON files
//! - Programmatic defaults / the builder
//!
//! # Example
//!
//! ```rust,ignore
//! use stakehold_core::config::StakingConfig;
//!
//! let config = StakingConfig::builder()
//!     .unstake_delay_secs(3 * 24 * 60 * 60)
//!     .protocol_fee_bps(50)
//!     .build()?;
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bounds::RuntimeBounds;
use crate::types::{AccountId, Bps};
use crate::{Hash32, Result, StakeholdError};

const DAY_SECS: u64 = 24 * 60 * 60;

/// Complete staking configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Time locks.
    pub delays: DelaysConfig,

    /// Protocol fee.
    pub fees: FeesConfig,

    /// Stake and queue limits.
    pub limits: LimitsConfig,

    /// Dispense rate limiter.
    pub dispense: DispenseConfig,

    /// Role accounts.
    pub roles: RolesConfig,

    /// Logging configuration (consumed by the CLI).
    pub logging: LoggingConfig,
}

impl StakingConfig {
    /// Create a new configuration builder.
    pub fn builder() -> StakingConfigBuilder {
        StakingConfigBuilder::default()
    }

    /// Load configuration from environment variables on top of the defaults.
    ///
    /// - `STAKEHOLD_UNSTAKE_DELAY_SECS`, `STAKEHOLD_SLASH_DELAY_SECS`,
    ///   `STAKEHOLD_CANCEL_DELAY_SECS`
    /// - `STAKEHOLD_PROTOCOL_FEE_BPS`
    /// - `STAKEHOLD_MIN_STAKE_AMOUNT`, `STAKEHOLD_MAX_UNSTAKE_REQUESTS`
    /// - `STAKEHOLD_DISPENSE_RATE_PER_SECOND`
    /// - `STAKEHOLD_OWNER`, `STAKEHOLD_GOVERNANCE`, `STAKEHOLD_SETTLEMENT`,
    ///   `STAKEHOLD_DISPENSER`, `STAKEHOLD_TREASURY` (64 hex chars each)
    /// - `STAKEHOLD_LOG_LEVEL`, `STAKEHOLD_LOG_JSON`
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StakeholdError::Config(format!("read {}: {e}", path.display())))?;
        let config: StakingConfig = serde_json::from_str(&raw)
            .map_err(|e| StakeholdError::Config(format!("parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = var("STAKEHOLD_UNSTAKE_DELAY_SECS") {
            config.delays.unstake_delay_secs = parse_var("STAKEHOLD_UNSTAKE_DELAY_SECS", &v)?;
        }
        if let Some(v) = var("STAKEHOLD_SLASH_DELAY_SECS") {
            config.delays.slash_delay_secs = parse_var("STAKEHOLD_SLASH_DELAY_SECS", &v)?;
        }
        if let Some(v) = var("STAKEHOLD_CANCEL_DELAY_SECS") {
            config.delays.cancel_delay_secs = parse_var("STAKEHOLD_CANCEL_DELAY_SECS", &v)?;
        }
        if let Some(v) = var("STAKEHOLD_PROTOCOL_FEE_BPS") {
            let bps: u16 = parse_var("STAKEHOLD_PROTOCOL_FEE_BPS", &v)?;
            config.fees.protocol_fee_bps = Bps::new(bps)
                .map_err(|e| StakeholdError::Config(format!("STAKEHOLD_PROTOCOL_FEE_BPS: {e}")))?;
        }
        if let Some(v) = var("STAKEHOLD_MIN_STAKE_AMOUNT") {
            config.limits.min_stake_amount = parse_var("STAKEHOLD_MIN_STAKE_AMOUNT", &v)?;
        }
        if let Some(v) = var("STAKEHOLD_MAX_UNSTAKE_REQUESTS") {
            config.limits.max_unstake_requests = parse_var("STAKEHOLD_MAX_UNSTAKE_REQUESTS", &v)?;
        }
        if let Some(v) = var("STAKEHOLD_DISPENSE_RATE_PER_SECOND") {
            config.dispense.rate_per_second =
                parse_var("STAKEHOLD_DISPENSE_RATE_PER_SECOND", &v)?;
        }
        for (name, slot) in [
            ("STAKEHOLD_OWNER", &mut config.roles.owner),
            ("STAKEHOLD_GOVERNANCE", &mut config.roles.governance),
            ("STAKEHOLD_SETTLEMENT", &mut config.roles.settlement),
            ("STAKEHOLD_DISPENSER", &mut config.roles.dispenser),
            ("STAKEHOLD_TREASURY", &mut config.roles.treasury),
        ] {
            if let Some(v) = var(name) {
                let id = Hash32::from_hex(&v)
                    .map_err(|e| StakeholdError::Config(format!("Invalid {name}: {e}")))?;
                *slot = AccountId(id);
            }
        }
        if let Some(level) = var("STAKEHOLD_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(v) = var("STAKEHOLD_LOG_JSON") {
            config.logging.json_output = parse_var("STAKEHOLD_LOG_JSON", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.delays.unstake_delay_secs == 0 {
            return Err(StakeholdError::Config(
                "unstake_delay_secs must be greater than 0".into(),
            ));
        }
        if self.delays.slash_delay_secs == 0 {
            return Err(StakeholdError::Config(
                "slash_delay_secs must be greater than 0".into(),
            ));
        }
        if self.delays.cancel_delay_secs == 0 {
            return Err(StakeholdError::Config(
                "cancel_delay_secs must be greater than 0".into(),
            ));
        }

        if self.limits.min_stake_amount == 0 {
            return Err(StakeholdError::Config(
                "min_stake_amount must be greater than 0".into(),
            ));
        }
        if self.limits.max_unstake_requests == 0
            || self.limits.max_unstake_requests > RuntimeBounds::HARD_MAX_UNSTAKE_REQUESTS
        {
            return Err(StakeholdError::Config(format!(
                "max_unstake_requests must be between 1 and {}",
                RuntimeBounds::HARD_MAX_UNSTAKE_REQUESTS
            )));
        }

        // Fees routed to the treasury must not land back in the settlement wallet they came from.
        if self.roles.settlement == self.roles.treasury {
            return Err(StakeholdError::Config(
                "settlement and treasury accounts must differ".into(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| StakeholdError::Config(format!("Invalid {name}: {e}")))
}

/// Time-lock configuration (seconds).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelaysConfig {
    /// Escrow time before an unstake claim can be paid out.
    pub unstake_delay_secs: u64,

    /// Minimum age before the owner role may finalize a slash.
    pub slash_delay_secs: u64,

    /// Base of the public finalize/cancel deadline (governance voting window is added).
    pub cancel_delay_secs: u64,
}

impl Default for DelaysConfig {
    fn default() -> Self {
        Self {
            unstake_delay_secs: 21 * DAY_SECS,
            slash_delay_secs: 7 * DAY_SECS,
            cancel_delay_secs: 14 * DAY_SECS,
        }
    }
}

/// Fee configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeesConfig {
    /// Protocol cut of every gross reward, routed to the treasury.
    pub protocol_fee_bps: Bps,
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            protocol_fee_bps: Bps::saturating(30),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Minimum collateral per stake call.
    pub min_stake_amount: u128,

    /// Capacity of each staker's unstake queue.
    pub max_unstake_requests: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_stake_amount: 1_000_000_000_000_000_000,
            max_unstake_requests: 32,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispenseConfig {
    /// Initial dispense accrual per second (0 disables dispensing).
    pub rate_per_second: u128,
}

/// Role accounts.
///
/// Defaults are deterministic labels so simulations and tests agree on identities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolesConfig {
    pub owner: AccountId,
    pub governance: AccountId,
    pub settlement: AccountId,
    pub dispenser: AccountId,
    pub treasury: AccountId,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            owner: AccountId::from_label("owner"),
            governance: AccountId::from_label("governance"),
            settlement: AccountId::from_label("settlement"),
            dispenser: AccountId::from_label("dispenser"),
            treasury: AccountId::from_label("treasury"),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// JSON output format.
    pub json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json_output: false,
        }
    }
}

/// Builder for StakingConfig.
#[derive(Default)]
pub struct StakingConfigBuilder {
    config: StakingConfig,
    invalid_fee: Option<u16>,
}

impl StakingConfigBuilder {
    pub fn unstake_delay_secs(mut self, secs: u64) -> Self {
        self.config.delays.unstake_delay_secs = secs;
        self
    }

    pub fn slash_delay_secs(mut self, secs: u64) -> Self {
        self.config.delays.slash_delay_secs = secs;
        self
    }

    pub fn cancel_delay_secs(mut self, secs: u64) -> Self {
        self.config.delays.cancel_delay_secs = secs;
        self
    }

    /// Set the protocol fee; out-of-range values fail at `build`.
    pub fn protocol_fee_bps(mut self, bps: u16) -> Self {
        match Bps::new(bps) {
            Ok(b) => self.config.fees.protocol_fee_bps = b,
            Err(_) => self.invalid_fee = Some(bps),
        }
        self
    }

    pub fn min_stake_amount(mut self, amount: u128) -> Self {
        self.config.limits.min_stake_amount = amount;
        self
    }

    pub fn max_unstake_requests(mut self, max: usize) -> Self {
        self.config.limits.max_unstake_requests = max;
        self
    }

    pub fn dispense_rate_per_second(mut self, rate: u128) -> Self {
        self.config.dispense.rate_per_second = rate;
        self
    }

    pub fn owner(mut self, account: AccountId) -> Self {
        self.config.roles.owner = account;
        self
    }

    pub fn governance(mut self, account: AccountId) -> Self {
        self.config.roles.governance = account;
        self
    }

    pub fn settlement(mut self, account: AccountId) -> Self {
        self.config.roles.settlement = account;
        self
    }

    pub fn dispenser(mut self, account: AccountId) -> Self {
        self.config.roles.dispenser = account;
        self
    }

    pub fn treasury(mut self, account: AccountId) -> Self {
        self.config.roles.treasury = account;
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Enable JSON log output.
    pub fn json_logs(mut self, enabled: bool) -> Self {
        self.config.logging.json_output = enabled;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<StakingConfig> {
        if let Some(bps) = self.invalid_fee {
            return Err(StakeholdError::Config(format!(
                "protocol_fee_bps out of range: {bps}"
            )));
        }
        self.config.validate()?;
        Ok(self.config)
    }
}
