use crate::{Result, StakeholdError};

/// Runtime bounds for the in-memory staking engine.
///
/// These are **safety bounds**, not economic parameters: they cap the live working set of the
/// ledger (provers, stakers, pending slash claims per prover). Resolved slash claims stay in the
/// history and do not count. The per-staker unstake queue capacity is an economic parameter and
/// lives in [`crate::config::LimitsConfig`], checked against
/// [`RuntimeBounds::HARD_MAX_UNSTAKE_REQUESTS`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeBounds {
    pub max_provers: usize,
    pub max_stakers: usize,
    pub max_pending_slashes_per_prover: usize,
}

impl RuntimeBounds {
    pub const HARD_MAX_PROVERS: usize = 1_000_000;
    pub const HARD_MAX_STAKERS: usize = 10_000_000;
    pub const HARD_MAX_PENDING_SLASHES_PER_PROVER: usize = 100_000;
    pub const HARD_MAX_UNSTAKE_REQUESTS: usize = 1024;

    pub const DEFAULT_MAX_PROVERS: usize = 10_000;
    pub const DEFAULT_MAX_STAKERS: usize = 1_000_000;
    pub const DEFAULT_MAX_PENDING_SLASHES_PER_PROVER: usize = 4096;

    pub fn new(
        max_provers: usize,
        max_stakers: usize,
        max_pending_slashes_per_prover: usize,
    ) -> Result<Self> {
        let b = RuntimeBounds {
            max_provers,
            max_stakers,
            max_pending_slashes_per_prover,
        };
        b.validate()?;
        Ok(b)
    }

    pub fn validate(self) -> Result<()> {
        if self.max_provers == 0 || self.max_provers > Self::HARD_MAX_PROVERS {
            return Err(StakeholdError::InvalidInput(format!(
                "max_provers out of bounds: {}",
                self.max_provers
            )));
        }
        if self.max_stakers == 0 || self.max_stakers > Self::HARD_MAX_STAKERS {
            return Err(StakeholdError::InvalidInput(format!(
                "max_stakers out of bounds: {}",
                self.max_stakers
            )));
        }
        if self.max_pending_slashes_per_prover == 0
            || self.max_pending_slashes_per_prover > Self::HARD_MAX_PENDING_SLASHES_PER_PROVER
        {
            return Err(StakeholdError::InvalidInput(format!(
                "max_pending_slashes_per_prover out of bounds: {}",
                self.max_pending_slashes_per_prover
            )));
        }
        Ok(())
    }
}

impl Default for RuntimeBounds {
    fn default() -> Self {
        Self {
            max_provers: Self::DEFAULT_MAX_PROVERS,
            max_stakers: Self::DEFAULT_MAX_STAKERS,
            max_pending_slashes_per_prover: Self::DEFAULT_MAX_PENDING_SLASHES_PER_PROVER,
        }
    }
}
