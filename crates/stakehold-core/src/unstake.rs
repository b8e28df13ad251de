//! Per-staker unstake claim queue.
//!
//! Claims live in an index-addressed `Vec`. Matured claims are removed with `swap_remove`, so the
//! enumeration order of the remaining claims may change after any `finish_unstake`.

use serde::{Deserialize, Serialize};

use crate::types::{ProverId, Timestamp};
use crate::{Result, StakeholdError};

/// Pending exit of normalized shares through a prover's escrow pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeClaim {
    pub prover: ProverId,
    /// Normalized shares escrowed at request time.
    pub shares: u128,
    /// Escrow slash factor at request time.
    pub slash_factor: u128,
    /// Escrow generation at request time.
    pub generation: u64,
    pub requested_at: Timestamp,
}

impl UnstakeClaim {
    pub fn is_mature(&self, now: Timestamp, delay: u64) -> bool {
        now.saturating_sub(self.requested_at) >= delay
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeQueue {
    claims: Vec<UnstakeClaim>,
}

impl UnstakeQueue {
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn claims(&self) -> &[UnstakeClaim] {
        &self.claims
    }

    pub fn push(&mut self, claim: UnstakeClaim, max: usize) -> Result<()> {
        if self.claims.len() >= max {
            return Err(StakeholdError::TooManyUnstakeRequests { max });
        }
        self.claims.push(claim);
        Ok(())
    }

    /// Removes and returns every matured claim (swap-and-pop).
    pub fn take_matured(&mut self, now: Timestamp, delay: u64) -> Vec<UnstakeClaim> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < self.claims.len() {
            if self.claims[i].is_mature(now, delay) {
                out.push(self.claims.swap_remove(i));
            } else {
                i += 1;
            }
        }
        out
    }
}
