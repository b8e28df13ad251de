//! Per-prover escrow pool.
//!
//! Normalized shares of pending unstakes leave the prover vault and sit here, decoupled from the
//! vault's exchange rate. Slashes shrink the pool through a multiplicative `slash_factor`
//! (1e27-scaled). Each unstake claim snapshots the factor at request time; its current value is
//! `shares × slash_factor / snapshot`.
//!
//! Generations:
//! - `generation == 0`: never used.
//! - The first unstake request initializes `slash_factor = SCALAR` and bumps the generation.
//! - A wipe-out pins `slash_factor` at 0. Claims of that generation are worth 0 forever; the next
//!   request starts a fresh generation at `SCALAR`.
//!
//! Within a generation the factor never increases.

use serde::{Deserialize, Serialize};

use crate::math::{add, mul_div_floor, sub, SCALAR};
use crate::Result;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowPool {
    escrowed_shares: u128,
    slash_factor: u128,
    generation: u64,
}

impl EscrowPool {
    pub fn escrowed_shares(&self) -> u128 {
        self.escrowed_shares
    }

    pub fn slash_factor(&self) -> u128 {
        self.slash_factor
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once the pool has been initialized and not wiped out.
    pub fn is_live(&self) -> bool {
        self.generation > 0 && self.slash_factor > 0
    }

    /// Adds `shares` for a new claim and returns the `(snapshot, generation)` the claim records.
    pub fn enter(&mut self, shares: u128) -> Result<(u128, u64)> {
        let mut next = *self;
        if !next.is_live() {
            next.slash_factor = SCALAR;
            next.generation = next.generation.saturating_add(1);
        }
        next.escrowed_shares = add(next.escrowed_shares, shares)?;
        *self = next;
        Ok((next.slash_factor, next.generation))
    }

    /// Current value of a claim in normalized shares.
    pub fn claim_value(&self, shares: u128, snapshot: u128, generation: u64) -> Result<u128> {
        if generation != self.generation || self.slash_factor == 0 || snapshot == 0 {
            return Ok(0);
        }
        let value = mul_div_floor(shares, self.slash_factor, snapshot)?;
        Ok(value.min(self.escrowed_shares))
    }

    /// Removes a paid-out claim value from the pool.
    pub fn exit(&mut self, value: u128) -> Result<()> {
        self.escrowed_shares = sub(self.escrowed_shares, value)?;
        Ok(())
    }

    /// Burns `slashed` shares from the pool and recompounds the factor by `remaining / before`.
    ///
    /// Slashing everything (or compounding down to 0) is a wipe-out.
    pub fn slash(&mut self, slashed: u128) -> Result<()> {
        if slashed == 0 {
            return Ok(());
        }
        let before = self.escrowed_shares;
        let remaining = sub(before, slashed)?;
        let factor = if remaining == 0 {
            0
        } else {
            mul_div_floor(self.slash_factor, remaining, before)?
        };
        self.escrowed_shares = remaining;
        self.slash_factor = factor;
        Ok(())
    }
}
