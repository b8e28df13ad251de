//! Accrual-based dispense rate limiter.
//!
//! `available(now) = (now - last_dispense_at) × rate_per_second + carried`
//!
//! A dispense consumes `carried` first; the rest moves `last_dispense_at` forward by
//! `ceil(rest / rate)` seconds and the over-advanced fraction goes back into `carried`, so the
//! remaining allowance is exactly `available - amount`.

use serde::{Deserialize, Serialize};

use crate::math::{add, div_ceil, mul, sub};
use crate::types::Timestamp;
use crate::{Result, StakeholdError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispenseAmount {
    /// Everything available right now.
    All,
    Exact(u128),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispenseLimiter {
    last_dispense_at: Timestamp,
    rate_per_second: u128,
    carried: u128,
    /// Total accrual up to `accrual_anchor_at` (moves on rate changes).
    accrued_at_anchor: u128,
    accrual_anchor_at: Timestamp,
}

impl DispenseLimiter {
    pub fn new(rate_per_second: u128, now: Timestamp) -> DispenseLimiter {
        DispenseLimiter {
            last_dispense_at: now,
            rate_per_second,
            carried: 0,
            accrued_at_anchor: 0,
            accrual_anchor_at: now,
        }
    }

    pub fn rate_per_second(&self) -> u128 {
        self.rate_per_second
    }

    pub fn last_dispense_at(&self) -> Timestamp {
        self.last_dispense_at
    }

    pub fn carried(&self) -> u128 {
        self.carried
    }

    pub fn available(&self, now: Timestamp) -> Result<u128> {
        let elapsed = now.saturating_sub(self.last_dispense_at) as u128;
        add(mul(elapsed, self.rate_per_second)?, self.carried)
    }

    /// Everything ever accrued up to `now`, across rate changes.
    pub fn cumulative_accrual(&self, now: Timestamp) -> Result<u128> {
        let elapsed = now.saturating_sub(self.accrual_anchor_at) as u128;
        add(self.accrued_at_anchor, mul(elapsed, self.rate_per_second)?)
    }

    /// Resolves `amount` and consumes it; on error `self` is untouched.
    pub fn consume(&mut self, amount: DispenseAmount, now: Timestamp) -> Result<u128> {
        let available = self.available(now)?;
        let amount = match amount {
            DispenseAmount::All => available,
            DispenseAmount::Exact(n) => n,
        };
        if amount == 0 {
            return Err(StakeholdError::ZeroAmount);
        }
        if amount > available {
            return Err(StakeholdError::AmountExceedsAvailableDispense {
                requested: amount,
                available,
            });
        }

        let from_carry = amount.min(self.carried);
        let rest = amount - from_carry;
        let mut next = *self;
        next.carried -= from_carry;
        if rest > 0 {
            // rest > 0 implies rate > 0: otherwise available == carried.
            let secs = div_ceil(rest, self.rate_per_second)?;
            let overshoot = sub(mul(secs, self.rate_per_second)?, rest)?;
            let secs = u64::try_from(secs)
                .map_err(|_| StakeholdError::Overflow("dispense seconds".into()))?;
            next.last_dispense_at = self
                .last_dispense_at
                .checked_add(secs)
                .ok_or_else(|| StakeholdError::Overflow("dispense timestamp".into()))?;
            next.carried = add(next.carried, overshoot)?;
        }
        *self = next;
        Ok(amount)
    }

    /// Folds accrual so far (old rate) into the carry and applies `rate` from `now` on.
    pub fn set_rate(&mut self, rate_per_second: u128, now: Timestamp) -> Result<()> {
        let carried = self.available(now)?;
        let accrued = self.cumulative_accrual(now)?;
        *self = DispenseLimiter {
            last_dispense_at: now,
            rate_per_second,
            carried,
            accrued_at_anchor: accrued,
            accrual_anchor_at: now,
        };
        Ok(())
    }
}
