//! Scalar math: bounded `u128` arithmetic with 256-bit intermediates.

use ethnum::U256;

use crate::types::{Bps, BPS_U128};
use crate::{Result, StakeholdError};

/// Unit of the proportional multiplier used for slash factors (1e27).
pub const SCALAR: u128 = 1_000_000_000_000_000_000_000_000_000;

fn narrow(v: U256, what: &str) -> Result<u128> {
    if v > U256::from(u128::MAX) {
        return Err(StakeholdError::Overflow(format!("u128 overflow in {what}")));
    }
    Ok(v.as_u128())
}

/// `floor(a * b / denom)` without intermediate overflow.
pub fn mul_div_floor(a: u128, b: u128, denom: u128) -> Result<u128> {
    if denom == 0 {
        return Err(StakeholdError::InvalidInput("division by zero".into()));
    }
    let num = U256::from(a) * U256::from(b);
    narrow(num / U256::from(denom), "mul_div_floor")
}

/// `ceil(a / denom)`.
pub fn div_ceil(a: u128, denom: u128) -> Result<u128> {
    if denom == 0 {
        return Err(StakeholdError::InvalidInput("division by zero".into()));
    }
    Ok(a / denom + u128::from(a % denom != 0))
}

pub fn add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b)
        .ok_or_else(|| StakeholdError::Overflow("u128 overflow in add".into()))
}

pub fn sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b)
        .ok_or_else(|| StakeholdError::Underflow("u128 underflow in sub".into()))
}

pub fn mul(a: u128, b: u128) -> Result<u128> {
    a.checked_mul(b)
        .ok_or_else(|| StakeholdError::Overflow("u128 overflow in mul".into()))
}

/// `floor(amount * bps / 10_000)`.
pub fn floor_bps(amount: u128, bps: Bps) -> Result<u128> {
    mul_div_floor(amount, bps.as_u128(), BPS_U128)
}
