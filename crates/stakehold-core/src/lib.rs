//! stakehold core: prover staking ledger.
//!
//! Stakers back provers with a fungible collateral asset. Collateral is converted into
//! normalized shares by a global exchange-rate vault, and normalized shares into per-prover
//! receipt shares by a second vault per prover. Unstakes move normalized shares into a per-prover
//! escrow pool governed by a non-increasing slash factor, and pay out after a fixed delay.
//! Slashes are requested by the settlement role, finalized after a delay (or immediately by
//! governance), and burn backing pro-rata from the live vault and the escrow pool. A
//! rate-limited dispenser injects bonus collateral through the organic reward path.
//!
//! Design goals:
//! - Deterministic and bounded arithmetic (`u128` amounts, 256-bit intermediates, floor division)
//! - Fail-closed on malformed inputs; every mutation is all-or-nothing
//! - IO-free core (pure state machine); time comes from an injected [`clock::Clock`]

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub mod actions;
pub mod bounds;
pub mod clock;
pub mod config;
pub mod dispense;
pub mod engine;
pub mod escrow;
pub mod hash;
pub mod invariant_rail;
pub mod invariants;
pub mod ledger;
pub mod math;
pub mod permit;
pub mod shared;
pub mod slashing;
pub mod types;
pub mod unstake;
pub mod vault;

pub use actions::{Action, ActionOutcome};
pub use bounds::RuntimeBounds;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StakingConfig;
pub use dispense::{DispenseAmount, DispenseLimiter};
pub use engine::{RewardSplit, SlashOutcome, StakingEngine};
pub use escrow::EscrowPool;
pub use invariant_rail::{first_invariant_counterexample, minimize_counterexample, TraceStep};
pub use invariants::{InvariantCounterexample, InvariantId, InvariantViolation};
pub use permit::{PermitSigningKey, StakePermit};
pub use shared::SharedStakingEngine;
pub use slashing::{
    GovernanceParams, SlashAuthority, SlashClaim, SlashPath, SlashStatus, StaticGovernance,
};
pub use types::{AccountId, Bps, ProverId, Role, Timestamp};
pub use unstake::UnstakeClaim;
pub use vault::ExchangeRateVault;

/// 32-byte identifier used for accounts, provers and commitments.
///
/// Serialized as a lowercase hex string so it can be used as a JSON map key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Hash32> {
        let bytes = hex::decode(s)
            .map_err(|e| StakeholdError::InvalidInput(format!("invalid hex: {e}")))?;
        if bytes.len() != 32 {
            return Err(StakeholdError::InvalidInput(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Hash32(out))
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash32::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors returned by the staking ledger.
///
/// Every variant is a distinct, matchable identifier; fields carry the offending values.
/// A returned error always means the ledger state is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StakeholdError {
    // Validation errors
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Stake amount {amount} is below the minimum {min}")]
    StakeBelowMinimum { amount: u128, min: u128 },

    #[error("Insufficient collateral for {account}: balance {balance}, required {required}")]
    InsufficientCollateral {
        account: AccountId,
        balance: u128,
        required: u128,
    },

    #[error("Prover {prover} not found")]
    ProverNotFound { prover: ProverId },

    #[error("Staker {staker} is already staked with prover {bound} (requested {requested})")]
    AlreadyStakedWithDifferentProver {
        staker: AccountId,
        bound: ProverId,
        requested: ProverId,
    },

    #[error("Unstake amount {requested} exceeds receipt balance {balance}")]
    UnstakeAmountExceedsBalance { requested: u128, balance: u128 },

    #[error("Too many unstake requests (max {max})")]
    TooManyUnstakeRequests { max: usize },

    #[error("Prover {prover} has an unresolved slash request")]
    ProverHasSlashRequest { prover: ProverId },

    #[error("Staker {staker} has no unstake requests")]
    NoUnstakeRequests { staker: AccountId },

    // Rounding edge cases
    #[error("Deposit of {assets} would mint zero shares")]
    ZeroSharesMinted { assets: u128 },

    #[error("Redemption of {shares} shares would return zero assets")]
    ZeroAssetsRedeemed { shares: u128 },

    #[error("Insufficient vault shares: requested {requested}, available {available}")]
    InsufficientShares { requested: u128, available: u128 },

    // Slash lifecycle
    #[error("Slash request {index} not found for prover {prover}")]
    SlashRequestNotFound { prover: ProverId, index: usize },

    #[error("Slash request {index} for prover {prover} is already resolved")]
    SlashRequestAlreadyResolved { prover: ProverId, index: usize },

    #[error("Slash request not ready: ready at {ready_at}, now {now}")]
    SlashNotReady { ready_at: Timestamp, now: Timestamp },

    // Dispense
    #[error("Dispense amount {requested} exceeds available {available}")]
    AmountExceedsAvailableDispense { requested: u128, available: u128 },

    #[error("No prover has live stake to receive a dispense")]
    NoActiveStake,

    // Authorization
    #[error("Caller {caller} is not authorized (requires {required:?})")]
    Unauthorized { caller: AccountId, required: Role },

    // Permits
    #[error("Permit expired: deadline {deadline}, now {now}")]
    PermitExpired { deadline: Timestamp, now: Timestamp },

    #[error("Invalid permit nonce: expected {expected}, got {got}")]
    InvalidPermitNonce { expected: u64, got: u64 },

    #[error("Signature invalid: {0}")]
    InvalidSignature(String),

    // Time
    #[error("Clock went backwards: last {last}, now {now}")]
    ClockWentBackwards { last: Timestamp, now: Timestamp },

    // Bounds and arithmetic
    #[error("Bounded value exceeded: {0}")]
    BoundedValueExceeded(String),

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("Arithmetic underflow: {0}")]
    Underflow(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StakeholdError>;
