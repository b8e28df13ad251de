use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{hash, Hash32, Result, StakeholdError};

pub const BPS_U16: u16 = 10_000;
pub const BPS_U128: u128 = 10_000;

/// Seconds since an arbitrary epoch, as reported by the injected clock.
pub type Timestamp = u64;

/// Basis points in `[0, 10_000]` (correct-by-construction).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Bps(u16);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const MAX: Bps = Bps(BPS_U16);

    /// Constructs a bounded bps value.
    ///
    /// Preconditions:
    /// - `v <= 10_000` (else returns an error; fail-closed).
    pub fn new(v: u16) -> Result<Bps> {
        if v <= BPS_U16 {
            Ok(Bps(v))
        } else {
            Err(StakeholdError::InvalidInput(format!(
                "bps out of range: {v} > {BPS_U16}"
            )))
        }
    }

    /// Clamps `v` to `10_000`.
    pub const fn saturating(v: u16) -> Bps {
        if v > BPS_U16 {
            Bps(BPS_U16)
        } else {
            Bps(v)
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }

    pub fn as_u128(self) -> u128 {
        self.0 as u128
    }

    /// `10_000 - self`.
    pub fn complement(self) -> Bps {
        Bps(BPS_U16 - self.0)
    }
}

impl TryFrom<u16> for Bps {
    type Error = StakeholdError;
    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Bps::new(value)
    }
}

impl From<Bps> for u16 {
    fn from(value: Bps) -> u16 {
        value.0
    }
}

/// Ledger account (staker, prover owner, treasury or role holder).
///
/// Accounts that stake through a permit use their ed25519 verifying key bytes as the id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub Hash32);

impl AccountId {
    pub const DOMAIN_V1: &'static [u8] = b"STAKEHOLD_ACCOUNT_LABEL_V1";

    /// Deterministic account derived from a human-readable label (role defaults, scenarios).
    pub fn from_label(label: &str) -> AccountId {
        AccountId(hash::sha256_domain(Self::DOMAIN_V1, label.as_bytes()))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0 .0[..8]))
    }
}

/// Prover identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProverId(pub Hash32);

impl ProverId {
    pub const DOMAIN_V1: &'static [u8] = b"STAKEHOLD_PROVER_ID_V1";

    /// Deterministically derives a prover identifier from its owner and a registry nonce.
    pub fn derive(owner: AccountId, nonce: u64) -> ProverId {
        let mut bytes = Vec::with_capacity(32 + 8);
        bytes.extend_from_slice(&owner.0 .0);
        bytes.extend_from_slice(&nonce.to_le_bytes());
        ProverId(hash::sha256_domain(Self::DOMAIN_V1, &bytes))
    }
}

impl fmt::Display for ProverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0 .0[..8]))
    }
}

/// Roles recognized by the ledger's authorization checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Privileged protocol owner (slash finalization after delay, cancellation, dispense rate).
    Owner,
    /// Governance collaborator (escalated slash finalization).
    Governance,
    /// Settlement collaborator (rewards and slash reports).
    Settlement,
    /// Designated dispenser.
    Dispenser,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bps_rejects_out_of_range() {
        assert!(Bps::new(10_000).is_ok());
        assert!(Bps::new(10_001).is_err());
        assert_eq!(Bps::new(30).unwrap().complement().get(), 9_970);
    }

    #[test]
    fn bps_deserialization_is_bounded() {
        let ok: Bps = serde_json::from_str("1000").unwrap();
        assert_eq!(ok.get(), 1_000);
        assert!(serde_json::from_str::<Bps>("20000").is_err());
    }

    #[test]
    fn prover_ids_differ_per_nonce() {
        let owner = AccountId::from_label("owner");
        assert_ne!(ProverId::derive(owner, 0), ProverId::derive(owner, 1));
        assert_eq!(ProverId::derive(owner, 3), ProverId::derive(owner, 3));
    }
}
