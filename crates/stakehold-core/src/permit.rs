//! Signature-authorized stake permits.
//!
//! A permit lets a relayer submit `stake` on a staker's behalf. The staker's [`AccountId`] is the
//! raw ed25519 verifying key, so the signature alone proves who authorized the stake.
//!
//! # Security
//!
//! - Signing bytes are domain-separated and fixed-width
//! - Permits carry a deadline and a per-staker nonce (consumed only on a successful stake)
//! - Never log or expose private keys

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::hash::STAKE_PERMIT_DOMAIN_V1;
use crate::types::{AccountId, ProverId, Timestamp};
use crate::{Hash32, Result, StakeholdError};

/// 64-byte ed25519 signature.
pub type SignatureBytes = [u8; 64];

/// Authorization for one `stake` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePermit {
    pub staker: AccountId,
    pub prover: ProverId,
    pub amount: u128,
    pub nonce: u64,
    pub deadline: Timestamp,
}

impl StakePermit {
    /// `DOMAIN || staker || prover || amount_le || nonce_le || deadline_le`
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(STAKE_PERMIT_DOMAIN_V1.len() + 32 * 2 + 16 + 8 * 2);
        bytes.extend_from_slice(STAKE_PERMIT_DOMAIN_V1);
        bytes.extend_from_slice(&self.staker.0 .0);
        bytes.extend_from_slice(&self.prover.0 .0);
        bytes.extend_from_slice(&self.amount.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes.extend_from_slice(&self.deadline.to_le_bytes());
        bytes
    }

    /// Checks the signature against the staker's key. Deadline and nonce are checked by the engine.
    pub fn verify_signature(&self, signature: &[u8]) -> Result<()> {
        if signature.len() != 64 {
            warn!("Invalid permit signature length: {}", signature.len());
            return Err(StakeholdError::InvalidSignature(
                "Invalid signature length".into(),
            ));
        }
        let key = VerifyingKey::from_bytes(&self.staker.0 .0).map_err(|e| {
            StakeholdError::InvalidSignature(format!("Staker id is not a valid public key: {e}"))
        })?;

        let mut sig_bytes = [0u8; 64];
        sig_bytes.copy_from_slice(signature);
        let signature = Signature::from_bytes(&sig_bytes);

        key.verify(&self.signing_bytes(), &signature).map_err(|_| {
            warn!(staker = %self.staker, "Permit signature verification failed");
            StakeholdError::InvalidSignature("Signature verification failed".into())
        })?;
        debug!(staker = %self.staker, nonce = self.nonce, "Permit signature verified");
        Ok(())
    }
}

/// Staker-side key for signing permits.
#[derive(Clone)]
pub struct PermitSigningKey {
    signing_key: SigningKey,
}

impl PermitSigningKey {
    /// Generate a new random key with the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Load from a hex-encoded 32-byte seed; intermediate buffers are zeroized.
    pub fn from_hex(hex_seed: &str) -> Result<Self> {
        let mut bytes = hex::decode(hex_seed)
            .map_err(|e| StakeholdError::InvalidInput(format!("Invalid hex: {e}")))?;

        if bytes.len() != 32 {
            bytes.zeroize();
            return Err(StakeholdError::InvalidInput(
                "Seed must be exactly 32 bytes".into(),
            ));
        }

        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes);
        bytes.zeroize();

        let key = Self::from_seed(&seed);
        seed.zeroize();
        Ok(key)
    }

    /// Ledger identity of this key (its verifying key bytes).
    pub fn account_id(&self) -> AccountId {
        AccountId(Hash32(self.signing_key.verifying_key().to_bytes()))
    }

    pub fn sign(&self, permit: &StakePermit) -> SignatureBytes {
        self.signing_key.sign(&permit.signing_bytes()).to_bytes()
    }
}

impl std::fmt::Debug for PermitSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermitSigningKey")
            .field("account", &self.account_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permit(key: &PermitSigningKey) -> StakePermit {
        StakePermit {
            staker: key.account_id(),
            prover: ProverId(Hash32([2; 32])),
            amount: 1_000,
            nonce: 0,
            deadline: 500,
        }
    }

    #[test]
    fn signed_permit_verifies() {
        let key = PermitSigningKey::generate();
        let p = permit(&key);
        let sig = key.sign(&p);
        assert!(p.verify_signature(&sig).is_ok());
    }

    #[test]
    fn tampered_permit_is_rejected() {
        let key = PermitSigningKey::from_seed(&[7; 32]);
        let p = permit(&key);
        let sig = key.sign(&p);
        let tampered = StakePermit { amount: 1_001, ..p };
        assert!(matches!(
            tampered.verify_signature(&sig),
            Err(StakeholdError::InvalidSignature(_))
        ));
        assert!(p.verify_signature(&sig[..63]).is_err());
    }

    #[test]
    fn foreign_key_cannot_sign_for_staker() {
        let staker = PermitSigningKey::from_seed(&[1; 32]);
        let mallory = PermitSigningKey::from_seed(&[2; 32]);
        let p = permit(&staker);
        assert!(p.verify_signature(&mallory.sign(&p)).is_err());
    }

    #[test]
    fn hex_seed_roundtrip() {
        let seed_hex = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        let a = PermitSigningKey::from_hex(seed_hex).unwrap();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&hex::decode(seed_hex).unwrap());
        assert_eq!(a.account_id(), PermitSigningKey::from_seed(&seed).account_id());
        assert!(PermitSigningKey::from_hex("abcd").is_err());
    }
}
