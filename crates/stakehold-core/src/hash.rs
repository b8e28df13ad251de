use crate::Hash32;
use sha2::{Digest, Sha256};

/// Domain separation tag for hashing canonical ledger state.
pub const LEDGER_STATE_DOMAIN_V1: &[u8] = b"STAKEHOLD_LEDGER_STATE_V1";

/// Domain separation tag for stake permit signing bytes.
pub const STAKE_PERMIT_DOMAIN_V1: &[u8] = b"STAKEHOLD_STAKE_PERMIT_V1";

/// Compute a deterministic SHA-256 hash of a byte slice.
pub fn sha256(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash32(bytes)
}

/// Compute a domain-separated SHA-256 hash: `H(domain || data)`.
pub fn sha256_domain(domain: &[u8], data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash32(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_separation_changes_digest() {
        let data = b"ledger";
        assert_ne!(sha256(data), sha256_domain(LEDGER_STATE_DOMAIN_V1, data));
        assert_ne!(
            sha256_domain(LEDGER_STATE_DOMAIN_V1, data),
            sha256_domain(STAKE_PERMIT_DOMAIN_V1, data)
        );
    }
}
