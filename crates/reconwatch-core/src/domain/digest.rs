//! Deterministic content digests, used for config snapshots and idempotent
//! correlation keys.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a value's canonical JSON serialization.
///
/// Field order in the derived `Serialize` impl is stable across calls for
/// the same type, which is all the determinism this needs: digests are
/// compared only against other digests of the same Rust type.
pub fn digest_json<T: Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).expect("domain types always serialize");
    digest_bytes(&bytes)
}

pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_digest() {
        let a = digest_json(&("x", 1));
        let b = digest_json(&("x", 1));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn different_input_different_digest() {
        assert_ne!(digest_json(&1), digest_json(&2));
    }
}
