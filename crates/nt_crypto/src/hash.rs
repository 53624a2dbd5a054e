//! BLAKE3-based hashing. `keyed_hash` is the single primitive the handshake,
//! the nonce derivation and the roster hash all build on, using BLAKE3's
//! extendable output to produce the 4/16/24/32-byte digests each call site
//! needs from one building block.

/// Unkeyed BLAKE3 hash, full 32-byte output.
pub fn hash(data: &[u8]) -> [u8; 32] {
    blake3::hash(data).into()
}

/// Keyed (or unkeyed, when `key` is `None`) BLAKE3 hash truncated/extended
/// to exactly `len` bytes via BLAKE3's XOF.
pub fn keyed_hash(len: usize, data: &[u8], key: Option<&[u8; 32]>) -> Vec<u8> {
    let mut hasher = match key {
        Some(k) => blake3::Hasher::new_keyed(k),
        None => blake3::Hasher::new(),
    };
    hasher.update(data);
    let mut out = vec![0u8; len];
    hasher.finalize_xof().fill(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_hash_is_deterministic() {
        let a = keyed_hash(24, b"nonce-input", None);
        let b = keyed_hash(24, b"nonce-input", None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 24);
    }

    #[test]
    fn key_changes_output() {
        let k1 = [1u8; 32];
        let k2 = [2u8; 32];
        let a = keyed_hash(32, b"data", Some(&k1));
        let b = keyed_hash(32, b"data", Some(&k2));
        assert_ne!(a, b);
    }
}
