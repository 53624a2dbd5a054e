//! Standard, padded base64 ("ORIGINAL" alphabet) — the wire format this
//! protocol uses for every key/byte field.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::CryptoError;

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD.decode(s).map_err(CryptoError::Base64Decode)
}

pub fn decode_array<const N: usize>(s: &str) -> Result<[u8; N], CryptoError> {
    let bytes = decode(s)?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| CryptoError::InvalidKey(format!("expected {N} bytes, got {}", v.len())))
}
