//! Authenticated Encryption with Associated Data.
//!
//! Uses XChaCha20-Poly1305 (192-bit nonce). Key size: 32 bytes. Nonce: 24
//! bytes. Tag: 16 bytes. Unlike a one-shot "encrypt" helper that generates
//! and prepends its own nonce, the group channel and the GK wrap both need
//! the nonce to travel as its own wire field, so the nonce is always an
//! explicit argument here.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 24;
pub const KEY_LEN: usize = 32;

/// A fresh random 24-byte nonce, for callers that don't derive one
/// deterministically (e.g. GK wrapping).
pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Seal `plaintext` under `key`/`nonce`, binding `aad`.
pub fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    cipher
        .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)
}

/// Open a ciphertext sealed by [`seal`]. Returns zeroizing plaintext.
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}

/// Wrap a 32-byte key under another 32-byte wrapping key, with a fresh
/// random nonce returned alongside the ciphertext.
pub fn wrap_key(
    wrap_key: &[u8; KEY_LEN],
    aad: &[u8],
    key_to_wrap: &[u8; KEY_LEN],
) -> Result<([u8; NONCE_LEN], Vec<u8>), CryptoError> {
    let nonce = random_nonce();
    let ct = seal(wrap_key, &nonce, aad, key_to_wrap)?;
    Ok((nonce, ct))
}

/// Unwrap a key produced by [`wrap_key`] (or by a peer using the same AAD).
pub fn unwrap_key(
    wrap_key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    wrapped: &[u8],
) -> Result<[u8; KEY_LEN], CryptoError> {
    let plaintext = open(wrap_key, nonce, aad, wrapped)?;
    if plaintext.len() != KEY_LEN {
        return Err(CryptoError::InvalidKey("unwrapped key wrong length".into()));
    }
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&plaintext);
    Ok(out)
}
