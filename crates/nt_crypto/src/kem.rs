//! ML-KEM-512 (FIPS 203) — the post-quantum half of the hybrid handshake.
//!
//! Wraps the `ml-kem` crate behind fixed-size byte arrays so the rest of
//! the engine never touches its generic types directly.

use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, EncodedSizeUser, KemCore, MlKem512};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const PUBLIC_KEY_LEN: usize = 800;
pub const SECRET_KEY_LEN: usize = 1632;
pub const CIPHERTEXT_LEN: usize = 768;
pub const SHARED_SECRET_LEN: usize = 32;

/// An ephemeral ML-KEM-512 keypair. Only the responder in a given pair ever
/// decapsulates, so only it needs to retain the secret half.
pub struct KemKeyPair {
    pub public: [u8; PUBLIC_KEY_LEN],
    secret: Zeroizing<[u8; SECRET_KEY_LEN]>,
}

impl KemKeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let (dk, ek) = MlKem512::generate(&mut OsRng);

        let public: [u8; PUBLIC_KEY_LEN] = ek
            .as_bytes()
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("unexpected ML-KEM public key size".into()))?;
        let secret: [u8; SECRET_KEY_LEN] = dk
            .as_bytes()
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("unexpected ML-KEM secret key size".into()))?;

        Ok(Self { public, secret: Zeroizing::new(secret) })
    }

    /// Decapsulate a ciphertext produced by [`encapsulate`] against our public key.
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<[u8; SHARED_SECRET_LEN], CryptoError> {
        if ciphertext.len() != CIPHERTEXT_LEN {
            return Err(CryptoError::InvalidKey("wrong ML-KEM ciphertext length".into()));
        }
        let dk = <MlKem512 as KemCore>::DecapsulationKey::from_bytes((*self.secret).into());
        let ct = Ciphertext::<MlKem512>::try_from(ciphertext)
            .map_err(|_| CryptoError::InvalidKey("malformed ML-KEM ciphertext".into()))?;
        let shared = dk.decapsulate(&ct).map_err(|_| CryptoError::KemDecap)?;
        shared
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::KemDecap)
    }
}

/// Encapsulate to a peer's ML-KEM-512 public key, producing a ciphertext to
/// transmit and the shared secret to mix into the pair key.
pub fn encapsulate(
    peer_public: &[u8; PUBLIC_KEY_LEN],
) -> Result<(Vec<u8>, [u8; SHARED_SECRET_LEN]), CryptoError> {
    let ek = <MlKem512 as KemCore>::EncapsulationKey::from_bytes((*peer_public).into());
    let (ct, shared) = ek.encapsulate(&mut OsRng).map_err(|_| CryptoError::KemEncap)?;
    let shared: [u8; SHARED_SECRET_LEN] = shared
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::KemEncap)?;
    Ok((ct.to_vec(), shared))
}
