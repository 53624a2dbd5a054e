//! Ephemeral X25519 ECDH keypair, the classical half of the hybrid
//! handshake.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

#[derive(ZeroizeOnDrop)]
pub struct EcdhKeyPair {
    #[zeroize(skip)]
    pub public: [u8; 32],
    secret_bytes: [u8; 32],
}

impl EcdhKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            public: *public.as_bytes(),
            secret_bytes: secret.to_bytes(),
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret);
        Self {
            public: *public.as_bytes(),
            secret_bytes: secret.to_bytes(),
        }
    }

    /// Compute the shared X25519 secret with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &[u8; 32]) -> [u8; 32] {
        let secret = StaticSecret::from(self.secret_bytes);
        let peer = PublicKey::from(*peer_public);
        *secret.diffie_hellman(&peer).as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_is_symmetric() {
        let a = EcdhKeyPair::generate();
        let b = EcdhKeyPair::generate();
        assert_eq!(a.diffie_hellman(&b.public), b.diffie_hellman(&a.public));
    }
}
