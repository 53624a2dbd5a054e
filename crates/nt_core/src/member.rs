//! The local participant's own key material.

use nt_crypto::ecdh::EcdhKeyPair;
use nt_crypto::identity::IdentityKeyPair;
use nt_crypto::kem::KemKeyPair;
use nt_crypto::rng::gen_cid;

/// Everything this process needs to speak for itself: a stable opaque id
/// and a long-term signing identity. Ephemeral ECDH/KEM keys are
/// per-handshake and live on [`crate::session::Session`], not here.
pub struct LocalMember {
    pub cid: String,
    pub identity: IdentityKeyPair,
}

impl LocalMember {
    pub fn generate() -> Self {
        Self {
            cid: gen_cid(),
            identity: IdentityKeyPair::generate(),
        }
    }

    /// Fresh ephemeral ECDH and KEM keypairs for one handshake attempt.
    pub fn fresh_ephemeral(&self) -> Result<(EcdhKeyPair, KemKeyPair), nt_crypto::CryptoError> {
        Ok((EcdhKeyPair::generate(), KemKeyPair::generate()?))
    }

    /// Zeroize the long-term identity key. Irreversible; callers must
    /// treat this member as unusable afterwards.
    pub fn wipe(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_distinct_members() {
        let a = LocalMember::generate();
        let b = LocalMember::generate();
        assert_ne!(a.cid, b.cid);
        assert_ne!(a.identity.public, b.identity.public);
    }
}
