//! The group AEAD message channel for one room, on top of whatever group
//! key is currently active.
//!
//! Nonces are derived deterministically from `(cid, seq, epoch)` rather
//! than chosen at random, so two messages from the same sender in the
//! same epoch can never collide by construction as long as `seq`
//! strictly increases — which [`crate::peer::PeerRecord`] already
//! enforces on receipt.

use std::collections::VecDeque;

use zeroize::Zeroizing;

use nt_crypto::aead;
use nt_crypto::hash::keyed_hash;
use nt_proto::frame::message_aad;

use crate::error::EngineError;

/// A group message queued because no group key was active yet when it
/// was submitted for encryption.
pub struct PendingMessage {
    pub seq: u64,
    pub plaintext: Vec<u8>,
}

/// Per-room group message encryption/decryption, keyed by the current
/// epoch's group key.
pub struct GroupCore {
    room: String,
    local_cid: String,
    epoch: u64,
    group_key: Option<Zeroizing<[u8; 32]>>,
    send_seq: u64,
    pending: VecDeque<PendingMessage>,
}

fn derive_nonce(cid: &str, seq: u64, epoch: u64) -> [u8; 24] {
    let input = format!("NT-v1|nonce|{cid}|{seq}|{epoch}");
    let out = keyed_hash(24, input.as_bytes(), None);
    out.try_into().expect("keyed_hash(24, ..) returns 24 bytes")
}

impl GroupCore {
    pub fn new(room: impl Into<String>, local_cid: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            local_cid: local_cid.into(),
            epoch: 0,
            group_key: None,
            send_seq: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_keyed(&self) -> bool {
        self.group_key.is_some()
    }

    /// Install a new group key for a new epoch. Any messages buffered
    /// while unkeyed are returned, in submission order, encrypted under
    /// the newly installed key so the caller can flush them.
    pub fn install_epoch(&mut self, epoch: u64, group_key: [u8; 32]) -> Result<Vec<(u64, Vec<u8>)>, EngineError> {
        self.epoch = epoch;
        self.group_key = Some(Zeroizing::new(group_key));

        let mut flushed = Vec::with_capacity(self.pending.len());
        while let Some(msg) = self.pending.pop_front() {
            let ct = self.encrypt_at_seq(msg.seq, &msg.plaintext)?;
            flushed.push((msg.seq, ct));
        }
        Ok(flushed)
    }

    /// Encrypt `plaintext` for the group under the next sequence number.
    /// If no group key is active yet, the message is buffered and `None`
    /// is returned; it will be encrypted and surfaced by the next
    /// [`install_epoch`] call.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Option<(u64, Vec<u8>)>, EngineError> {
        let seq = self.send_seq;
        self.send_seq += 1;

        if self.group_key.is_none() {
            self.pending.push_back(PendingMessage { seq, plaintext: plaintext.to_vec() });
            return Ok(None);
        }
        Ok(Some((seq, self.encrypt_at_seq(seq, plaintext)?)))
    }

    fn encrypt_at_seq(&self, seq: u64, plaintext: &[u8]) -> Result<Vec<u8>, EngineError> {
        let key = self
            .group_key
            .as_deref()
            .expect("encrypt_at_seq called without an active group key");
        let nonce = derive_nonce(&self.local_cid, seq, self.epoch);
        let aad = message_aad(&self.local_cid, seq, self.epoch);
        Ok(aead::seal(key, &nonce, &aad, plaintext)?)
    }

    /// Decrypt a message received from `sender_cid` at `(seq, epoch)`.
    /// Caller is responsible for replay/ordering checks on `seq` via
    /// [`crate::peer::PeerRecord::check_and_advance_seq`] before or
    /// after calling this — this function only performs the
    /// cryptographic operation.
    pub fn decrypt(&self, sender_cid: &str, seq: u64, epoch: u64, ciphertext: &[u8]) -> Result<Vec<u8>, EngineError> {
        let key = self
            .group_key
            .as_deref()
            .ok_or_else(|| EngineError::NotKeyed(sender_cid.to_string()))?;
        if epoch != self.epoch {
            return Err(EngineError::StaleEpoch { current: self.epoch, claimed: epoch });
        }
        let nonce = derive_nonce(sender_cid, seq, epoch);
        let aad = message_aad(sender_cid, seq, epoch);
        let plaintext = aead::open(key, &nonce, &aad, ciphertext)?;
        Ok(plaintext.to_vec())
    }

    /// Zeroize the active group key and drop any still-buffered plaintext.
    pub fn wipe(&mut self) {
        self.group_key = None;
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_until_keyed_then_flushes_in_order() {
        let mut core = GroupCore::new("room-1", "alice");
        assert!(core.encrypt(b"first").unwrap().is_none());
        assert!(core.encrypt(b"second").unwrap().is_none());

        let flushed = core.install_epoch(1, [7u8; 32]).unwrap();
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].0, 0);
        assert_eq!(flushed[1].0, 1);
    }

    #[test]
    fn encrypt_decrypt_roundtrip_once_keyed() {
        let mut alice = GroupCore::new("room-1", "alice");
        alice.install_epoch(1, [7u8; 32]).unwrap();
        let (seq, ct) = alice.encrypt(b"hi bob").unwrap().unwrap();

        let mut bob = GroupCore::new("room-1", "bob");
        bob.install_epoch(1, [7u8; 32]).unwrap();
        let plaintext = bob.decrypt("alice", seq, 1, &ct).unwrap();
        assert_eq!(plaintext, b"hi bob");
    }

    #[test]
    fn decrypt_rejects_stale_epoch() {
        let mut alice = GroupCore::new("room-1", "alice");
        alice.install_epoch(2, [7u8; 32]).unwrap();
        let (seq, ct) = alice.encrypt(b"hi").unwrap().unwrap();

        let mut bob = GroupCore::new("room-1", "bob");
        bob.install_epoch(1, [7u8; 32]).unwrap();
        let err = bob.decrypt("alice", seq, 2, &ct).unwrap_err();
        assert!(matches!(err, EngineError::StaleEpoch { .. }));
    }

    #[test]
    fn different_senders_same_seq_get_different_nonces() {
        let n1 = derive_nonce("alice", 0, 1);
        let n2 = derive_nonce("bob", 0, 1);
        assert_ne!(n1, n2);
    }
}
