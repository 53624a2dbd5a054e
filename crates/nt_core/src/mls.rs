//! Group membership and group-key epoch management ("GK").
//!
//! Only the room's initiator mints group keys. Every member (including
//! the initiator) tracks the current roster and its hash so it can
//! detect when its own view of the room has drifted from the key
//! distribution it just received.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use nt_crypto::aead;
use nt_crypto::hash::keyed_hash;
use nt_crypto::rng::gen_key32;
use nt_proto::frame::{Frame, GkWrap};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::peer::PeerRecord;

/// Hash of a sorted member roster, used to detect membership skew
/// between the sender and receiver of a `gk` frame: a 16-byte BLAKE3
/// digest of the JSON-encoded, sorted cid list, base64-encoded.
pub fn roster_hash(members: &[String]) -> String {
    let mut sorted = members.to_vec();
    sorted.sort();
    let json = serde_json::to_vec(&sorted).expect("serializing a Vec<String> cannot fail");
    let digest = keyed_hash(16, &json, None);
    nt_crypto::b64::encode(&digest)
}

fn gk_aad(epoch: u64, rh: &str) -> Vec<u8> {
    format!(r#"{{"t":"gk","e":{epoch},"rh":"{rh}"}}"#).into_bytes()
}

/// The pre-roster-binding AAD shape, tried as a fallback when unwrapping
/// a wrap fails under the current (roster-bound) AAD. Lets this engine
/// keep talking to a peer that hasn't upgraded its `gk` framing yet.
fn gk_aad_legacy(epoch: u64) -> Vec<u8> {
    format!(r#"{{"t":"gk","e":{epoch}}}"#).into_bytes()
}

pub struct MlsLite {
    local_cid: String,
    is_initiator: bool,
    members: Vec<String>,
    epoch: u64,
    debounce: Duration,
    throttle: Duration,
    last_external_rekey: Option<Instant>,
    pending_debounce_due: Option<Instant>,
}

impl MlsLite {
    pub fn new(local_cid: impl Into<String>, is_initiator: bool, config: &EngineConfig) -> Self {
        let local_cid = local_cid.into();
        Self {
            members: vec![local_cid.clone()],
            local_cid,
            is_initiator,
            epoch: 0,
            debounce: config.rekey_debounce,
            throttle: config.rekey_throttle,
            last_external_rekey: None,
            pending_debounce_due: None,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_initiator(&self) -> bool {
        self.is_initiator
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn current_roster_hash(&self) -> String {
        roster_hash(&self.members)
    }

    /// Add a member and arm the rekey debounce. Returns the instant by
    /// which a rekey must fire, coalescing with any already-pending one
    /// rather than pushing it further out.
    pub fn add_member(&mut self, cid: impl Into<String>, now: Instant) -> Instant {
        let cid = cid.into();
        if !self.members.contains(&cid) {
            self.members.push(cid);
        }
        self.arm_debounce(now)
    }

    pub fn remove_member(&mut self, cid: &str, now: Instant) -> Instant {
        self.members.retain(|m| m != cid);
        self.arm_debounce(now)
    }

    fn arm_debounce(&mut self, now: Instant) -> Instant {
        let due = now + self.debounce;
        let due = match self.pending_debounce_due {
            // A membership change already has a rekey scheduled: coalesce
            // onto it rather than resetting the clock, so a burst of
            // joins/leaves produces one rekey, not one per change.
            Some(existing) => existing,
            None => due,
        };
        self.pending_debounce_due = Some(due);
        due
    }

    /// Call once the debounce timer actually fires. Clears the armed
    /// state so the next membership change arms a fresh one.
    pub fn take_due_rekey(&mut self, now: Instant) -> bool {
        match self.pending_debounce_due {
            Some(due) if now >= due => {
                self.pending_debounce_due = None;
                true
            }
            _ => false,
        }
    }

    /// Whether an externally-triggered (`gk_req`) rekey is currently
    /// allowed, given the throttle window. Updates internal state as if
    /// the rekey were granted.
    pub fn allow_external_rekey(&mut self, now: Instant) -> bool {
        match self.last_external_rekey {
            Some(last) if now.duration_since(last) < self.throttle => false,
            _ => {
                self.last_external_rekey = Some(now);
                true
            }
        }
    }

    /// Mint a fresh group key for the next epoch and wrap it for every
    /// keyed peer. Only the initiator calls this.
    pub fn mint_epoch(
        &mut self,
        peers: &HashMap<String, PeerRecord>,
    ) -> Result<([u8; 32], Frame), EngineError> {
        debug_assert!(self.is_initiator, "only the initiator mints group keys");

        self.epoch += 1;
        let group_key = gen_key32();
        let rh = self.current_roster_hash();
        let aad = gk_aad(self.epoch, &rh);

        let mut wraps = Vec::new();
        for cid in &self.members {
            if cid == &self.local_cid {
                continue;
            }
            let Some(peer) = peers.get(cid) else { continue };
            let Some(pair_key) = peer.pair_key.as_ref() else { continue };
            let (nonce, ct) = aead::wrap_key(pair_key, &aad, &group_key)?;
            wraps.push(GkWrap {
                cid: cid.clone(),
                n: nt_crypto::b64::encode(&nonce),
                ct: nt_crypto::b64::encode(&ct),
            });
        }

        let frame = Frame::Gk {
            cid: self.local_cid.clone(),
            e: self.epoch,
            rh,
            wraps,
        };
        Ok((group_key, frame))
    }

    /// Process an incoming `gk` frame addressed to us: locate our wrap,
    /// unwrap it with the sender's pair key, and return the recovered
    /// group key for the claimed epoch.
    pub fn load_gk(
        &mut self,
        sender: &PeerRecord,
        epoch: u64,
        rh: &str,
        wraps: &[GkWrap],
    ) -> Result<[u8; 32], EngineError> {
        // A delayed or replayed frame for an epoch we've already installed
        // (or moved past) is dropped outright; epoch never moves
        // backwards, and a repeat of the current epoch is a no-op, not a
        // re-install.
        if epoch <= self.epoch {
            return Err(EngineError::StaleEpoch { current: self.epoch, claimed: epoch });
        }

        // Membership skew (including a tampered `rh` field) is checked
        // before we bother decrypting: our own roster view must match
        // what the sender bound the wraps to.
        let expected_rh = self.current_roster_hash();
        if rh != expected_rh {
            return Err(EngineError::RosterMismatch {
                expected: expected_rh,
                got: rh.to_string(),
            });
        }

        let our_wrap = wraps
            .iter()
            .find(|w| w.cid == self.local_cid)
            .ok_or_else(|| EngineError::UnknownPeer(self.local_cid.clone()))?;

        let pair_key = sender
            .pair_key
            .as_ref()
            .ok_or_else(|| EngineError::NotKeyed(sender.cid.clone()))?;
        let nonce = nt_crypto::b64::decode_array(&our_wrap.n)?;
        let ct = nt_crypto::b64::decode(&our_wrap.ct)?;

        let aad = gk_aad(epoch, rh);
        let key = match aead::unwrap_key(pair_key, &nonce, &aad, &ct) {
            Ok(key) => key,
            // A peer that hasn't upgraded to roster-bound wraps yet used
            // the pre-binding AAD shape; fall back to it once.
            Err(_) => {
                let legacy_aad = gk_aad_legacy(epoch);
                aead::unwrap_key(pair_key, &nonce, &legacy_aad, &ct)?
            }
        };

        self.epoch = epoch;
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn roster_hash_is_order_independent() {
        let a = roster_hash(&["alice".into(), "bob".into()]);
        let b = roster_hash(&["bob".into(), "alice".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn roster_hash_matches_its_defined_formula() {
        let members = vec!["host".to_string(), "g1".to_string(), "g2".to_string()];
        let mut sorted = members.clone();
        sorted.sort();
        let json = serde_json::to_vec(&sorted).unwrap();
        let expected = nt_crypto::b64::encode(&keyed_hash(16, &json, None));
        assert_eq!(roster_hash(&members), expected);
    }

    #[test]
    fn bursty_membership_changes_coalesce_to_one_due_time() {
        let cfg = config();
        let mut mls = MlsLite::new("host", true, &cfg);
        let t0 = Instant::now();
        let due1 = mls.add_member("a", t0);
        let due2 = mls.add_member("b", t0 + Duration::from_millis(10));
        assert_eq!(due1, due2);
        assert!(!mls.take_due_rekey(t0 + Duration::from_millis(20)));
        assert!(mls.take_due_rekey(due1));
    }

    #[test]
    fn external_rekey_is_throttled() {
        let cfg = config();
        let mut mls = MlsLite::new("host", true, &cfg);
        let t0 = Instant::now();
        assert!(mls.allow_external_rekey(t0));
        assert!(!mls.allow_external_rekey(t0 + Duration::from_millis(100)));
        assert!(mls.allow_external_rekey(t0 + Duration::from_millis(900)));
    }

    #[test]
    fn mint_and_load_gk_roundtrip() {
        let cfg = config();
        let mut host = MlsLite::new("host", true, &cfg);
        let mut member = MlsLite::new("member", false, &cfg);
        let now = Instant::now();
        host.add_member("host", now);
        host.add_member("member", now);
        member.add_member("host", now);
        member.add_member("member", now);

        let pair_key = [42u8; 32];
        let mut peers = HashMap::new();
        let mut member_as_seen_by_host = PeerRecord::new("member", [1u8; 32]);
        member_as_seen_by_host.pair_key = Some(pair_key.into());
        peers.insert("member".to_string(), member_as_seen_by_host);

        let (group_key, frame) = host.mint_epoch(&peers).unwrap();
        let (epoch, rh, wraps) = match frame {
            Frame::Gk { e, rh, wraps, .. } => (e, rh, wraps),
            _ => unreachable!(),
        };

        let mut host_as_seen_by_member = PeerRecord::new("host", [2u8; 32]);
        host_as_seen_by_member.pair_key = Some(pair_key.into());

        let loaded = member.load_gk(&host_as_seen_by_member, epoch, &rh, &wraps).unwrap();
        assert_eq!(loaded, group_key);
    }

    #[test]
    fn mismatched_roster_is_detected() {
        let cfg = config();
        let mut host = MlsLite::new("host", true, &cfg);
        let mut member = MlsLite::new("member", false, &cfg);
        let now = Instant::now();
        host.add_member("host", now);
        host.add_member("member", now);
        host.add_member("third", now);
        member.add_member("host", now);
        member.add_member("member", now);

        let peers = HashMap::new();
        let (_key, frame) = host.mint_epoch(&peers).unwrap();
        let (epoch, rh, wraps) = match frame {
            Frame::Gk { e, rh, wraps, .. } => (e, rh, wraps),
            _ => unreachable!(),
        };

        let sender = PeerRecord::new("host", [2u8; 32]);
        let err = member.load_gk(&sender, epoch, &rh, &wraps).unwrap_err();
        assert!(matches!(err, EngineError::RosterMismatch { .. }));
    }
}
