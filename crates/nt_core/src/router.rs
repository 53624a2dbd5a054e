//! Dispatches incoming wire frames to the handshake, group-key and
//! group-message machinery, and decides what (if anything) to send in
//! response.

use std::collections::HashMap;
use std::time::Instant;

use nt_proto::frame::Frame;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::group::GroupCore;
use crate::handshake;
use crate::member::LocalMember;
use crate::mls::MlsLite;
use crate::session::Session;
use crate::timers::backoff_delay;

/// Something the router wants the caller to do after processing a
/// frame: deliver plaintext to the application, send a frame back out,
/// or nothing.
pub enum RouterEvent {
    SendFrame(Frame),
    Delivered { from: String, plaintext: Vec<u8> },
    MemberJoined { cid: String, rekey_due: Instant },
    MemberLeft { cid: String, rekey_due: Instant },
}

#[derive(Default)]
struct GkRetryState {
    attempts: u32,
}

type BufferedGk = (u64, String, Vec<nt_proto::frame::GkWrap>);

pub struct ProtocolRouter {
    local: LocalMember,
    sessions: HashMap<String, Session>,
    group: GroupCore,
    mls: MlsLite,
    config: EngineConfig,
    gk_retry: HashMap<String, GkRetryState>,
    /// `gk` frames that arrived before the sender's handshake finished
    /// on our side (S2: late GK). Replayed once that peer is keyed.
    pending_gk: HashMap<String, BufferedGk>,
}

impl ProtocolRouter {
    pub fn new(local: LocalMember, room: impl Into<String>, is_initiator: bool, config: EngineConfig) -> Self {
        let room = room.into();
        let group = GroupCore::new(room, local.cid.clone());
        let mls = MlsLite::new(local.cid.clone(), is_initiator, &config);
        Self {
            local,
            sessions: HashMap::new(),
            group,
            mls,
            config,
            gk_retry: HashMap::new(),
            pending_gk: HashMap::new(),
        }
    }

    pub fn local_cid(&self) -> &str {
        &self.local.cid
    }

    pub fn group(&self) -> &GroupCore {
        &self.group
    }

    /// Mint a fresh invitation capsule for this room, signed under the
    /// local identity key and valid for [`EngineConfig::capsule_ttl_secs`].
    /// Meant for the host; a guest can call it too (nothing stops them),
    /// but only the host's capsule is meaningful since only the host
    /// admits members.
    pub fn create_invitation(&self) -> Result<String, EngineError> {
        let (ecdh, kem) = self.local.fresh_ephemeral()?;
        let now = chrono::Utc::now().timestamp();
        let encoded = nt_proto::capsule::create(
            self.group.room(),
            &self.local.cid,
            &ecdh.public,
            &kem.public,
            &self.local.identity,
            now,
        )?;
        Ok(encoded)
    }

    /// Parse an invitation capsule and start a handshake with the host it
    /// names. Rejects capsules for a different room outright.
    pub fn accept_invitation(&mut self, encoded: &str) -> Result<Frame, EngineError> {
        let now = chrono::Utc::now().timestamp();
        let invitation = nt_proto::capsule::parse(encoded, now)?;
        if invitation.room != self.group.room() {
            return Err(EngineError::WrongState(format!(
                "invitation is for room {}, this session is in room {}",
                invitation.room,
                self.group.room()
            )));
        }
        tracing::info!(target: "nt_core", event = "invitation_accepted", host_cid = %invitation.cid);
        self.start_handshake(&invitation.cid)
    }

    /// Encrypt `plaintext` for the group and produce the frame to send.
    /// Returns `None` if no group key is active yet; the message is
    /// buffered internally and will be flushed (and a send surfaced via
    /// a future [`RouterEvent::SendFrame`]) once an epoch installs.
    pub fn send_message(&mut self, plaintext: &[u8]) -> Result<Option<Frame>, EngineError> {
        let Some((seq, ciphertext)) = self.group.encrypt(plaintext)? else {
            return Ok(None);
        };
        let epoch = self.group.epoch();
        Ok(Some(Frame::M {
            cid: self.local.cid.clone(),
            s: seq,
            e: epoch,
            n: nt_crypto::b64::encode(&self.derive_sent_nonce(seq, epoch)),
            ct: nt_crypto::b64::encode(&ciphertext),
        }))
    }

    /// Begin a handshake with `peer_cid`, e.g. after parsing an invitation
    /// capsule for them.
    pub fn start_handshake(&mut self, peer_cid: &str) -> Result<Frame, EngineError> {
        let (pending, hello) = handshake::initiate(&self.local, peer_cid, self.group.room())?;
        let mut session = Session::new();
        session.mark_connected()?;
        session.begin_handshake(pending)?;
        self.sessions.insert(peer_cid.to_string(), session);
        Ok(hello)
    }

    pub fn dispatch(&mut self, frame: Frame, now: Instant) -> Result<Vec<RouterEvent>, EngineError> {
        match frame {
            Frame::Hello { cid, x, k, i, sig } => self.on_hello(cid, x, k, i, sig),
            Frame::Ct { cid, x, k, i, ct, sig } => self.on_ct(cid, x, k, i, ct, sig),
            Frame::Announce { cid } => Ok(vec![self.on_announce(cid, now)]),
            Frame::Leave { cid } => Ok(vec![self.on_leave(cid, now)]),
            Frame::Gk { cid, e, rh, wraps } => self.on_gk(cid, e, rh, wraps),
            Frame::GkReq { cid } => self.on_gk_req(cid, now),
            Frame::M { cid, s, e, n, ct } => self.on_message(cid, s, e, n, ct),
            Frame::Chaff | Frame::Ping => Ok(vec![]),
        }
    }

    fn on_hello(&mut self, cid: String, x: String, k: String, i: String, sig: String) -> Result<Vec<RouterEvent>, EngineError> {
        let (peer, ct_frame) = handshake::respond_to_hello(&self.local, &cid, &x, &k, &i, &sig, self.group.room())?;
        let mut session = Session::new();
        session.mark_connected()?;
        session.mark_keyed(peer)?;
        self.sessions.insert(cid.clone(), session);
        tracing::info!(target: "nt_core", event = "handshake_responded", peer_cid = %cid);
        Ok(vec![RouterEvent::SendFrame(ct_frame)])
    }

    fn on_ct(&mut self, cid: String, x: String, k: String, i: String, ct: String, sig: String) -> Result<Vec<RouterEvent>, EngineError> {
        let session = self
            .sessions
            .get_mut(&cid)
            .ok_or_else(|| EngineError::UnknownPeer(cid.clone()))?;
        let pending = session
            .take_pending()
            .ok_or_else(|| EngineError::WrongState(format!("{:?}", session.state())))?;
        let peer = handshake::complete(&self.local, pending, &cid, &x, &k, &i, &ct, &sig)?;
        session.mark_keyed(peer)?;
        self.gk_retry.remove(&cid);
        tracing::info!(target: "nt_core", event = "handshake_completed", peer_cid = %cid);

        // S2: a `gk` that arrived before this `ct` was buffered; replay
        // it now that we're keyed, instead of waiting on a retry.
        if let Some((e, rh, wraps)) = self.pending_gk.remove(&cid) {
            tracing::debug!(target: "nt_core", event = "late_gk_replayed", peer_cid = %cid, epoch = e);
            return self.apply_gk(cid, e, rh, wraps);
        }
        Ok(vec![])
    }

    fn on_announce(&mut self, cid: String, now: Instant) -> RouterEvent {
        let rekey_due = self.mls.add_member(cid.clone(), now);
        RouterEvent::MemberJoined { cid, rekey_due }
    }

    fn on_leave(&mut self, cid: String, now: Instant) -> RouterEvent {
        self.sessions.remove(&cid);
        self.gk_retry.remove(&cid);
        let rekey_due = self.mls.remove_member(&cid, now);
        RouterEvent::MemberLeft { cid, rekey_due }
    }

    fn on_gk(&mut self, cid: String, e: u64, rh: String, wraps: Vec<nt_proto::frame::GkWrap>) -> Result<Vec<RouterEvent>, EngineError> {
        let sender_is_keyed = self
            .sessions
            .get(&cid)
            .and_then(|s| s.peer.as_ref())
            .is_some_and(|p| p.is_keyed());
        if !sender_is_keyed {
            tracing::debug!(target: "nt_core", event = "gk_buffered_not_keyed", peer_cid = %cid, epoch = e);
            self.pending_gk.insert(cid, (e, rh, wraps));
            return Ok(vec![]);
        }
        self.apply_gk(cid, e, rh, wraps)
    }

    fn apply_gk(&mut self, cid: String, e: u64, rh: String, wraps: Vec<nt_proto::frame::GkWrap>) -> Result<Vec<RouterEvent>, EngineError> {
        let sender = self
            .sessions
            .get(&cid)
            .and_then(|s| s.peer.as_ref())
            .ok_or_else(|| EngineError::UnknownPeer(cid.clone()))?;
        let group_key = match self.mls.load_gk(sender, e, &rh, &wraps) {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(target: "nt_core", event = "gk_rejected", peer_cid = %cid, epoch = e, error = %err);
                return Err(err);
            }
        };
        self.gk_retry.remove(&cid);
        tracing::info!(target: "nt_core", event = "epoch_installed", epoch = e);

        let flushed = self.group.install_epoch(e, group_key)?;
        let events = flushed
            .into_iter()
            .map(|(seq, ciphertext)| {
                RouterEvent::SendFrame(Frame::M {
                    cid: self.local.cid.clone(),
                    s: seq,
                    e,
                    n: nt_crypto::b64::encode(&self.derive_sent_nonce(seq, e)),
                    ct: nt_crypto::b64::encode(&ciphertext),
                })
            })
            .collect();
        Ok(events)
    }

    fn derive_sent_nonce(&self, seq: u64, epoch: u64) -> [u8; 24] {
        let out = nt_crypto::hash::keyed_hash(24, format!("NT-v1|nonce|{}|{}|{}", self.local.cid, seq, epoch).as_bytes(), None);
        out.try_into().expect("keyed_hash(24, ..) returns 24 bytes")
    }

    fn on_gk_req(&mut self, cid: String, now: Instant) -> Result<Vec<RouterEvent>, EngineError> {
        let _ = cid;
        // Only the initiator mints group keys; a non-initiator receiving
        // a stray `gk_req` has nothing useful to do with it.
        if !self.mls.is_initiator() || !self.mls.allow_external_rekey(now) {
            return Ok(vec![]);
        }
        self.mint_and_distribute()
    }

    fn on_message(&mut self, cid: String, s: u64, e: u64, n: String, ct: String) -> Result<Vec<RouterEvent>, EngineError> {
        let _ = n; // nonce travels on the wire for transparency/debugging but is re-derived, not trusted, on receipt.
        let ciphertext = nt_crypto::b64::decode(&ct)?;

        let session = self
            .sessions
            .get_mut(&cid)
            .ok_or_else(|| EngineError::UnknownPeer(cid.clone()))?;
        let peer = session
            .peer
            .as_mut()
            .ok_or_else(|| EngineError::NotKeyed(cid.clone()))?;
        peer.check_and_advance_seq(e, s).map_err(|(seq, last_seen)| {
            tracing::warn!(target: "nt_core", event = "replay_detected", peer_cid = %cid, seq, last_seen);
            EngineError::ReplayDetected { cid: cid.clone(), seq, last_seen }
        })?;

        let plaintext = self.group.decrypt(&cid, s, e, &ciphertext)?;
        tracing::debug!(target: "nt_core", event = "message_delivered", peer_cid = %cid, seq = s, epoch = e);
        Ok(vec![RouterEvent::Delivered { from: cid, plaintext }])
    }

    /// Run the rekey this router's [`MlsLite`] debounce timer armed.
    /// Only meaningful for the initiator.
    pub fn fire_debounced_rekey(&mut self, now: Instant) -> Result<Vec<RouterEvent>, EngineError> {
        if !self.mls.is_initiator() || !self.mls.take_due_rekey(now) {
            return Ok(vec![]);
        }
        self.mint_and_distribute()
    }

    fn mint_and_distribute(&mut self) -> Result<Vec<RouterEvent>, EngineError> {
        let peers = self.keyed_peers();
        let (group_key, frame) = self.mls.mint_epoch(&peers)?;
        tracing::info!(target: "nt_core", event = "epoch_minted", epoch = self.mls.epoch(), members = peers.len() + 1);
        let flushed = self.group.install_epoch(self.mls.epoch(), group_key)?;

        let mut events = vec![RouterEvent::SendFrame(frame)];
        events.extend(flushed.into_iter().map(|(seq, ciphertext)| {
            RouterEvent::SendFrame(Frame::M {
                cid: self.local.cid.clone(),
                s: seq,
                e: self.mls.epoch(),
                n: nt_crypto::b64::encode(&self.derive_sent_nonce(seq, self.mls.epoch())),
                ct: nt_crypto::b64::encode(&ciphertext),
            })
        }));
        Ok(events)
    }

    /// Called when a responder's handshake completed but no `gk` has
    /// arrived yet. Returns the next `gk_req` to send and its delay, or
    /// `None` once the retry budget (6 attempts) is exhausted.
    pub fn next_gk_retry(&mut self, cid: &str) -> Option<(Frame, std::time::Duration)> {
        let state = self.gk_retry.entry(cid.to_string()).or_default();
        if state.attempts >= self.config.gk_retry_max_attempts {
            return None;
        }
        let delay = backoff_delay(self.config.gk_retry_initial, state.attempts);
        state.attempts += 1;
        Some((Frame::GkReq { cid: self.local.cid.clone() }, delay))
    }

    /// Zeroize every secret this router holds — every live session's pair
    /// key, the current group key, and the local identity — and consume
    /// it. The sole teardown path; there is no way to resume a wiped
    /// router.
    pub fn wipe(mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.wipe();
        }
        self.group.wipe();
        self.local.wipe();
    }

    fn keyed_peers(&self) -> HashMap<String, crate::peer::PeerRecord> {
        // MlsLite only needs read access to wrap per peer; we hand it a
        // throwaway copy-free view by reference would require a borrow
        // split, so callers that mint/load epochs do so through this
        // snapshot of cid -> pair key material.
        let mut out = HashMap::new();
        for (cid, session) in &self.sessions {
            if let Some(peer) = &session.peer {
                if peer.is_keyed() {
                    let mut record = crate::peer::PeerRecord::new(cid.clone(), peer.id_pub);
                    record.pair_key = peer.pair_key.clone();
                    out.insert(cid.clone(), record);
                }
            }
        }
        out
    }
}
