//! Per-peer session state machine.
//!
//! `New -> Connected -> Handshaking -> Keyed -> Wiped`. `Wiped` is
//! terminal: [`Session::wipe`] is the only teardown path and zeroizes
//! every secret the session holds, including anything still held by an
//! in-flight [`PendingHandshake`].

use crate::error::EngineError;
use crate::handshake::PendingHandshake;
use crate::peer::PeerRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Connected,
    Handshaking,
    Keyed,
    Wiped,
}

pub struct Session {
    state: SessionState,
    pub peer: Option<PeerRecord>,
    pending: Option<PendingHandshake>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::New,
            peer: None,
            pending: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mark_connected(&mut self) -> Result<(), EngineError> {
        self.require(SessionState::New)?;
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Record that we've sent a `hello` and are waiting on `ct`.
    pub fn begin_handshake(&mut self, pending: PendingHandshake) -> Result<(), EngineError> {
        self.require(SessionState::Connected)?;
        self.pending = Some(pending);
        self.state = SessionState::Handshaking;
        Ok(())
    }

    pub fn take_pending(&mut self) -> Option<PendingHandshake> {
        self.pending.take()
    }

    /// The handshake (either role) completed: install the peer's keyed
    /// record.
    pub fn mark_keyed(&mut self, peer: PeerRecord) -> Result<(), EngineError> {
        if !matches!(self.state, SessionState::Connected | SessionState::Handshaking) {
            return Err(EngineError::WrongState(format!("{:?}", self.state)));
        }
        self.peer = Some(peer);
        self.pending = None;
        self.state = SessionState::Keyed;
        Ok(())
    }

    fn require(&self, expected: SessionState) -> Result<(), EngineError> {
        if self.state != expected {
            return Err(EngineError::WrongState(format!(
                "expected {expected:?}, got {:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// Zeroize everything this session holds and mark it terminal. Any
    /// further operation on it should be treated as a programming error
    /// by the caller (sessions are not reused after wiping).
    pub fn wipe(&mut self) {
        if let Some(mut peer) = self.peer.take() {
            peer.wipe();
        }
        self.pending = None;
        self.state = SessionState::Wiped;
    }

    pub fn is_wiped(&self) -> bool {
        self.state == SessionState::Wiped
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
