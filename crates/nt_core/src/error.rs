use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("peer {0} is not yet keyed for the current epoch")]
    NotKeyed(String),

    #[error("replayed or out-of-order message from {cid}: seq {seq} <= last seen {last_seen}")]
    ReplayDetected { cid: String, seq: u64, last_seen: u64 },

    #[error("roster hash mismatch: expected {expected}, got {got}")]
    RosterMismatch { expected: String, got: String },

    #[error("session already wiped")]
    SessionWiped,

    #[error("session in wrong state for this operation: {0}")]
    WrongState(String),

    #[error("stale epoch: have {current}, message claims {claimed}")]
    StaleEpoch { current: u64, claimed: u64 },

    #[error(transparent)]
    Crypto(#[from] nt_crypto::CryptoError),

    #[error(transparent)]
    Proto(#[from] nt_proto::ProtoError),
}
