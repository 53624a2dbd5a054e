//! nt_core — session, group-key and routing state machines for the
//! group-chat engine.
//!
//! This crate owns every piece of mutable protocol state: pairwise
//! sessions, the current group epoch, and the dispatch table that turns
//! incoming [`nt_proto::Frame`]s into outgoing ones. It does not own a
//! transport; callers feed it frames and drive its timers.
//!
//! # Module layout
//! - `member`    — local participant identity
//! - `peer`      — per-peer state (pair key, replay counters)
//! - `handshake` — pairwise hybrid ECDH + KEM handshake
//! - `group`     — group AEAD message channel
//! - `mls`       — group membership and key-epoch lifecycle
//! - `session`   — per-peer session state machine
//! - `router`    — frame dispatch and GK retry backoff
//! - `timers`    — debounce/backoff helpers
//! - `config`    — environment-driven tunables
//! - `error`     — unified error type

pub mod config;
pub mod error;
pub mod group;
pub mod handshake;
pub mod member;
pub mod mls;
pub mod peer;
pub mod router;
pub mod session;
pub mod timers;

pub use error::EngineError;
pub use router::{ProtocolRouter, RouterEvent};
