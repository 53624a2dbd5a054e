//! nt_proto — wire frames and invitation capsules for the group-chat
//! engine.
//!
//! This crate knows nothing about sessions, keys in use, or replay
//! state; it only knows how to serialize, pad, and sign the bytes that
//! cross the wire. [`nt_core`](../nt_core) owns the state machines that
//! decide which frame to send when.
//!
//! # Module layout
//! - `frame`   — the tagged `Frame` enum and canonical message AAD
//! - `capsule` — signed, TTL-bound, padded invitations
//! - `codec`   — padding/unpadding primitives shared by the above
//! - `error`   — unified error type

pub mod capsule;
pub mod codec;
pub mod error;
pub mod frame;

pub use error::ProtoError;
pub use frame::Frame;
