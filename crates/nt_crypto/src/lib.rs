//! nt_crypto — cryptographic primitives façade for the group-chat engine.
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Public APIs return fixed-size byte arrays, not opaque library types,
//!   so the rest of the engine never has to reach into a crypto crate's
//!   internals.
//!
//! # Module layout
//! - `identity` — long-term Ed25519 identity keypair
//! - `ecdh`     — ephemeral X25519 keypair
//! - `kem`      — ephemeral ML-KEM-512 keypair (post-quantum)
//! - `aead`     — XChaCha20-Poly1305 seal/open, explicit nonce
//! - `hash`     — BLAKE3 hash / keyed hash (extendable output)
//! - `b64`      — standard, padded base64
//! - `rng`      — CSPRNG-backed id/key generation
//! - `error`    — unified error type

pub mod aead;
pub mod b64;
pub mod ecdh;
pub mod error;
pub mod hash;
pub mod identity;
pub mod kem;
pub mod rng;

pub use error::CryptoError;
