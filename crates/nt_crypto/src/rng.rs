//! Small RNG-backed helpers shared across the engine.

use rand::RngCore;

/// A fresh opaque participant id: 16 random bytes, hex-encoded.
pub fn gen_cid() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Fresh 32-byte key material (group keys, salts, etc.).
pub fn gen_key32() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}
