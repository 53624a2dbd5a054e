//! Padding and wire-encoding helpers shared by the capsule and frame codecs.

use rand::RngCore;

use crate::error::ProtoError;

/// Prefix the real payload with its length (4 bytes, big-endian) and pad
/// the result up to `target_len` with random bytes, so an observer only
/// learns the padded bucket size, not the true payload length.
pub fn pad(payload: &[u8], target_len: usize) -> Result<Vec<u8>, ProtoError> {
    let total = 4 + payload.len();
    if total > target_len {
        return Err(ProtoError::MalformedFrame(format!(
            "payload of {} bytes does not fit in {} byte bucket",
            payload.len(),
            target_len
        )));
    }
    let mut out = Vec::with_capacity(target_len);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    let filler = target_len - total;
    let mut pad = vec![0u8; filler];
    rand::rngs::OsRng.fill_bytes(&mut pad);
    out.extend_from_slice(&pad);
    Ok(out)
}

/// Recover the real payload from a [`pad`]-produced buffer.
pub fn unpad(padded: &[u8]) -> Result<Vec<u8>, ProtoError> {
    if padded.len() < 4 {
        return Err(ProtoError::MalformedFrame("padded buffer too short".into()));
    }
    let len = u32::from_be_bytes(padded[0..4].try_into().unwrap()) as usize;
    if 4 + len > padded.len() {
        return Err(ProtoError::MalformedFrame("padded length prefix out of range".into()));
    }
    Ok(padded[4..4 + len].to_vec())
}

/// Pick a random bucket size within `[min_len, max_len]` that can still
/// hold `payload_len` bytes plus the 4-byte length prefix.
pub fn random_bucket(payload_len: usize, min_len: usize, max_len: usize) -> Result<usize, ProtoError> {
    let floor = (payload_len + 4).max(min_len);
    if floor > max_len {
        return Err(ProtoError::MalformedFrame(format!(
            "payload of {payload_len} bytes cannot fit within max bucket {max_len}"
        )));
    }
    if floor == max_len {
        return Ok(floor);
    }
    Ok(floor + (rand::rngs::OsRng.next_u32() as usize) % (max_len - floor + 1))
}
