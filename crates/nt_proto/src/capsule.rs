//! Signed, TTL-bound, padded invitation capsules.
//!
//! A capsule lets a room host hand a prospective member everything needed
//! to start the handshake — without that blob leaking which room it is
//! for to casual inspection, and without it being replayable forever.

use serde::{Deserialize, Serialize};

use nt_crypto::b64;
use nt_crypto::identity::IdentityKeyPair;

use crate::codec::{pad, random_bucket, unpad};
use crate::error::ProtoError;

pub const VERSION: &str = "NT-C1";
pub const ALG: &str = "Ed25519|X25519+ML-KEM-512";

pub const TTL_SECS: i64 = 120;
pub const MIN_ENCODED_LEN: usize = 512;
pub const MAX_ENCODED_LEN: usize = 1024;
pub const MAX_DECODED_LEN: usize = 4096;

/// The fields a capsule carries in the clear (everything needed to start
/// a handshake with the issuing participant).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct CapsuleBody {
    v: String,
    alg: String,
    room: String,
    cid: String,
    x: String,
    k: String,
    iat: i64,
    exp: i64,
}

/// A capsule after signature and TTL verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub room: String,
    pub cid: String,
    pub x_pub: [u8; 32],
    pub pq_pub: Vec<u8>,
    pub id_pub: [u8; 32],
    pub ver: String,
    pub alg: String,
}

/// Build the canonical transcript signed over by a capsule. Field order
/// is fixed so issuer and verifier always compute the same bytes
/// regardless of how the body struct happens to be declared.
fn canonical_transcript(body: &CapsuleBody) -> Vec<u8> {
    format!(
        "v={}|alg={}|room={}|cid={}|x={}|k={}|iat={}|exp={}",
        body.v, body.alg, body.room, body.cid, body.x, body.k, body.iat, body.exp
    )
    .into_bytes()
}

/// Mint a capsule for `room`, valid for [`TTL_SECS`] seconds from `now`.
pub fn create(
    room: &str,
    cid: &str,
    x_pub: &[u8; 32],
    pq_pub: &[u8],
    identity: &IdentityKeyPair,
    now: i64,
) -> Result<String, ProtoError> {
    let body = CapsuleBody {
        v: VERSION.to_string(),
        alg: ALG.to_string(),
        room: room.to_string(),
        cid: cid.to_string(),
        x: b64::encode(x_pub),
        k: b64::encode(pq_pub),
        iat: now,
        exp: now + TTL_SECS,
    };
    let sig = identity.sign(&canonical_transcript(&body));

    let envelope = serde_json::json!({
        "body": body,
        "i": b64::encode(&identity.public),
        "sig": b64::encode(&sig),
    });
    let plain = serde_json::to_vec(&envelope)?;

    // The bucket targets [`MIN_ENCODED_LEN`, `MAX_ENCODED_LEN`] on the
    // base64-encoded wire output, not the pre-encode byte count: base64
    // expands by 4/3, so pick the pre-encode bucket from the corresponding
    // decoded-byte range instead of applying the encoded range directly.
    let decoded_min = (MIN_ENCODED_LEN / 4) * 3;
    let decoded_max = (MAX_ENCODED_LEN / 4) * 3;
    let bucket = random_bucket(plain.len(), decoded_min, decoded_max)?;
    let padded = pad(&plain, bucket)?;
    Ok(b64::encode(&padded))
}

/// Parse and verify a capsule produced by [`create`]: checks its
/// signature against the embedded identity key and its expiry against
/// `now`. Caller is responsible for deciding whether the embedded
/// identity key is one they trust.
pub fn parse(encoded: &str, now: i64) -> Result<Invitation, ProtoError> {
    let padded = b64::decode(encoded)?;
    if padded.len() > MAX_DECODED_LEN {
        return Err(ProtoError::CapsuleTooLarge(padded.len()));
    }
    let plain = unpad(&padded)?;

    #[derive(Deserialize)]
    struct Envelope {
        body: CapsuleBody,
        i: String,
        sig: String,
    }
    let envelope: Envelope = serde_json::from_slice(&plain)?;

    if envelope.body.v != VERSION {
        return Err(ProtoError::CapsuleVersionUnsupported(envelope.body.v));
    }
    // Accepted iff iat <= now <= exp and exp - iat <= 2*TTL: reject a
    // capsule from the future, one already past its expiry, and one whose
    // claimed lifetime stretches implausibly far beyond a normal TTL
    // (which would let a compromised clock extend its usable window).
    if envelope.body.iat > now {
        return Err(ProtoError::CapsuleExpired);
    }
    if envelope.body.exp < now {
        return Err(ProtoError::CapsuleExpired);
    }
    if envelope.body.exp - envelope.body.iat > 2 * TTL_SECS {
        return Err(ProtoError::CapsuleExpired);
    }

    let id_pub: [u8; 32] = b64::decode_array(&envelope.i)?;
    let sig = b64::decode(&envelope.sig)?;
    IdentityKeyPair::verify(&id_pub, &canonical_transcript(&envelope.body), &sig)
        .map_err(|_| ProtoError::CapsuleSignatureInvalid)?;

    let x_pub: [u8; 32] = b64::decode_array(&envelope.body.x)?;
    let pq_pub = b64::decode(&envelope.body.k)?;

    Ok(Invitation {
        room: envelope.body.room,
        cid: envelope.body.cid,
        x_pub,
        pq_pub,
        id_pub,
        ver: envelope.body.v,
        alg: envelope.body.alg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_identity() -> IdentityKeyPair {
        IdentityKeyPair::generate()
    }

    #[test]
    fn create_parse_roundtrip() {
        let identity = sample_identity();
        let x_pub = [7u8; 32];
        let pq_pub = vec![9u8; 800];
        let now = 1_700_000_000;

        let encoded = create("room-1", "cid-1", &x_pub, &pq_pub, &identity, now).unwrap();
        assert!((MIN_ENCODED_LEN..=MAX_ENCODED_LEN).contains(&encoded.len()));

        let inv = parse(&encoded, now + 5).unwrap();
        assert_eq!(inv.room, "room-1");
        assert_eq!(inv.cid, "cid-1");
        assert_eq!(inv.x_pub, x_pub);
        assert_eq!(inv.pq_pub, pq_pub);
        assert_eq!(inv.id_pub, identity.public);
    }

    #[test]
    fn expired_capsule_is_rejected() {
        let identity = sample_identity();
        let now = 1_700_000_000;
        let encoded = create("room-1", "cid-1", &[1u8; 32], &[2u8; 800], &identity, now).unwrap();
        let err = parse(&encoded, now + TTL_SECS + 1).unwrap_err();
        assert!(matches!(err, ProtoError::CapsuleExpired));
    }

    #[test]
    fn future_dated_capsule_is_rejected() {
        let identity = sample_identity();
        let now = 1_700_000_000;
        let encoded = create("room-1", "cid-1", &[1u8; 32], &[2u8; 800], &identity, now).unwrap();
        let err = parse(&encoded, now - 1).unwrap_err();
        assert!(matches!(err, ProtoError::CapsuleExpired));
    }

    #[test]
    fn overlong_validity_window_is_rejected() {
        // A capsule whose body claims a lifetime beyond 2*TTL (e.g. a
        // forged `exp` on an otherwise-honest `iat`) must be rejected
        // even though `iat <= now <= exp` holds.
        let identity = sample_identity();
        let now = 1_700_000_000;
        let body = CapsuleBody {
            v: VERSION.to_string(),
            alg: ALG.to_string(),
            room: "room-1".to_string(),
            cid: "cid-1".to_string(),
            x: b64::encode(&[1u8; 32]),
            k: b64::encode(&[2u8; 800]),
            iat: now,
            exp: now + 2 * TTL_SECS + 1,
        };
        let sig = identity.sign(&canonical_transcript(&body));
        let envelope = serde_json::json!({
            "body": body,
            "i": b64::encode(&identity.public),
            "sig": b64::encode(&sig),
        });
        let plain = serde_json::to_vec(&envelope).unwrap();
        let padded = pad(&plain, (MAX_ENCODED_LEN / 4) * 3).unwrap();
        let encoded = b64::encode(&padded);

        let err = parse(&encoded, now + 1).unwrap_err();
        assert!(matches!(err, ProtoError::CapsuleExpired));
    }

    #[test]
    fn tampered_body_fails_signature_check() {
        let identity = sample_identity();
        let now = 1_700_000_000;
        let encoded = create("room-1", "cid-1", &[1u8; 32], &[2u8; 800], &identity, now).unwrap();

        let mut padded = nt_crypto::b64::decode(&encoded).unwrap();
        // Byte 10 falls inside the JSON payload (which starts right after
        // the 4-byte length prefix), not the random filler tail.
        padded[10] ^= 0xff;
        let tampered = nt_crypto::b64::encode(&padded);

        // With overwhelming probability this corrupts the JSON/signature
        // rather than producing another well-formed capsule.
        let result = parse(&tampered, now + 1);
        assert!(result.is_err());
    }

    #[test]
    fn oversized_decoded_capsule_is_rejected() {
        let huge = vec![0u8; MAX_DECODED_LEN + 1];
        let encoded = b64::encode(&huge);
        let err = parse(&encoded, 0).unwrap_err();
        assert!(matches!(err, ProtoError::CapsuleTooLarge(_)));
    }
}
