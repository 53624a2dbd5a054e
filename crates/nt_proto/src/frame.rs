//! Wire frames exchanged between participants.
//!
//! Every frame is a JSON object tagged by its `t` field. Field names are
//! kept short (`cid`, `s`, `e`, `n`, `ct`) because frames are sent as-is,
//! uncompressed, over the transport.

use serde::{Deserialize, Serialize};

/// One per-peer group-key wrap carried inside a [`Frame::Gk`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GkWrap {
    /// Target participant id this wrap is addressed to.
    pub cid: String,
    /// Base64 AEAD nonce used to wrap the group key for this target.
    pub n: String,
    /// Base64 AEAD ciphertext of the wrapped group key.
    pub ct: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "t")]
pub enum Frame {
    /// Handshake initiation: sender's ephemeral ECDH and KEM public keys,
    /// long-term identity key, and a signature over the canonical
    /// transcript prefix.
    #[serde(rename = "hello")]
    Hello {
        cid: String,
        x: String,
        k: String,
        i: String,
        sig: String,
    },

    /// Presence broadcast: "I am in this room under this participant id."
    #[serde(rename = "announce")]
    Announce { cid: String },

    /// Handshake completion: responder's ephemeral keys, the KEM
    /// ciphertext encapsulated to the initiator's KEM public key, and a
    /// signature over the canonical transcript.
    #[serde(rename = "ct")]
    Ct {
        cid: String,
        x: String,
        k: String,
        i: String,
        ct: String,
        sig: String,
    },

    /// Group key distribution for one epoch: the sender's view of the
    /// roster hash and one AEAD-wrapped copy of the group key per
    /// member.
    #[serde(rename = "gk")]
    Gk {
        cid: String,
        e: u64,
        rh: String,
        wraps: Vec<GkWrap>,
    },

    /// Request that the initiator mint and redistribute a fresh group
    /// key, e.g. after detecting a roster-hash mismatch.
    #[serde(rename = "gk_req")]
    GkReq { cid: String },

    /// A group-encrypted application message.
    #[serde(rename = "m")]
    M {
        cid: String,
        s: u64,
        e: u64,
        n: String,
        ct: String,
    },

    /// Cover traffic. Always ignored by the router.
    #[serde(rename = "chaff")]
    Chaff,

    /// Liveness probe. Always ignored by the router.
    #[serde(rename = "ping")]
    Ping,

    /// Graceful departure notice.
    #[serde(rename = "leave")]
    Leave { cid: String },
}

impl Frame {
    /// The sender's participant id, where the frame type carries one.
    pub fn sender_cid(&self) -> Option<&str> {
        match self {
            Frame::Hello { cid, .. }
            | Frame::Announce { cid }
            | Frame::Ct { cid, .. }
            | Frame::Gk { cid, .. }
            | Frame::GkReq { cid }
            | Frame::M { cid, .. }
            | Frame::Leave { cid } => Some(cid),
            Frame::Chaff | Frame::Ping => None,
        }
    }
}

/// Canonical additional-authenticated-data for a group message: a JSON
/// object with a fixed field order so the same bytes are produced on
/// both ends regardless of struct field declaration order.
pub fn message_aad(cid: &str, s: u64, e: u64) -> Vec<u8> {
    format!(r#"{{"t":"m","cid":"{cid}","s":{s},"e":{e}}}"#).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_aad_is_canonical() {
        let a = message_aad("abc123", 7, 2);
        let b = message_aad("abc123", 7, 2);
        assert_eq!(a, b);
        assert_eq!(a, br#"{"t":"m","cid":"abc123","s":7,"e":2}"#.to_vec());
    }

    #[test]
    fn frame_roundtrips_through_json() {
        let f = Frame::M {
            cid: "abc".into(),
            s: 1,
            e: 0,
            n: "bm9uY2U=".into(),
            ct: "Y3Q=".into(),
        };
        let json = serde_json::to_string(&f).unwrap();
        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(f, back);
    }

    #[test]
    fn sender_cid_is_none_for_chaff_and_ping() {
        assert_eq!(Frame::Chaff.sender_cid(), None);
        assert_eq!(Frame::Ping.sender_cid(), None);
    }
}
