//! Pairwise hybrid ECDH + KEM handshake.
//!
//! Two rounds: `hello` (initiator's ephemeral keys) then `ct` (responder's
//! ephemeral keys plus a KEM ciphertext encapsulated to the initiator).
//! Both sides end up with the same 32-byte pair key and a 4-byte short
//! authentication string (SAS) that can be compared out of band.
//!
//! The canonical transcript that gets signed and derived from is always
//! ordered INIT-then-RESP: INIT is whichever side performs the KEM
//! encapsulation (the side answering `hello` with `ct`), RESP is whichever
//! side sent `hello` first. That's the opposite of who opened the wire
//! exchange, but it's fixed regardless of which one a side locally is, so
//! both ends land on identical transcript bytes.

use nt_crypto::ecdh::EcdhKeyPair;
use nt_crypto::hash::keyed_hash;
use nt_crypto::identity::IdentityKeyPair;
use nt_crypto::kem::{self, KemKeyPair};
use nt_crypto::{b64, CryptoError};
use nt_proto::frame::Frame;

use crate::error::EngineError;
use crate::member::LocalMember;
use crate::peer::PeerRecord;

/// Ephemeral state an initiator holds between sending `hello` and
/// receiving the matching `ct`.
pub struct PendingHandshake {
    pub peer_cid: String,
    room: String,
    ecdh: EcdhKeyPair,
    kem: KemKeyPair,
}

fn hello_transcript(cid: &str, x: &str, k: &str) -> Vec<u8> {
    format!("v=1|role=init|cid={cid}|x={x}|k={k}").into_bytes()
}

/// The canonical, room-bound handshake transcript, fixed INIT-then-RESP
/// regardless of which side locally computes it.
#[allow(clippy::too_many_arguments)]
fn handshake_transcript(
    room: &str,
    init_id: &str,
    resp_id: &str,
    init_x: &str,
    resp_x: &str,
    init_pq: &str,
    resp_pq: &str,
) -> Vec<u8> {
    format!(
        "NT-v1|handshake|{room}|init.id={init_id}|resp.id={resp_id}|init.x={init_x}|resp.x={resp_x}|init.pq={init_pq}|resp.pq={resp_pq}"
    )
    .into_bytes()
}

/// Derive the 32-byte pair key: extract a PRK from the transcript keyed by
/// a salt over the combined ECDH/KEM shared secrets, then expand once more
/// with a room-bound info label so the same ephemeral keys never yield the
/// same pair key in two different rooms.
fn derive_pair_key(dh_shared: &[u8; 32], kem_shared: &[u8; 32], transcript: &[u8], room: &str) -> [u8; 32] {
    let mut ikm = Vec::with_capacity(64);
    ikm.extend_from_slice(dh_shared);
    ikm.extend_from_slice(kem_shared);
    let salt = keyed_hash(32, &ikm, None);
    let salt_arr: [u8; 32] = salt.try_into().expect("keyed_hash(32, ..) returns 32 bytes");

    let prk = keyed_hash(32, transcript, Some(&salt_arr));
    let prk_arr: [u8; 32] = prk.try_into().expect("keyed_hash(32, ..) returns 32 bytes");

    let mut info = format!("NullTrace v1 handshake|room={room}").into_bytes();
    info.push(0x01);
    let expanded = keyed_hash(32, &info, Some(&prk_arr));
    expanded.try_into().expect("keyed_hash(32, ..) returns 32 bytes")
}

/// The short authentication string: an unkeyed digest of the transcript
/// itself, so it can be compared out of band without depending on the
/// pair key.
fn derive_sas(transcript: &[u8]) -> [u8; 4] {
    let sas = keyed_hash(4, transcript, None);
    sas.try_into().expect("keyed_hash(4, ..) returns 4 bytes")
}

/// Start a handshake with `peer_cid`: generate fresh ephemeral keys and
/// build the `hello` frame to send them.
pub fn initiate(local: &LocalMember, peer_cid: &str, room: &str) -> Result<(PendingHandshake, Frame), EngineError> {
    let ecdh = EcdhKeyPair::generate();
    let kem = KemKeyPair::generate()?;

    let x = b64::encode(&ecdh.public);
    let k = b64::encode(&kem.public);
    let sig = local.identity.sign(&hello_transcript(&local.cid, &x, &k));

    let hello = Frame::Hello {
        cid: local.cid.clone(),
        x,
        k,
        i: b64::encode(&local.identity.public),
        sig: b64::encode(&sig),
    };

    Ok((
        PendingHandshake {
            peer_cid: peer_cid.to_string(),
            room: room.to_string(),
            ecdh,
            kem,
        },
        hello,
    ))
}

/// Process an incoming `hello`, verify its signature, and answer with a
/// `ct` frame. Returns a fully keyed [`PeerRecord`] — the responder
/// finishes the handshake in a single round trip. This side performs the
/// KEM encapsulation, so it plays the transcript's INIT role; the `hello`
/// sender plays RESP.
pub fn respond_to_hello(
    local: &LocalMember,
    hello_cid: &str,
    hello_x: &str,
    hello_k: &str,
    hello_i: &str,
    hello_sig: &str,
    room: &str,
) -> Result<(PeerRecord, Frame), EngineError> {
    let peer_id_pub: [u8; 32] = b64::decode_array(hello_i)?;
    let sig = b64::decode(hello_sig)?;
    IdentityKeyPair::verify(&peer_id_pub, &hello_transcript(hello_cid, hello_x, hello_k), &sig)
        .map_err(EngineError::Crypto)?;

    let peer_x: [u8; 32] = b64::decode_array(hello_x)?;
    let peer_k = b64::decode(hello_k)?;

    let ecdh = EcdhKeyPair::generate();
    let own_kem = KemKeyPair::generate()?;

    let peer_k_arr: [u8; kem::PUBLIC_KEY_LEN] = peer_k
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("unexpected KEM public key length in hello".into()))?;
    let (ct_bytes, kem_shared) = kem::encapsulate(&peer_k_arr)?;
    let dh_shared = ecdh.diffie_hellman(&peer_x);

    let x = b64::encode(&ecdh.public);
    let k = b64::encode(&own_kem.public);
    let local_id = b64::encode(&local.identity.public);
    let transcript = handshake_transcript(room, &local_id, hello_i, &x, hello_x, &k, hello_k);
    let pair_key = derive_pair_key(&dh_shared, &kem_shared, &transcript, room);
    let sas = derive_sas(&transcript);

    let sig = local.identity.sign(&transcript);
    let ct_frame = Frame::Ct {
        cid: local.cid.clone(),
        x,
        k,
        i: local_id,
        ct: b64::encode(&ct_bytes),
        sig: b64::encode(&sig),
    };

    let mut peer = PeerRecord::new(hello_cid, peer_id_pub);
    peer.x_pub = Some(peer_x);
    peer.pq_pub = Some(peer_k);
    peer.pair_key = Some(pair_key.into());
    peer.sas = Some(sas);

    Ok((peer, ct_frame))
}

/// Process the matching `ct` for a [`PendingHandshake`], completing the
/// initiator's side of the handshake. This side sent `hello` first, so it
/// plays the transcript's RESP role; the `ct` sender (who encapsulated)
/// plays INIT.
pub fn complete(
    local: &LocalMember,
    pending: PendingHandshake,
    ct_cid: &str,
    ct_x: &str,
    ct_k: &str,
    ct_i: &str,
    ct_ct: &str,
    ct_sig: &str,
) -> Result<PeerRecord, EngineError> {
    if ct_cid != pending.peer_cid {
        return Err(EngineError::UnknownPeer(ct_cid.to_string()));
    }

    let hello_x = b64::encode(&pending.ecdh.public);
    let hello_k = b64::encode(&pending.kem.public);
    let local_id = b64::encode(&local.identity.public);
    let transcript = handshake_transcript(&pending.room, ct_i, &local_id, ct_x, &hello_x, ct_k, &hello_k);

    let peer_id_pub: [u8; 32] = b64::decode_array(ct_i)?;
    let sig = b64::decode(ct_sig)?;
    IdentityKeyPair::verify(&peer_id_pub, &transcript, &sig).map_err(EngineError::Crypto)?;

    let peer_x: [u8; 32] = b64::decode_array(ct_x)?;
    let peer_k = b64::decode(ct_k)?;
    let ct_bytes = b64::decode(ct_ct)?;

    let dh_shared = pending.ecdh.diffie_hellman(&peer_x);
    let kem_shared = pending.kem.decapsulate(&ct_bytes)?;

    let pair_key = derive_pair_key(&dh_shared, &kem_shared, &transcript, &pending.room);
    let sas = derive_sas(&transcript);

    let mut peer = PeerRecord::new(ct_cid, peer_id_pub);
    peer.x_pub = Some(peer_x);
    peer.pq_pub = Some(peer_k);
    peer.pair_key = Some(pair_key.into());
    peer.sas = Some(sas);

    Ok(peer)
}
