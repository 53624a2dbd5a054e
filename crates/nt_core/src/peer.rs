//! What we know about one remote participant.

use std::collections::HashMap;

use zeroize::Zeroizing;

/// Per-peer state: their long-term identity, the pair key derived with
/// them, and replay-detection bookkeeping for the group channel.
///
/// `pair_key` and `sas` are `None` until the handshake with this peer
/// completes.
pub struct PeerRecord {
    pub cid: String,
    pub id_pub: [u8; 32],
    pub x_pub: Option<[u8; 32]>,
    pub pq_pub: Option<Vec<u8>>,
    pub pair_key: Option<Zeroizing<[u8; 32]>>,
    pub sas: Option<[u8; 4]>,
    /// Highest sequence number accepted from this peer, per epoch.
    last_seq: HashMap<u64, u64>,
}

impl PeerRecord {
    pub fn new(cid: impl Into<String>, id_pub: [u8; 32]) -> Self {
        Self {
            cid: cid.into(),
            id_pub,
            x_pub: None,
            pq_pub: None,
            pair_key: None,
            sas: None,
            last_seq: HashMap::new(),
        }
    }

    pub fn is_keyed(&self) -> bool {
        self.pair_key.is_some()
    }

    /// Accept `seq` for `epoch` if it is strictly greater than the last
    /// one seen for that epoch (monotone, per-sender, per-epoch). No
    /// entry for `epoch` yet means nothing has been accepted from this
    /// sender this epoch, so `seq = 0` is always a legal first message.
    pub fn check_and_advance_seq(&mut self, epoch: u64, seq: u64) -> Result<(), (u64, u64)> {
        if let Some(&last) = self.last_seq.get(&epoch) {
            if seq <= last {
                return Err((seq, last));
            }
        }
        self.last_seq.insert(epoch, seq);
        Ok(())
    }

    /// Wipe all secret material held for this peer. The peer remains
    /// addressable (its cid/identity stay known) but must re-handshake
    /// before exchanging group traffic again.
    pub fn wipe(&mut self) {
        self.pair_key = None;
        self.sas = None;
        self.x_pub = None;
        self.pq_pub = None;
        self.last_seq.clear();
    }
}
