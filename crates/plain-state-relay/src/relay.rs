//! Fan-out of patch frames between connected peers.
//!
//! Every frame a peer publishes is appended to a bounded history and
//! broadcast to every other peer. A peer that joins first receives the
//! history, so replicas that (re)connect late catch up. Replicas dedupe
//! patches themselves, so replaying a frame they already have is harmless.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use plain_state::crdt_patch::Patch;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace, warn};

pub type PeerId = u64;

#[derive(Debug, Clone)]
pub struct Frame {
    pub from: PeerId,
    pub payload: Bytes,
}

/// Statistics reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RelayStats {
    pub peers: usize,
    pub history: usize,
}

pub struct Relay {
    tx: broadcast::Sender<Frame>,
    history: RwLock<VecDeque<Frame>>,
    history_limit: usize,
    next_peer: AtomicU64,
    peers: AtomicUsize,
}

impl Relay {
    pub fn new(history_limit: usize, channel_capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        Arc::new(Self {
            tx,
            history: RwLock::new(VecDeque::new()),
            history_limit,
            next_peer: AtomicU64::new(1),
            peers: AtomicUsize::new(0),
        })
    }

    /// Register a peer. The returned backlog holds every retained frame;
    /// everything published afterwards arrives through [`Peer::recv`].
    pub async fn join(self: &Arc<Self>) -> (Peer, Vec<Bytes>) {
        // Subscribing under the history lock means no frame is both in the
        // backlog and the channel, and none is in neither.
        let history = self.history.read().await;
        let rx = self.tx.subscribe();
        let backlog = history.iter().map(|f| f.payload.clone()).collect();
        drop(history);

        let id = self.next_peer.fetch_add(1, Ordering::Relaxed);
        let peers = self.peers.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(peer = id, peers, "peer joined");
        let peer = Peer {
            id,
            rx,
            relay: Arc::clone(self),
        };
        (peer, backlog)
    }

    /// Retain and broadcast a frame. Frames that are not patches are
    /// dropped; returns whether the frame was relayed.
    pub async fn publish(&self, from: PeerId, payload: Bytes) -> bool {
        let patch = match Patch::from_bytes(&payload) {
            Ok(patch) => patch,
            Err(err) => {
                warn!(peer = from, error = %err, "dropping frame that is not a patch");
                return false;
            }
        };
        trace!(peer = from, patch = ?patch.get_id(), bytes = payload.len(), "relaying patch");

        let frame = Frame { from, payload };
        let mut history = self.history.write().await;
        if self.history_limit > 0 {
            if history.len() == self.history_limit {
                history.pop_front();
            }
            history.push_back(frame.clone());
        }
        // No receivers is not an error: the frame is still in the history.
        let _ = self.tx.send(frame);
        true
    }

    pub async fn stats(&self) -> RelayStats {
        RelayStats {
            peers: self.peers.load(Ordering::Relaxed),
            history: self.history.read().await.len(),
        }
    }
}

/// A connected peer's subscription; dropping it leaves the relay.
pub struct Peer {
    pub id: PeerId,
    rx: broadcast::Receiver<Frame>,
    relay: Arc<Relay>,
}

impl Peer {
    /// Next frame published by another peer, or `None` once the relay is
    /// gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            match self.rx.recv().await {
                Ok(frame) if frame.from == self.id => continue,
                Ok(frame) => return Some(frame.payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(peer = self.id, skipped, "peer lagged behind, frames lost");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        let peers = self.relay.peers.fetch_sub(1, Ordering::Relaxed) - 1;
        debug!(peer = self.id, peers, "peer left");
    }
}
