//! In-memory transport for tests and single-process simulations.
//!
//! Every batch a session sends is queued as an [`Envelope`]; nothing moves
//! until the hub is driven. [`LocalHub::flush`] delivers until the queue is
//! quiet, while [`LocalHub::take_pending`] and [`LocalHub::deliver`] let a
//! test reorder, drop or duplicate traffic by hand.
//!
//! Like the relay, the hub keeps every broadcast batch and replays it to
//! sessions that connect later.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use tracing::trace;

use super::transport::{Session, Transport};

type ReceiveHandler = Rc<RefCell<Box<dyn FnMut(&[u8])>>>;

/// A batch in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Replica that sent the batch.
    pub from: u64,
    /// `None` broadcasts to every replica except the sender.
    pub to: Option<u64>,
    pub payload: Vec<u8>,
}

impl Envelope {
    fn reaches(&self, replica_id: u64) -> bool {
        self.from != replica_id && self.to.map_or(true, |to| to == replica_id)
    }
}

struct Peer {
    replica_id: u64,
    handler: Option<ReceiveHandler>,
}

#[derive(Default)]
struct HubState {
    next_key: u64,
    peers: BTreeMap<u64, Peer>,
    queue: VecDeque<Envelope>,
    history: Vec<Envelope>,
}

#[derive(Clone, Default)]
pub struct LocalHub {
    state: Rc<RefCell<HubState>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver queued envelopes, including ones queued while delivering,
    /// until none are left. Returns the number of envelopes delivered.
    pub fn flush(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.state.borrow_mut().queue.pop_front();
            let Some(envelope) = next else {
                return delivered;
            };
            self.deliver(&envelope);
            delivered += 1;
        }
    }

    /// Remove every queued envelope without delivering it.
    pub fn take_pending(&self) -> Vec<Envelope> {
        self.state.borrow_mut().queue.drain(..).collect()
    }

    /// Hand `envelope` to every connected session it addresses, bypassing
    /// the queue. Returns the number of sessions reached.
    pub fn deliver(&self, envelope: &Envelope) -> usize {
        let targets: Vec<ReceiveHandler> = self
            .state
            .borrow()
            .peers
            .values()
            .filter(|peer| envelope.reaches(peer.replica_id))
            .filter_map(|peer| peer.handler.clone())
            .collect();
        trace!(
            from = envelope.from,
            bytes = envelope.payload.len(),
            targets = targets.len(),
            "delivering envelope"
        );
        let mut reached = 0;
        for target in targets {
            if let Ok(mut handler) = target.try_borrow_mut() {
                (&mut *handler)(&envelope.payload);
                reached += 1;
            }
        }
        reached
    }

    pub fn pending_len(&self) -> usize {
        self.state.borrow().queue.len()
    }

    pub fn peer_count(&self) -> usize {
        self.state.borrow().peers.len()
    }
}

impl Transport for LocalHub {
    type Session = LocalSession;

    fn connect(&self, replica_id: u64) -> LocalSession {
        let mut state = self.state.borrow_mut();
        state.next_key += 1;
        let key = state.next_key;
        state.peers.insert(
            key,
            Peer {
                replica_id,
                handler: None,
            },
        );
        let replay: Vec<Envelope> = state
            .history
            .iter()
            .filter(|env| env.from != replica_id)
            .map(|env| Envelope {
                from: env.from,
                to: Some(replica_id),
                payload: env.payload.clone(),
            })
            .collect();
        state.queue.extend(replay);
        LocalSession {
            hub: self.clone(),
            key,
            replica_id,
        }
    }
}

/// A replica's registration with a [`LocalHub`]; dropping it disconnects.
pub struct LocalSession {
    hub: LocalHub,
    key: u64,
    replica_id: u64,
}

impl Session for LocalSession {
    fn send(&self, batch: &[u8]) {
        let envelope = Envelope {
            from: self.replica_id,
            to: None,
            payload: batch.to_vec(),
        };
        let mut state = self.hub.state.borrow_mut();
        state.history.push(envelope.clone());
        state.queue.push_back(envelope);
    }

    fn on_receive(&self, handler: Box<dyn FnMut(&[u8])>) {
        if let Some(peer) = self.hub.state.borrow_mut().peers.get_mut(&self.key) {
            peer.handler = Some(Rc::new(RefCell::new(handler)));
        }
    }
}

impl Drop for LocalSession {
    fn drop(&mut self) {
        if let Ok(mut state) = self.hub.state.try_borrow_mut() {
            state.peers.remove(&self.key);
        }
    }
}
