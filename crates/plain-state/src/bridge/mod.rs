//! Replica/Transport Bridge bookkeeping.
//!
//! The bridge remembers which patches a replica has already applied, buffers
//! remote patches that arrived before the operations they build on, and
//! keeps the replica's own patches so a (re)connection can replay them.

pub mod local;
pub mod transport;

use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::crdt::Model;
use crate::crdt_patch::clock::Ts;
use crate::crdt_patch::patch::Patch;
use transport::Session;

/// What [`Document::receive`](crate::Document::receive) did with a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The batch applied, releasing `patches - 1` buffered patches with it.
    Applied { patches: usize },
    /// The batch was applied before; nothing changed.
    Duplicate,
    /// The batch references operations not seen yet and was buffered.
    Deferred,
}

/// Most received batches a replica buffers while waiting for their
/// dependencies. Past this the oldest buffered batch is dropped.
pub const MAX_DEFERRED_BATCHES: usize = 1024;

pub(crate) struct Bridge {
    session: Option<Rc<dyn Session>>,
    seen: HashSet<Ts>,
    /// Buffered batches keyed by patch ID, oldest first.
    deferred: IndexMap<Ts, Patch>,
    deferred_limit: usize,
    log: Vec<Vec<u8>>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::with_deferred_limit(MAX_DEFERRED_BATCHES)
    }
}

impl Bridge {
    pub fn with_deferred_limit(deferred_limit: usize) -> Self {
        Self {
            session: None,
            seen: HashSet::new(),
            deferred: IndexMap::new(),
            deferred_limit: deferred_limit.max(1),
            log: Vec::new(),
        }
    }

    pub fn session(&self) -> Option<Rc<dyn Session>> {
        self.session.clone()
    }

    /// Install a session, returning the local patches to replay over it.
    pub fn attach(&mut self, session: Rc<dyn Session>) -> Vec<Vec<u8>> {
        self.session = Some(session);
        self.log.clone()
    }

    pub fn detach(&mut self) -> Option<Rc<dyn Session>> {
        self.session.take()
    }

    /// Record a patch produced on this replica and return its wire form.
    pub fn record_local(&mut self, patch: &Patch) -> Vec<u8> {
        if let Some(id) = patch.get_id() {
            self.seen.insert(id);
        }
        let bytes = patch.to_bytes();
        self.log.push(bytes.clone());
        bytes
    }

    /// Whether `patch` was applied or is already waiting in the buffer.
    pub fn is_known(&self, patch: &Patch) -> bool {
        match patch.get_id() {
            Some(id) => self.seen.contains(&id) || self.deferred.contains_key(&id),
            None => false,
        }
    }

    pub fn mark_applied(&mut self, patch: &Patch) {
        if let Some(id) = patch.get_id() {
            self.seen.insert(id);
        }
    }

    /// Buffer `patch`. When the buffer is full the oldest batch is evicted
    /// and returned; it stays unseen, so a later redelivery can retry it.
    pub fn defer(&mut self, patch: Patch) -> Option<Patch> {
        let id = patch.get_id()?;
        let evicted = if self.deferred.len() >= self.deferred_limit {
            self.deferred.shift_remove_index(0).map(|(_, oldest)| oldest)
        } else {
            None
        };
        self.deferred.insert(id, patch);
        evicted
    }

    /// Remove and return the first buffered patch whose dependencies are
    /// now all present in `model`.
    pub fn take_ready(&mut self, model: &Model) -> Option<Patch> {
        let pos = self
            .deferred
            .values()
            .position(|p| model.missing_dependency(p).is_none())?;
        self.deferred.shift_remove_index(pos).map(|(_, patch)| patch)
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn log(&self) -> &[Vec<u8>] {
        &self.log
    }
}
