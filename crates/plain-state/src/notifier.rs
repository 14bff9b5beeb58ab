//! Change Notifier: listener registry plus the deferred delivery queue.
//!
//! Statements and remote batches only enqueue; handlers run when the owning
//! [`Document`](crate::Document) drains the queue with `flush_events`. A
//! queued entry carries the node and origin, and the snapshot is taken when
//! the entry is delivered.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use serde_json::Value;

use crate::crdt_patch::clock::Ts;

/// Handle returned by `on_change`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A statement executed on this replica.
    Local,
    /// A batch received from another replica.
    Remote,
}

/// Delivered to a node's listeners once per statement or remote batch that
/// changed the node's direct children.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub node: Ts,
    pub origin: ChangeOrigin,
    /// The node's materialized value at delivery time.
    pub snapshot: Value,
}

pub(crate) type Handler = Rc<RefCell<dyn FnMut(&ChangeEvent)>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingEvent {
    pub node: Ts,
    pub origin: ChangeOrigin,
}

#[derive(Default)]
pub(crate) struct Notifier {
    next_id: u64,
    listeners: HashMap<Ts, BTreeMap<ListenerId, Handler>>,
    queue: VecDeque<PendingEvent>,
}

impl Notifier {
    pub fn subscribe(&mut self, node: Ts, handler: Handler) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.entry(node).or_default().insert(id, handler);
        id
    }

    pub fn unsubscribe(&mut self, node: Ts, id: ListenerId) -> bool {
        let Some(handlers) = self.listeners.get_mut(&node) else {
            return false;
        };
        let removed = handlers.remove(&id).is_some();
        if handlers.is_empty() {
            self.listeners.remove(&node);
        }
        removed
    }

    #[cfg(test)]
    pub fn listener_count(&self, node: Ts) -> usize {
        self.listeners.get(&node).map_or(0, BTreeMap::len)
    }

    /// Queue one event per node, in order.
    pub fn enqueue<I: IntoIterator<Item = Ts>>(&mut self, nodes: I, origin: ChangeOrigin) {
        self.queue
            .extend(nodes.into_iter().map(|node| PendingEvent { node, origin }));
    }

    /// Next queued event with the handlers registered for its node right now.
    pub fn pop(&mut self) -> Option<(PendingEvent, Vec<Handler>)> {
        let event = self.queue.pop_front()?;
        let handlers = self
            .listeners
            .get(&event.node)
            .map(|h| h.values().cloned().collect())
            .unwrap_or_default();
        Some((event, handlers))
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
