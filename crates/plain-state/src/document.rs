//! [`Document`]: one replica of a shared document.
//!
//! A `Document` is a cheap handle (`Rc`) to the replica state: the node
//! tree, the change notifier and the bridge. Proxies hold a clone of the
//! handle plus a node ID. Everything runs on one thread; a statement applies
//! synchronously and its change events wait in the queue until
//! [`Document::flush_events`] drains it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use serde_json::Value;
use tracing::{debug, warn};

use crate::bridge::transport::{Session, Transport};
use crate::bridge::{Bridge, ReceiveOutcome};
use crate::crdt::{random_sid, Model};
use crate::crdt_patch::clock::Ts;
use crate::crdt_patch::constants::ORIGIN;
use crate::crdt_patch::patch::Patch;
use crate::error::DocError;
use crate::notifier::{ChangeEvent, ChangeOrigin, ListenerId, Notifier};
use crate::proxy::MapProxy;
use crate::translator::Translator;

pub(crate) struct Replica {
    pub model: Model,
    notifier: Notifier,
    bridge: Bridge,
}

#[derive(Clone)]
pub struct Document {
    inner: Rc<RefCell<Replica>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_borrow() {
            Ok(replica) => f
                .debug_struct("Document")
                .field("sid", &replica.model.sid())
                .field("view", &replica.model.view())
                .finish(),
            Err(_) => f.debug_struct("Document").finish_non_exhaustive(),
        }
    }
}

impl Document {
    /// A replica with a random session ID.
    pub fn new() -> Self {
        Self::with_sid(random_sid())
    }

    /// A replica with a fixed session ID. IDs must be unique among the
    /// replicas of a document and must not be `0`.
    pub fn with_sid(sid: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Replica {
                model: Model::new(sid),
                notifier: Notifier::default(),
                bridge: Bridge::default(),
            })),
        }
    }

    pub fn sid(&self) -> u64 {
        self.inner.borrow().model.sid()
    }

    /// Proxy over the root map.
    pub fn root(&self) -> MapProxy {
        MapProxy::new(self.clone(), ORIGIN)
    }

    /// Materialized value of the whole document.
    pub fn view(&self) -> Value {
        self.inner.borrow().model.view()
    }

    /// Whether two handles point at the same replica.
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Transport ─────────────────────────────────────────────────────────

    /// Open a session on `transport` and replay every patch made locally so
    /// far over it. Replaces any previous session.
    pub fn connect<T: Transport>(&self, transport: &T) {
        let session = transport.connect(self.sid());
        let replica: Weak<RefCell<Replica>> = Rc::downgrade(&self.inner);
        session.on_receive(Box::new(move |bytes: &[u8]| {
            let Some(inner) = replica.upgrade() else {
                return;
            };
            let doc = Document { inner };
            if let Err(err) = doc.receive(bytes) {
                debug!(sid = doc.sid(), error = %err, "incoming batch not fully applied");
            }
        }));
        let session: Rc<dyn Session> = Rc::new(session);
        let backlog = self.inner.borrow_mut().bridge.attach(session.clone());
        debug!(sid = self.sid(), patches = backlog.len(), "connected");
        for bytes in backlog {
            session.send(&bytes);
        }
    }

    /// Drop the current session. Local edits keep working and are replayed
    /// on the next [`Document::connect`].
    pub fn disconnect(&self) {
        let session = self.inner.borrow_mut().bridge.detach();
        drop(session);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.borrow().bridge.session().is_some()
    }

    /// Apply a serialized batch received from another replica.
    ///
    /// Undecodable batches leave the replica untouched. Batches that depend
    /// on operations not seen yet are buffered and retried after every
    /// later successful apply. Operations the tree rejects are dropped and
    /// the first of them is reported once the rest of the batch applied.
    pub fn receive(&self, bytes: &[u8]) -> Result<ReceiveOutcome, DocError> {
        let patch = match Patch::from_bytes(bytes) {
            Ok(patch) => patch,
            Err(err) => {
                warn!(sid = self.sid(), error = %err, "discarding undecodable batch");
                return Err(err.into());
            }
        };

        let mut replica = self.inner.borrow_mut();
        let replica = &mut *replica;
        if patch.is_empty() {
            return Ok(ReceiveOutcome::Applied { patches: 0 });
        }
        if replica.bridge.is_known(&patch) {
            return Ok(ReceiveOutcome::Duplicate);
        }
        if let Some(missing) = replica.model.missing_dependency(&patch) {
            warn!(
                sid = replica.model.sid(),
                patch = ?patch.get_id(),
                %missing,
                "deferring batch until its dependencies arrive"
            );
            if let Some(evicted) = replica.bridge.defer(patch) {
                warn!(
                    sid = replica.model.sid(),
                    patch = ?evicted.get_id(),
                    "deferred buffer full, dropping oldest batch"
                );
            }
            return Ok(ReceiveOutcome::Deferred);
        }

        let mut changed: IndexSet<Ts> = IndexSet::new();
        let mut conflicts = Vec::new();
        let mut applied = 0;
        let mut next = Some(patch);
        while let Some(patch) = next {
            let effect = replica.model.apply_patch(&patch);
            replica.bridge.mark_applied(&patch);
            debug!(
                sid = replica.model.sid(),
                patch = ?patch.get_id(),
                ops = patch.ops.len(),
                changed = effect.changed.len(),
                "applied remote batch"
            );
            changed.extend(effect.changed);
            conflicts.extend(effect.conflicts);
            applied += 1;
            next = replica.bridge.take_ready(&replica.model);
        }
        replica.notifier.enqueue(changed, ChangeOrigin::Remote);

        for conflict in &conflicts {
            warn!(sid = replica.model.sid(), %conflict, "dropped conflicting operation");
        }
        match conflicts.into_iter().next() {
            Some(conflict) => Err(conflict.into()),
            None => Ok(ReceiveOutcome::Applied { patches: applied }),
        }
    }

    /// Number of received batches waiting for their dependencies.
    pub fn deferred_batches(&self) -> usize {
        self.inner.borrow().bridge.deferred_len()
    }

    /// Every patch produced on this replica, serialized, oldest first.
    pub fn local_history(&self) -> Vec<Vec<u8>> {
        self.inner.borrow().bridge.log().to_vec()
    }

    // ── Events ────────────────────────────────────────────────────────────

    /// Deliver queued change events, including events queued by handlers
    /// while delivering, until the queue is empty.
    ///
    /// Returns the number of handler invocations. A handler that is already
    /// running (because it called `flush_events` itself) is skipped.
    pub fn flush_events(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.inner.borrow_mut().notifier.pop();
            let Some((pending, handlers)) = next else {
                return delivered;
            };
            if handlers.is_empty() {
                continue;
            }
            let snapshot = self
                .inner
                .borrow()
                .model
                .read(pending.node)
                .unwrap_or(Value::Null);
            let event = ChangeEvent {
                node: pending.node,
                origin: pending.origin,
                snapshot,
            };
            for handler in handlers {
                if let Ok(mut handler) = handler.try_borrow_mut() {
                    (&mut *handler)(&event);
                    delivered += 1;
                }
            }
        }
    }

    /// Number of change events waiting for [`Document::flush_events`].
    pub fn pending_events(&self) -> usize {
        self.inner.borrow().notifier.pending()
    }

    pub(crate) fn subscribe<F>(&self, node: Ts, handler: F) -> ListenerId
    where
        F: FnMut(&ChangeEvent) + 'static,
    {
        self.inner
            .borrow_mut()
            .notifier
            .subscribe(node, Rc::new(RefCell::new(handler)))
    }

    pub(crate) fn unsubscribe(&self, node: Ts, id: ListenerId) -> bool {
        self.inner.borrow_mut().notifier.unsubscribe(node, id)
    }

    // ── Statements ────────────────────────────────────────────────────────

    pub(crate) fn with_model<R>(&self, f: impl FnOnce(&Model) -> R) -> R {
        f(&self.inner.borrow().model)
    }

    /// Run one statement: build its operations, apply them, queue the
    /// change events and ship the patch.
    ///
    /// Nothing is applied or sent when `f` fails.
    pub(crate) fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Translator<'_>) -> Result<R, DocError>,
    ) -> Result<R, DocError> {
        let (result, outgoing) = {
            let mut replica = self.inner.borrow_mut();
            let replica = &mut *replica;
            let mut translator = Translator::new(&replica.model);
            let result = f(&mut translator)?;
            let patch = translator.finish();
            if patch.is_empty() {
                return Ok(result);
            }
            let effect = replica.model.apply_patch(&patch);
            for conflict in &effect.conflicts {
                warn!(sid = replica.model.sid(), %conflict, "local operation refused");
            }
            replica.notifier.enqueue(effect.changed, ChangeOrigin::Local);
            let bytes = replica.bridge.record_local(&patch);
            (result, replica.bridge.session().map(|s| (s, bytes)))
        };
        if let Some((session, bytes)) = outgoing {
            session.send(&bytes);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::local::LocalHub;
    use serde_json::json;

    #[test]
    fn statement_applies_immediately_events_wait() {
        let doc = Document::with_sid(70001);
        let root = doc.root();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        root.on_change(move |e| sink.borrow_mut().push(e.clone()));

        assert!(root.set("name", "Ann").is_ok());
        assert_eq!(doc.view(), json!({"name": "Ann"}));
        assert!(seen.borrow().is_empty());
        assert_eq!(doc.pending_events(), 1);

        assert_eq!(doc.flush_events(), 1);
        let events = seen.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].origin, ChangeOrigin::Local);
        assert_eq!(events[0].snapshot, json!({"name": "Ann"}));
    }

    #[test]
    fn failed_statement_leaves_no_trace() {
        let doc = Document::with_sid(70001);
        assert!(doc.root().set("xs", json!([1])).is_ok());
        doc.flush_events();
        let xs = doc.root().seq("xs");
        assert!(xs.is_ok());
        if let Ok(xs) = xs {
            assert!(xs.remove(4).is_err());
        }
        assert_eq!(doc.pending_events(), 0);
        assert_eq!(doc.local_history().len(), 1);
    }

    #[test]
    fn receive_rejects_garbage_without_side_effects() {
        let doc = Document::with_sid(70001);
        assert!(matches!(doc.receive(b"{oops"), Err(DocError::Decode(_))));
        assert_eq!(doc.view(), json!({}));
        assert_eq!(doc.pending_events(), 0);
    }

    #[test]
    fn receive_dedupes_by_patch_id() {
        let a = Document::with_sid(70001);
        let b = Document::with_sid(70002);
        assert!(a.root().set("k", 1).is_ok());
        let history = a.local_history();
        assert_eq!(history.len(), 1);

        assert_eq!(
            b.receive(&history[0]).ok(),
            Some(ReceiveOutcome::Applied { patches: 1 })
        );
        assert_eq!(b.receive(&history[0]).ok(), Some(ReceiveOutcome::Duplicate));
        assert_eq!(b.pending_events(), 1);
        assert_eq!(b.view(), json!({"k": 1}));
    }

    #[test]
    fn receive_handler_does_not_keep_replica_alive() {
        let hub = LocalHub::new();
        let doc = Document::with_sid(70001);
        doc.connect(&hub);
        let weak = Rc::downgrade(&doc.inner);
        drop(doc);
        assert!(weak.upgrade().is_none());
        assert_eq!(hub.peer_count(), 0);
    }
}
