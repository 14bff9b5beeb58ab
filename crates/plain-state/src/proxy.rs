//! Proxy Factory: plain map and sequence views over nodes of a [`Document`].
//!
//! A proxy is a document handle plus a node ID. It holds no state of its
//! own: every read goes back to the node tree, and every write is one
//! statement run through the translator. Composite children are wrapped in
//! a fresh proxy on each access.

use serde::Serialize;
use serde_json::Value;

use crate::crdt::nodes::CrdtNode;
use crate::crdt_patch::clock::Ts;
use crate::document::Document;
use crate::error::DocError;
use crate::notifier::{ChangeEvent, ListenerId};
use crate::translator::{arr_node, live_key, obj_node};
use crate::value::to_plain;

/// Either kind of composite view.
#[derive(Debug, Clone)]
pub enum Proxy {
    Map(MapProxy),
    Seq(SeqProxy),
}

impl Proxy {
    pub fn id(&self) -> Ts {
        match self {
            Proxy::Map(map) => map.id,
            Proxy::Seq(seq) => seq.id,
        }
    }

    pub fn value(&self) -> Value {
        match self {
            Proxy::Map(map) => map.value(),
            Proxy::Seq(seq) => seq.value(),
        }
    }

    pub fn as_map(&self) -> Option<&MapProxy> {
        match self {
            Proxy::Map(map) => Some(map),
            Proxy::Seq(_) => None,
        }
    }

    pub fn as_seq(&self) -> Option<&SeqProxy> {
        match self {
            Proxy::Seq(seq) => Some(seq),
            Proxy::Map(_) => None,
        }
    }

    pub fn on_change<F>(&self, handler: F) -> ListenerId
    where
        F: FnMut(&ChangeEvent) + 'static,
    {
        match self {
            Proxy::Map(map) => map.on_change(handler),
            Proxy::Seq(seq) => seq.on_change(handler),
        }
    }

    pub fn off_change(&self, id: ListenerId) -> bool {
        match self {
            Proxy::Map(map) => map.off_change(id),
            Proxy::Seq(seq) => seq.off_change(id),
        }
    }
}

/// Wrap `id` in a proxy if it names a map or sequence node.
fn wrap(doc: &Document, id: Ts) -> Option<Proxy> {
    doc.with_model(|model| match model.get(&id) {
        Some(CrdtNode::Obj(_)) => Some(Proxy::Map(MapProxy::new(doc.clone(), id))),
        Some(CrdtNode::Arr(_)) => Some(Proxy::Seq(SeqProxy::new(doc.clone(), id))),
        _ => None,
    })
}

fn expect_map(proxy: Option<Proxy>) -> Result<MapProxy, DocError> {
    match proxy {
        Some(Proxy::Map(map)) => Ok(map),
        _ => Err(DocError::WrongType { expected: "a map" }),
    }
}

fn expect_seq(proxy: Option<Proxy>) -> Result<SeqProxy, DocError> {
    match proxy {
        Some(Proxy::Seq(seq)) => Ok(seq),
        _ => Err(DocError::WrongType {
            expected: "a sequence",
        }),
    }
}

// ── MapProxy ──────────────────────────────────────────────────────────────

/// View over a map node.
#[derive(Debug, Clone)]
pub struct MapProxy {
    doc: Document,
    id: Ts,
}

impl MapProxy {
    pub(crate) fn new(doc: Document, id: Ts) -> Self {
        Self { doc, id }
    }

    pub fn id(&self) -> Ts {
        self.id
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    fn child_id(&self, key: &str) -> Option<Ts> {
        self.doc.with_model(|model| {
            let node = obj_node(model, self.id).ok()?;
            live_key(model, node, key)
        })
    }

    /// Current value under `key`; `None` when the key is absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        let id = self.child_id(key)?;
        self.doc.with_model(|model| model.read(id))
    }

    /// Proxy over the map or sequence under `key`.
    pub fn child(&self, key: &str) -> Option<Proxy> {
        wrap(&self.doc, self.child_id(key)?)
    }

    pub fn map(&self, key: &str) -> Result<MapProxy, DocError> {
        let id = self.child_id(key).ok_or(DocError::NotFound)?;
        expect_map(wrap(&self.doc, id))
    }

    pub fn seq(&self, key: &str) -> Result<SeqProxy, DocError> {
        let id = self.child_id(key).ok_or(DocError::NotFound)?;
        expect_seq(wrap(&self.doc, id))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.child_id(key).is_some()
    }

    /// Live keys in first-insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.doc.with_model(|model| {
            let Ok(node) = obj_node(model, self.id) else {
                return Vec::new();
            };
            node.keys
                .keys()
                .filter(|key| live_key(model, node, key).is_some())
                .cloned()
                .collect()
        })
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deep plain value of the whole map.
    pub fn value(&self) -> Value {
        self.doc
            .with_model(|model| model.read(self.id))
            .unwrap_or(Value::Null)
    }

    /// `self[key] = value`.
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), DocError> {
        let value = to_plain(&value)?;
        self.doc.mutate(|tx| tx.set_property(self.id, key, &value))
    }

    /// `delete self[key]`; returns whether the key was present.
    pub fn delete(&self, key: &str) -> Result<bool, DocError> {
        self.doc.mutate(|tx| tx.delete_property(self.id, key))
    }

    /// `self[key] += by`, returning the new value.
    pub fn increment(&self, key: &str, by: i64) -> Result<Value, DocError> {
        self.doc.mutate(|tx| tx.increment_property(self.id, key, by))
    }

    pub fn on_change<F>(&self, handler: F) -> ListenerId
    where
        F: FnMut(&ChangeEvent) + 'static,
    {
        self.doc.subscribe(self.id, handler)
    }

    pub fn off_change(&self, id: ListenerId) -> bool {
        self.doc.unsubscribe(self.id, id)
    }
}

// ── SeqProxy ──────────────────────────────────────────────────────────────

/// View over a sequence node.
#[derive(Debug, Clone)]
pub struct SeqProxy {
    doc: Document,
    id: Ts,
}

impl SeqProxy {
    pub(crate) fn new(doc: Document, id: Ts) -> Self {
        Self { doc, id }
    }

    pub fn id(&self) -> Ts {
        self.id
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    fn element_id(&self, index: usize) -> Option<Ts> {
        self.doc.with_model(|model| {
            arr_node(model, self.id).ok()?.get_data_ts(index)
        })
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        let id = self.element_id(index)?;
        self.doc.with_model(|model| model.read(id))
    }

    pub fn child(&self, index: usize) -> Option<Proxy> {
        wrap(&self.doc, self.element_id(index)?)
    }

    pub fn map(&self, index: usize) -> Result<MapProxy, DocError> {
        let id = self.element_id(index).ok_or(DocError::OutOfBounds {
            index,
            len: self.len(),
        })?;
        expect_map(wrap(&self.doc, id))
    }

    pub fn seq(&self, index: usize) -> Result<SeqProxy, DocError> {
        let id = self.element_id(index).ok_or(DocError::OutOfBounds {
            index,
            len: self.len(),
        })?;
        expect_seq(wrap(&self.doc, id))
    }

    pub fn len(&self) -> usize {
        self.doc
            .with_model(|model| arr_node(model, self.id).map_or(0, |node| node.size()))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value(&self) -> Value {
        self.doc
            .with_model(|model| model.read(self.id))
            .unwrap_or(Value::Null)
    }

    /// `self[index] = value`. Writing at `len()` appends.
    pub fn set<T: Serialize>(&self, index: usize, value: T) -> Result<(), DocError> {
        let value = to_plain(&value)?;
        let len = self.len();
        self.doc.mutate(|tx| {
            if index < len {
                tx.seq_update(self.id, index, &value)
            } else if index == len {
                tx.sequence_push(self.id, &value)
            } else {
                Err(DocError::OutOfBounds { index, len })
            }
        })
    }

    /// Insert `value` so that it ends up at `index`.
    pub fn insert<T: Serialize>(&self, index: usize, value: T) -> Result<(), DocError> {
        let value = to_plain(&value)?;
        self.doc.mutate(|tx| tx.seq_insert(self.id, index, std::slice::from_ref(&value)))
    }

    /// Remove the element at `index` and return its value.
    pub fn remove(&self, index: usize) -> Result<Value, DocError> {
        self.doc.mutate(|tx| tx.sequence_remove(self.id, index))
    }

    pub fn push<T: Serialize>(&self, value: T) -> Result<(), DocError> {
        let value = to_plain(&value)?;
        self.doc.mutate(|tx| tx.sequence_push(self.id, &value))
    }

    pub fn pop(&self) -> Result<Option<Value>, DocError> {
        self.doc.mutate(|tx| tx.sequence_pop(self.id))
    }

    pub fn shift(&self) -> Result<Option<Value>, DocError> {
        self.doc.mutate(|tx| tx.sequence_shift(self.id))
    }

    pub fn unshift<T: Serialize>(&self, value: T) -> Result<(), DocError> {
        let value = to_plain(&value)?;
        self.doc.mutate(|tx| tx.sequence_unshift(self.id, &value))
    }

    /// `self[index] += by`, returning the new value.
    pub fn increment(&self, index: usize, by: i64) -> Result<Value, DocError> {
        self.doc.mutate(|tx| tx.increment_element(self.id, index, by))
    }

    pub fn on_change<F>(&self, handler: F) -> ListenerId
    where
        F: FnMut(&ChangeEvent) + 'static,
    {
        self.doc.subscribe(self.id, handler)
    }

    pub fn off_change(&self, id: ListenerId) -> bool {
        self.doc.unsubscribe(self.id, id)
    }
}
