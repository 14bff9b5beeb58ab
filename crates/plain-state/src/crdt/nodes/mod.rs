//! CRDT node types.
//!
//! | Rust type | Semantics                                  |
//! |-----------|--------------------------------------------|
//! | `ConNode` | Immutable primitive, or the undefined tomb |
//! | `ObjNode` | LWW key→node map                           |
//! | `ArrNode` | RGA array of node references               |

pub mod rga;

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;

use crate::crdt_patch::clock::{compare, contains_id, Ts, Tss};
use crate::crdt_patch::operations::ConValue;
use rga::Rga;

// ── ConNode ───────────────────────────────────────────────────────────────

/// Immutable constant node.
#[derive(Debug, Clone)]
pub struct ConNode {
    pub id: Ts,
    pub val: ConValue,
}

impl ConNode {
    pub fn new(id: Ts, val: ConValue) -> Self {
        Self { id, val }
    }

    pub fn is_undefined(&self) -> bool {
        self.val.is_undefined()
    }

    pub fn view(&self) -> Value {
        match &self.val {
            ConValue::Undefined => Value::Null,
            ConValue::Val(v) => v.clone(),
        }
    }
}

// ── ObjNode ───────────────────────────────────────────────────────────────

/// Last-write-wins map from string keys to node IDs.
///
/// Keys keep their first insertion position; a key deleted by writing the
/// undefined constant keeps its entry so later LWW comparisons still see it.
#[derive(Debug, Clone)]
pub struct ObjNode {
    pub id: Ts,
    pub keys: IndexMap<String, Ts>,
}

impl ObjNode {
    pub fn new(id: Ts) -> Self {
        Self {
            id,
            keys: IndexMap::new(),
        }
    }

    /// Insert a key, keeping it only if `new_id` is newer than the existing
    /// entry. Returns `true` when the entry changed.
    pub fn put(&mut self, key: &str, new_id: Ts) -> bool {
        match self.keys.get_mut(key) {
            Some(old) if compare(new_id, *old) <= 0 => false,
            Some(old) => {
                *old = new_id;
                true
            }
            None => {
                self.keys.insert(key.to_string(), new_id);
                true
            }
        }
    }

    /// The node ID currently held by `key`, including the undefined tomb.
    pub fn get(&self, key: &str) -> Option<Ts> {
        self.keys.get(key).copied()
    }

    pub fn view(&self, index: &NodeIndex) -> Value {
        let mut map = serde_json::Map::new();
        for (key, id) in &self.keys {
            match index.get(id) {
                Some(CrdtNode::Con(con)) if con.is_undefined() => {}
                Some(node) => {
                    map.insert(key.clone(), node.view(index));
                }
                None => {
                    map.insert(key.clone(), Value::Null);
                }
            }
        }
        Value::Object(map)
    }
}

// ── ArrNode ───────────────────────────────────────────────────────────────

/// RGA array of node-ID references.
///
/// Each slot has its own ID (assigned by the `ins_arr` that created it) and
/// holds the ID of a value node. `upd_arr` swaps the value node of a slot
/// with LWW semantics; `del` tombstones slots.
#[derive(Debug, Clone)]
pub struct ArrNode {
    pub id: Ts,
    pub rga: Rga<Vec<Ts>>,
}

impl ArrNode {
    pub fn new(id: Ts) -> Self {
        Self {
            id,
            rga: Rga::new(),
        }
    }

    /// Insert node IDs after slot `after`. Returns `true` if inserted.
    pub fn ins(&mut self, after: Ts, id: Ts, data: Vec<Ts>) -> bool {
        let span = data.len() as u64;
        self.rga.insert(after, id, span, data)
    }

    /// Get the value node held by slot `slot`, if the slot is live.
    pub fn get_by_id(&self, slot: Ts) -> Option<Ts> {
        self.rga
            .iter_live()
            .find(|c| contains_id(c.id, c.span, slot))
            .and_then(|c| {
                let offset = (slot.time - c.id.time) as usize;
                c.data.as_ref().and_then(|d| d.get(offset).copied())
            })
    }

    /// Replace the value node of slot `slot`.
    ///
    /// Only replaces the current value if `val` has a higher timestamp.
    /// Returns `true` when the slot changed.
    pub fn upd(&mut self, slot: Ts, val: Ts) -> bool {
        for chunk in &mut self.rga.chunks {
            if !contains_id(chunk.id, chunk.span, slot) {
                continue;
            }
            let offset = (slot.time - chunk.id.time) as usize;
            return match chunk.data.as_mut().and_then(|d| d.get_mut(offset)) {
                Some(current) if compare(*current, val) < 0 => {
                    *current = val;
                    true
                }
                _ => false,
            };
        }
        false
    }

    /// Tombstone slots. Returns the number of slots that were live.
    pub fn delete(&mut self, spans: &[Tss]) -> u64 {
        self.rga.delete(spans)
    }

    /// Whether the slot was ever inserted, live or deleted.
    pub fn has_slot(&self, slot: Ts) -> bool {
        self.rga.find_by_id(slot).is_some()
    }

    /// Number of live elements in this array.
    pub fn size(&self) -> usize {
        self.rga
            .iter_live()
            .filter_map(|c| c.data.as_ref())
            .map(|v| v.len())
            .sum()
    }

    /// Return the slot ID of the element at live position `pos`.
    pub fn find(&self, pos: usize) -> Option<Ts> {
        let mut count = 0usize;
        for chunk in self.rga.iter_live() {
            if let Some(data) = &chunk.data {
                let chunk_len = data.len();
                if pos < count + chunk_len {
                    let offset = pos - count;
                    return Some(Ts::new(chunk.id.sid, chunk.id.time + offset as u64));
                }
                count += chunk_len;
            }
        }
        None
    }

    /// Return the slot-ID spans covering live positions `[pos, pos + len)`.
    pub fn find_interval(&self, pos: usize, len: usize) -> Vec<Tss> {
        let mut result = Vec::new();
        let mut count = 0usize;
        let end = pos + len;
        for chunk in self.rga.iter_live() {
            if let Some(data) = &chunk.data {
                let chunk_len = data.len();
                let chunk_start = count;
                let chunk_end = count + chunk_len;
                if chunk_end > pos && chunk_start < end {
                    let local_start = pos.saturating_sub(chunk_start);
                    let local_end = (end - chunk_start).min(chunk_len);
                    result.push(Tss::new(
                        chunk.id.sid,
                        chunk.id.time + local_start as u64,
                        (local_end - local_start) as u64,
                    ));
                }
                count = chunk_end;
            }
        }
        result
    }

    /// Get the value node ID at live position `pos`.
    pub fn get_data_ts(&self, pos: usize) -> Option<Ts> {
        let mut count = 0usize;
        for chunk in self.rga.iter_live() {
            if let Some(data) = &chunk.data {
                let chunk_len = data.len();
                if pos < count + chunk_len {
                    return Some(data[pos - count]);
                }
                count += chunk_len;
            }
        }
        None
    }

    pub fn view(&self, index: &NodeIndex) -> Value {
        let mut items = Vec::new();
        for chunk in self.rga.iter_live() {
            if let Some(ids) = &chunk.data {
                for id in ids {
                    let val = match index.get(id) {
                        Some(node) => node.view(index),
                        None => Value::Null,
                    };
                    items.push(val);
                }
            }
        }
        Value::Array(items)
    }
}

// ── CrdtNode enum ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum CrdtNode {
    Con(ConNode),
    Obj(ObjNode),
    Arr(ArrNode),
}

impl CrdtNode {
    pub fn id(&self) -> Ts {
        match self {
            Self::Con(n) => n.id,
            Self::Obj(n) => n.id,
            Self::Arr(n) => n.id,
        }
    }

    pub fn view(&self, index: &NodeIndex) -> Value {
        match self {
            Self::Con(n) => n.view(),
            Self::Obj(n) => n.view(index),
            Self::Arr(n) => n.view(index),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Con(_) => "con",
            Self::Obj(_) => "obj",
            Self::Arr(_) => "arr",
        }
    }
}

/// Map from timestamp ID to CRDT node.
pub type NodeIndex = HashMap<Ts, CrdtNode>;
