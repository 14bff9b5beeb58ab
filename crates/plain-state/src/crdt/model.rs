//! The replicated node tree.
//!
//! A [`Model`] holds every CRDT node keyed by its timestamp ID, plus the
//! clock vector that tracks which operations have been observed. The root
//! is a map with the fixed ID [`ORIGIN`] on every replica, so two fresh
//! models already agree on the document they edit.
//!
//! Operations are applied via [`Model::apply_patch`] or
//! [`Model::apply_operation`]; [`Model::read`] materializes any node as a
//! plain JSON value.

use std::collections::HashSet;

use indexmap::IndexSet;
use rand::Rng;
use serde_json::Value;

use super::nodes::{ArrNode, ConNode, CrdtNode, NodeIndex, ObjNode};
use crate::crdt_patch::clock::{contains_id, ClockVector, Ts};
use crate::crdt_patch::constants::{ORIGIN, SESSION};
use crate::crdt_patch::operations::Op;
use crate::crdt_patch::patch::Patch;
use crate::error::{ConflictReason, MergeConflict};

/// What applying one patch did to the tree.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PatchEffect {
    /// Nodes whose direct children changed, in first-touched order.
    pub changed: IndexSet<Ts>,
    /// Operations the tree refused; the rest of the patch still applied.
    pub conflicts: Vec<MergeConflict>,
}

#[derive(Debug, Clone)]
pub struct Model {
    pub index: NodeIndex,
    /// Logical clock: tracks local time and the times of all peers.
    pub clock: ClockVector,
}

impl Model {
    /// Create a model holding only the empty root map.
    ///
    /// The clock starts at time `1` so that time `0` stays reserved for
    /// [`ORIGIN`].
    pub fn new(sid: u64) -> Self {
        let mut index = NodeIndex::default();
        index.insert(ORIGIN, CrdtNode::Obj(ObjNode::new(ORIGIN)));
        Self {
            index,
            clock: ClockVector::new(sid, 1),
        }
    }

    pub fn sid(&self) -> u64 {
        self.clock.sid
    }

    pub fn get(&self, id: &Ts) -> Option<&CrdtNode> {
        self.index.get(id)
    }

    /// Materialized plain value of node `id`, or `None` if the node is
    /// unknown.
    pub fn read(&self, id: Ts) -> Option<Value> {
        self.index.get(&id).map(|node| node.view(&self.index))
    }

    /// Materialized value of the whole document.
    pub fn view(&self) -> Value {
        self.read(ORIGIN)
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }

    /// Apply all operations in `patch`.
    ///
    /// A refused operation is recorded in [`PatchEffect::conflicts`] and
    /// skipped; it never aborts the rest of the patch.
    pub fn apply_patch(&mut self, patch: &Patch) -> PatchEffect {
        let mut effect = PatchEffect::default();
        for op in &patch.ops {
            match self.apply_operation(op) {
                Ok(Some(node)) => {
                    effect.changed.insert(node);
                }
                Ok(None) => {}
                Err(conflict) => effect.conflicts.push(conflict),
            }
        }
        effect
    }

    /// Apply a single operation.
    ///
    /// Returns the node whose children changed, `None` for creations, no-ops
    /// and operations that lost a last-writer-wins race or were already
    /// applied.
    pub fn apply_operation(&mut self, op: &Op) -> Result<Option<Ts>, MergeConflict> {
        self.clock.observe(op.id(), op.span());

        match op {
            // ── Creation operations ────────────────────────────────────────
            Op::NewCon { id, val } => {
                self.index
                    .entry(*id)
                    .or_insert_with(|| CrdtNode::Con(ConNode::new(*id, val.clone())));
                Ok(None)
            }
            Op::NewObj { id } => {
                self.index
                    .entry(*id)
                    .or_insert_with(|| CrdtNode::Obj(ObjNode::new(*id)));
                Ok(None)
            }
            Op::NewArr { id } => {
                self.index
                    .entry(*id)
                    .or_insert_with(|| CrdtNode::Arr(ArrNode::new(*id)));
                Ok(None)
            }

            // ── Mutation operations ────────────────────────────────────────
            Op::InsObj { id, obj, data } => {
                for (_, val) in data {
                    self.require(*id, *val)?;
                }
                let node = match self.index.get_mut(obj) {
                    Some(CrdtNode::Obj(node)) => node,
                    other => return Err(conflict_for(*id, *obj, other.is_some())),
                };
                let mut changed = false;
                for (key, val) in data {
                    // A value older than its container would let a patch
                    // attach an ancestor under its own descendant.
                    if node.id.time >= val.time {
                        continue;
                    }
                    changed |= node.put(key, *val);
                }
                Ok(changed.then_some(*obj))
            }
            Op::InsArr {
                id,
                obj,
                after,
                data,
            } => {
                for val in data {
                    self.require(*id, *val)?;
                }
                let node = match self.index.get_mut(obj) {
                    Some(CrdtNode::Arr(node)) => node,
                    other => return Err(conflict_for(*id, *obj, other.is_some())),
                };
                if !node.rga.has_anchor(*after) {
                    return Err(MergeConflict {
                        op: *id,
                        target: *after,
                        reason: ConflictReason::MissingTarget,
                    });
                }
                if data.iter().any(|val| node.id.time >= val.time) {
                    return Ok(None);
                }
                Ok(node.ins(*after, *id, data.clone()).then_some(*obj))
            }
            Op::UpdArr {
                id,
                obj,
                after,
                val,
            } => {
                self.require(*id, *val)?;
                let node = match self.index.get_mut(obj) {
                    Some(CrdtNode::Arr(node)) => node,
                    other => return Err(conflict_for(*id, *obj, other.is_some())),
                };
                if !node.has_slot(*after) {
                    return Err(MergeConflict {
                        op: *id,
                        target: *after,
                        reason: ConflictReason::MissingTarget,
                    });
                }
                if node.id.time >= val.time {
                    return Ok(None);
                }
                Ok(node.upd(*after, *val).then_some(*obj))
            }
            Op::Del { id, obj, what } => match self.index.get_mut(obj) {
                Some(CrdtNode::Arr(node)) => Ok((node.delete(what) > 0).then_some(*obj)),
                other => Err(conflict_for(*id, *obj, other.is_some())),
            },
            Op::Nop { .. } => Ok(None),
        }
    }

    fn require(&self, op: Ts, target: Ts) -> Result<(), MergeConflict> {
        if self.index.contains_key(&target) {
            Ok(())
        } else {
            Err(MergeConflict {
                op,
                target,
                reason: ConflictReason::MissingTarget,
            })
        }
    }

    /// First node or slot `patch` references that is neither known to this
    /// model nor created earlier in the same patch.
    ///
    /// A patch with a missing dependency was produced by a replica that has
    /// seen operations this one has not; it must wait for them.
    pub fn missing_dependency(&self, patch: &Patch) -> Option<Ts> {
        let mut nodes: HashSet<Ts> = HashSet::new();
        let mut slots: Vec<(Ts, u64)> = Vec::new();
        let node_known =
            |nodes: &HashSet<Ts>, id: Ts| nodes.contains(&id) || self.index.contains_key(&id);
        let slot_known = |slots: &[(Ts, u64)], arr: Ts, slot: Ts| {
            slot == ORIGIN
                || slots.iter().any(|(start, span)| contains_id(*start, *span, slot))
                || matches!(self.index.get(&arr), Some(CrdtNode::Arr(node)) if node.has_slot(slot))
        };

        for op in &patch.ops {
            match op {
                Op::NewCon { id, .. } | Op::NewObj { id } | Op::NewArr { id } => {
                    nodes.insert(*id);
                }
                Op::InsObj { obj, data, .. } => {
                    if !node_known(&nodes, *obj) {
                        return Some(*obj);
                    }
                    if let Some((_, val)) = data.iter().find(|(_, val)| !node_known(&nodes, *val)) {
                        return Some(*val);
                    }
                }
                Op::InsArr {
                    id,
                    obj,
                    after,
                    data,
                } => {
                    if !node_known(&nodes, *obj) {
                        return Some(*obj);
                    }
                    if !slot_known(slots.as_slice(), *obj, *after) {
                        return Some(*after);
                    }
                    if let Some(val) = data.iter().find(|val| !node_known(&nodes, **val)) {
                        return Some(*val);
                    }
                    slots.push((*id, op.span()));
                }
                Op::UpdArr {
                    obj, after, val, ..
                } => {
                    if !node_known(&nodes, *obj) {
                        return Some(*obj);
                    }
                    if !slot_known(slots.as_slice(), *obj, *after) {
                        return Some(*after);
                    }
                    if !node_known(&nodes, *val) {
                        return Some(*val);
                    }
                }
                Op::Del { obj, what, .. } => {
                    if !node_known(&nodes, *obj) {
                        return Some(*obj);
                    }
                    let missing = what
                        .iter()
                        .find(|s| !slot_known(slots.as_slice(), *obj, s.ts()));
                    if let Some(span) = missing {
                        return Some(span.ts());
                    }
                }
                Op::Nop { .. } => {}
            }
        }
        None
    }
}

fn conflict_for(op: Ts, target: Ts, exists: bool) -> MergeConflict {
    MergeConflict {
        op,
        target,
        reason: if exists {
            ConflictReason::WrongNodeType
        } else {
            ConflictReason::MissingTarget
        },
    }
}

/// Random session ID in `[65536, 2^53)`.
pub fn random_sid() -> u64 {
    rand::thread_rng().gen_range(SESSION::MIN_RANDOM..(1u64 << 53))
}
