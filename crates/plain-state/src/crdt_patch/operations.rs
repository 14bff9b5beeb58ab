//! The operation set of a document patch, as a single Rust enum.

use std::fmt;

use serde_json::Value;

use super::clock::{Ts, Tss};

// ── ConValue ───────────────────────────────────────────────────────────────

/// The value stored in a `new_con` operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConValue {
    /// The tombstone written over a deleted map key.
    Undefined,
    /// A primitive JSON value: null, bool, number or string.
    Val(Value),
}

impl ConValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, ConValue::Undefined)
    }
}

// ── Operation ──────────────────────────────────────────────────────────────

/// A single patch operation.
///
/// Each variant carries an `id: Ts` identifying the operation in the
/// global logical clock space.
///
/// Span (the number of clock ticks consumed):
/// - Most operations consume 1 tick.
/// - `InsArr` consumes `data.len()` ticks, one per inserted slot.
/// - `Nop` consumes `len` ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // ── Creation operations ──────────────────────────────────────────────
    /// Create a new constant `con` value.
    NewCon { id: Ts, val: ConValue },
    /// Create a new LWW-Map `obj` node.
    NewObj { id: Ts },
    /// Create a new RGA-Array `arr` node.
    NewArr { id: Ts },

    // ── Mutation operations ──────────────────────────────────────────────
    /// Set key→value pairs in an `obj` map.
    InsObj {
        id: Ts,
        obj: Ts,
        data: Vec<(String, Ts)>,
    },
    /// Insert elements into an `arr` RGA after slot `after`.
    InsArr {
        id: Ts,
        obj: Ts,
        after: Ts,
        data: Vec<Ts>,
    },
    /// Replace the node held by slot `after` of an `arr`.
    UpdArr { id: Ts, obj: Ts, after: Ts, val: Ts },
    /// Tombstone ranges of slots in an `arr`.
    Del { id: Ts, obj: Ts, what: Vec<Tss> },
    /// Skips clock cycles without performing any CRDT action.
    Nop { id: Ts, len: u64 },
}

impl Op {
    /// Returns the ID (first timestamp) of this operation.
    pub fn id(&self) -> Ts {
        match self {
            Op::NewCon { id, .. }
            | Op::NewObj { id }
            | Op::NewArr { id }
            | Op::InsObj { id, .. }
            | Op::InsArr { id, .. }
            | Op::UpdArr { id, .. }
            | Op::Del { id, .. }
            | Op::Nop { id, .. } => *id,
        }
    }

    /// Number of logical clock cycles consumed by this operation.
    pub fn span(&self) -> u64 {
        match self {
            Op::InsArr { data, .. } => data.len() as u64,
            Op::Nop { len, .. } => *len,
            _ => 1,
        }
    }

    /// Short mnemonic name of this operation (used in the verbose JSON codec).
    pub fn name(&self) -> &'static str {
        match self {
            Op::NewCon { .. } => "new_con",
            Op::NewObj { .. } => "new_obj",
            Op::NewArr { .. } => "new_arr",
            Op::InsObj { .. } => "ins_obj",
            Op::InsArr { .. } => "ins_arr",
            Op::UpdArr { .. } => "upd_arr",
            Op::Del { .. } => "del",
            Op::Nop { .. } => "nop",
        }
    }

    /// The node this operation mutates, if it is a mutation.
    pub fn target(&self) -> Option<Ts> {
        match self {
            Op::InsObj { obj, .. }
            | Op::InsArr { obj, .. }
            | Op::UpdArr { obj, .. }
            | Op::Del { obj, .. } => Some(*obj),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.id())?;
        if self.span() > 1 {
            write!(f, "!{}", self.span())?;
        }
        match self {
            Op::NewCon {
                val: ConValue::Undefined,
                ..
            } => f.write_str(" { undefined }"),
            Op::NewCon {
                val: ConValue::Val(v),
                ..
            } => write!(f, " {{ {v} }}"),
            Op::InsObj { obj, data, .. } => {
                write!(f, ", obj = {obj} {{ ")?;
                for (i, (key, val)) in data.iter().enumerate() {
                    let sep = if i == 0 { "" } else { ", " };
                    write!(f, "{sep}{key:?}: {val}")?;
                }
                f.write_str(" }")
            }
            Op::InsArr {
                obj, after, data, ..
            } => {
                write!(f, ", obj = {obj} {{ {after} <- [")?;
                for (i, val) in data.iter().enumerate() {
                    let sep = if i == 0 { "" } else { ", " };
                    write!(f, "{sep}{val}")?;
                }
                f.write_str("] }")
            }
            Op::UpdArr {
                obj, after, val, ..
            } => write!(f, ", obj = {obj} {{ {after} = {val} }}"),
            Op::Del { obj, what, .. } => {
                write!(f, ", obj = {obj} {{ ")?;
                for (i, span) in what.iter().enumerate() {
                    let sep = if i == 0 { "" } else { ", " };
                    write!(f, "{sep}{}!{}", span.ts(), span.span)?;
                }
                f.write_str(" }")
            }
            Op::NewObj { .. } | Op::NewArr { .. } | Op::Nop { .. } => Ok(()),
        }
    }
}
