//! [`PatchBuilder`]: fluent builder for constructing [`Patch`]es.

use serde_json::Value;

use super::clock::{ts, LogicalClock, Ts, Tss};
use super::operations::{ConValue, Op};
use super::patch::Patch;

/// Utility for constructing a [`Patch`] operation by operation.
///
/// Every creation or mutation method ticks the clock by the span of the
/// operation it appends and returns the operation's ID.
pub struct PatchBuilder {
    pub clock: LogicalClock,
    pub patch: Patch,
}

impl PatchBuilder {
    pub fn new(sid: u64, time: u64) -> Self {
        Self {
            clock: LogicalClock::new(sid, time),
            patch: Patch::new(),
        }
    }

    /// Returns the sequence number of the next operation's timestamp.
    pub fn next_time(&self) -> u64 {
        let patch_next = self.patch.next_time();
        if patch_next == 0 {
            self.clock.time
        } else {
            patch_next
        }
    }

    /// Returns the current patch and resets the builder.
    pub fn flush(&mut self) -> Patch {
        std::mem::take(&mut self.patch)
    }

    // ── Padding ────────────────────────────────────────────────────────────

    /// Adds a `Nop` if the clock has drifted ahead of the patch's last op.
    pub fn pad(&mut self) {
        let next_time = self.patch.next_time();
        if next_time == 0 {
            return;
        }
        let drift = self.clock.time.saturating_sub(next_time);
        if drift > 0 {
            let id = ts(self.clock.sid, next_time);
            self.patch.ops.push(Op::Nop { id, len: drift });
        }
    }

    // ── Creation operations ────────────────────────────────────────────────

    /// Create a new `con` holding a primitive JSON value.
    pub fn con_val(&mut self, val: Value) -> Ts {
        self.con(ConValue::Val(val))
    }

    /// Create the `undefined` constant used to delete map keys.
    pub fn con_undefined(&mut self) -> Ts {
        self.con(ConValue::Undefined)
    }

    fn con(&mut self, val: ConValue) -> Ts {
        self.pad();
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::NewCon { id, val });
        id
    }

    /// Create a new `obj` LWW-Map.
    pub fn obj(&mut self) -> Ts {
        self.pad();
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::NewObj { id });
        id
    }

    /// Create a new `arr` RGA-Array.
    pub fn arr(&mut self) -> Ts {
        self.pad();
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::NewArr { id });
        id
    }

    // ── Mutation operations ────────────────────────────────────────────────

    /// Set key→value pairs in an `obj`. An empty `data` appends nothing.
    pub fn ins_obj(&mut self, obj: Ts, data: Vec<(String, Ts)>) -> Ts {
        if data.is_empty() {
            return ts(self.clock.sid, self.next_time());
        }
        self.pad();
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::InsObj { id, obj, data });
        id
    }

    /// Insert elements into an `arr` after slot `after`.
    ///
    /// The inserted slots take the IDs `id..id + data.len()`.
    pub fn ins_arr(&mut self, arr: Ts, after: Ts, data: Vec<Ts>) -> Ts {
        if data.is_empty() {
            return ts(self.clock.sid, self.next_time());
        }
        self.pad();
        let span = data.len() as u64;
        let id = self.clock.tick(span);
        self.patch.ops.push(Op::InsArr {
            id,
            obj: arr,
            after,
            data,
        });
        id
    }

    /// Replace the node held by slot `after` of an `arr`.
    pub fn upd_arr(&mut self, arr: Ts, after: Ts, val: Ts) -> Ts {
        self.pad();
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::UpdArr {
            id,
            obj: arr,
            after,
            val,
        });
        id
    }

    /// Delete spans of slots in an `arr`.
    pub fn del(&mut self, obj: Ts, what: Vec<Tss>) -> Ts {
        self.pad();
        let id = self.clock.tick(1);
        self.patch.ops.push(Op::Del { id, obj, what });
        id
    }

    /// Insert a no-op of the given span.
    pub fn nop(&mut self, span: u64) -> Ts {
        self.pad();
        let id = self.clock.tick(span);
        self.patch.ops.push(Op::Nop { id, len: span });
        id
    }
}
