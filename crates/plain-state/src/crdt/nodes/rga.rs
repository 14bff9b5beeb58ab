//! Linear-scan RGA (Replicated Growable Array).
//!
//! Items are kept in a `Vec<Chunk<T>>`, one chunk per insert operation until
//! an insert or delete lands inside it and splits it. Every operation is a
//! linear scan, which is plenty for documents edited through proxies.

use crate::crdt_patch::clock::{compare, contains_id, Ts, Tss};
use crate::crdt_patch::constants::ORIGIN;

// ── ChunkData ─────────────────────────────────────────────────────────────

/// Trait for chunk payload types that can be split at a logical item offset.
///
/// Required for partial-chunk deletion: when a deletion range covers only
/// part of a chunk, the chunk must be split before the covered part is
/// marked deleted.
pub trait ChunkData: Clone {
    /// Modifies `self` to hold items `[0, at)` and returns items `[at, len)`.
    fn split_at_offset(&mut self, at: usize) -> Self;
}

impl ChunkData for Vec<Ts> {
    fn split_at_offset(&mut self, at: usize) -> Self {
        self.split_off(at)
    }
}

// ── Chunk ─────────────────────────────────────────────────────────────────

/// A contiguous run of items inserted by the same operation.
///
/// Items within a chunk always carry consecutive timestamps
/// `id, id+1, id+2, ...`.
#[derive(Debug, Clone)]
pub struct Chunk<T: Clone> {
    /// Timestamp of the *first* item in this chunk.
    pub id: Ts,
    /// Number of logical items in this chunk (including deleted ones).
    pub span: u64,
    pub deleted: bool,
    /// `None` once the chunk is a tombstone.
    pub data: Option<T>,
}

impl<T: Clone> Chunk<T> {
    pub fn new(id: Ts, span: u64, data: T) -> Self {
        Self {
            id,
            span,
            deleted: false,
            data: Some(data),
        }
    }

    pub fn len(&self) -> u64 {
        if self.deleted {
            0
        } else {
            self.span
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Rga ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Rga<T: Clone> {
    pub chunks: Vec<Chunk<T>>,
}

impl<T: Clone + ChunkData> Rga<T> {
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    /// Find the chunk index whose ID range contains `ts`, or `None`.
    /// Tombstoned chunks are found too.
    pub fn find_by_id(&self, ts: Ts) -> Option<usize> {
        self.chunks
            .iter()
            .position(|c| contains_id(c.id, c.span, ts))
    }

    /// Whether `after` is a valid insertion anchor: ORIGIN or a known item.
    pub fn has_anchor(&self, after: Ts) -> bool {
        after == ORIGIN || self.find_by_id(after).is_some()
    }

    /// Insert `data` with timestamp `id` after the item identified by
    /// `after`, or at the beginning when `after` is ORIGIN.
    ///
    /// Returns `false` without touching the sequence when the insert was
    /// already applied or the anchor is unknown.
    ///
    /// Concurrent inserts at the same anchor are ordered by timestamp: an
    /// existing chunk with a higher timestamp stays to the left.
    pub fn insert(&mut self, after: Ts, id: Ts, span: u64, data: T) -> bool {
        if self.find_by_id(id).is_some() {
            return false;
        }
        let insert_pos = if after == ORIGIN {
            0
        } else {
            match self.find_by_id(after) {
                Some(idx) => {
                    let chunk_last_time = self.chunks[idx].id.time + self.chunks[idx].span - 1;
                    if after.time < chunk_last_time {
                        let split_offset = (after.time - self.chunks[idx].id.time + 1) as usize;
                        self.split_chunk_at(idx, split_offset);
                    }
                    idx + 1
                }
                None => return false,
            }
        };

        let mut pos = insert_pos;
        while pos < self.chunks.len() && compare(self.chunks[pos].id, id) > 0 {
            pos += 1;
        }

        self.chunks.insert(pos, Chunk::new(id, span, data));
        true
    }

    // ── Chunk splitting ──────────────────────────────────────────────────

    /// Split the chunk at `chunk_idx` at logical offset `at_offset`.
    ///
    /// After the call `chunks[chunk_idx]` holds items `[0, at_offset)` and
    /// `chunks[chunk_idx + 1]` holds items `[at_offset, original_span)`.
    fn split_chunk_at(&mut self, chunk_idx: usize, at_offset: usize) {
        if at_offset == 0 {
            return;
        }
        let span = self.chunks[chunk_idx].span;
        if at_offset as u64 >= span {
            return;
        }

        let chunk = &mut self.chunks[chunk_idx];
        let id = chunk.id;
        let deleted = chunk.deleted;
        let right_data = chunk.data.as_mut().map(|d| d.split_at_offset(at_offset));

        let right_chunk = Chunk {
            id: Ts::new(id.sid, id.time + at_offset as u64),
            span: span - at_offset as u64,
            deleted,
            data: right_data,
        };

        self.chunks[chunk_idx].span = at_offset as u64;
        self.chunks.insert(chunk_idx + 1, right_chunk);
    }

    // ── Deletion ─────────────────────────────────────────────────────────

    /// Tombstone all items covered by the given timestamp spans.
    ///
    /// Returns the number of items that were live before the call.
    /// Deleting an already deleted item is a no-op.
    pub fn delete(&mut self, spans: &[Tss]) -> u64 {
        let mut removed = 0;
        for tss in spans {
            let del_start = tss.time;
            let del_end = tss.time.saturating_add(tss.span);

            let mut i = 0;
            while i < self.chunks.len() {
                let chunk = &self.chunks[i];
                let chunk_start = chunk.id.time;
                let chunk_end = chunk.id.time + chunk.span;
                if chunk.id.sid != tss.sid
                    || chunk.deleted
                    || chunk_start >= del_end
                    || chunk_end <= del_start
                {
                    i += 1;
                    continue;
                }

                let overlap_start = del_start.max(chunk_start);
                let overlap_end = del_end.min(chunk_end);

                if overlap_start > chunk_start {
                    self.split_chunk_at(i, (overlap_start - chunk_start) as usize);
                    i += 1;
                }

                let chunk_start = self.chunks[i].id.time;
                let chunk_end = chunk_start + self.chunks[i].span;
                if overlap_end < chunk_end {
                    self.split_chunk_at(i, (overlap_end - chunk_start) as usize);
                }

                let chunk = &mut self.chunks[i];
                removed += chunk.span;
                chunk.deleted = true;
                chunk.data = None;

                i += 1;
            }
        }
        removed
    }

    // ── Iteration ────────────────────────────────────────────────────────

    /// Iterate live (non-deleted) chunks.
    pub fn iter_live(&self) -> impl Iterator<Item = &Chunk<T>> {
        self.chunks.iter().filter(|c| !c.deleted)
    }
}
