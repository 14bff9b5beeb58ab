//! [`Patch`]: the batch of operations produced by one local statement.

use super::clock::Ts;
use super::codec::{self, DecodeError};
use super::operations::Op;

/// An ordered list of operations.
///
/// Normally created via [`PatchBuilder`](super::patch_builder::PatchBuilder).
/// Operations inside a patch are causally ordered: a node created by the
/// patch is always created before it is referenced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Patch {
    pub ops: Vec<Op>,
}

impl Patch {
    /// Creates an empty patch with no operations.
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Returns the ID of the first operation, if any.
    pub fn get_id(&self) -> Option<Ts> {
        self.ops.first().map(|op| op.id())
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the total logical clock span consumed by all operations.
    pub fn span(&self) -> u64 {
        self.ops.iter().map(|op| op.span()).sum()
    }

    /// Returns the logical time expected for the next operation to be inserted.
    ///
    /// Returns 0 if the patch has no operations.
    pub fn next_time(&self) -> u64 {
        match self.ops.last() {
            None => 0,
            Some(op) => op.id().time + op.span(),
        }
    }

    /// Serializes the patch with the verbose JSON codec.
    pub fn to_bytes(&self) -> Vec<u8> {
        codec::encode(self).to_string().into_bytes()
    }

    /// Parses a patch produced by [`Patch::to_bytes`].
    pub fn from_bytes(data: &[u8]) -> Result<Patch, DecodeError> {
        let value: serde_json::Value = serde_json::from_slice(data)?;
        codec::decode(&value)
    }
}

impl std::fmt::Display for Patch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get_id() {
            Some(id) => write!(f, "Patch {}!{}", id, self.span())?,
            None => write!(f, "Patch (nil)!{}", self.span())?,
        }
        for op in &self.ops {
            write!(f, "\n  {}", op)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt_patch::clock::ts;

    #[test]
    fn empty_patch() {
        let p = Patch::new();
        assert_eq!(p.get_id(), None);
        assert_eq!(p.span(), 0);
        assert_eq!(p.next_time(), 0);
        assert!(p.is_empty());
    }

    #[test]
    fn patch_with_single_op() {
        let mut p = Patch::new();
        p.ops.push(Op::NewObj { id: ts(1, 100) });
        assert_eq!(p.get_id(), Some(ts(1, 100)));
        assert_eq!(p.span(), 1);
        assert_eq!(p.next_time(), 101);
    }

    #[test]
    fn display_lists_ops() {
        let mut p = Patch::new();
        p.ops.push(Op::NewArr { id: ts(3, 10) });
        p.ops.push(Op::Nop {
            id: ts(3, 11),
            len: 2,
        });
        assert_eq!(p.to_string(), "Patch 3.10!3\n  new_arr 3.10\n  nop 3.11!2");
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        assert!(Patch::from_bytes(b"not json").is_err());
    }
}
