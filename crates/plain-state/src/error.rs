use thiserror::Error;

use crate::crdt_patch::clock::Ts;
use crate::crdt_patch::codec::DecodeError;

/// Why an operation could not be merged into the node tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The node, slot or value the operation references does not exist.
    MissingTarget,
    /// The referenced node exists but has the wrong type for the operation.
    WrongNodeType,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::MissingTarget => f.write_str("missing target"),
            ConflictReason::WrongNodeType => f.write_str("wrong node type"),
        }
    }
}

/// An operation the node tree refused to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation {op} cannot apply to {target}: {reason}")]
pub struct MergeConflict {
    pub op: Ts,
    pub target: Ts,
    pub reason: ConflictReason,
}

#[derive(Debug, Error)]
pub enum DocError {
    #[error("unsupported value type: {0}")]
    UnsupportedValueType(String),
    #[error("merge conflict: {0}")]
    MergeConflict(#[from] MergeConflict),
    #[error("node not found")]
    NotFound,
    #[error("node is not {expected}")]
    WrongType { expected: &'static str },
    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },
    #[error("value is not a number")]
    NotANumber,
    #[error("patch decode failed: {0}")]
    Decode(#[from] DecodeError),
}
