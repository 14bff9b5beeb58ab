//! Verbose JSON codec for patches.
//!
//! The verbose format represents each operation as a JSON object with named
//! fields and a string `op` discriminator:
//!
//! ```json
//! {"id": [70001, 5], "ops": [
//!   {"op": "new_con", "value": "apple"},
//!   {"op": "ins_obj", "obj": [0, 0], "value": [["name", [70001, 5]]]}
//! ]}
//! ```
//!
//! Operation IDs are not written; the decoder re-derives them by replaying
//! the operations through a [`PatchBuilder`](super::patch_builder::PatchBuilder)
//! seeded with the patch id.

mod decode;
mod encode;

pub use decode::decode;
pub use encode::encode;

/// Error type for verbose decoding failures.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload is not a patch object")]
    InvalidPatch,
    #[error("invalid timestamp: {0}")]
    InvalidId(String),
    #[error("unknown operation: {0}")]
    UnknownOp(String),
    #[error("malformed {op} operation: {reason}")]
    InvalidOp { op: &'static str, reason: String },
}
