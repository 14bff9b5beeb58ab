//! The CRDT node tree: node types, the RGA sequence and the [`Model`] that
//! applies operations to them.

pub mod model;
pub mod nodes;

pub use model::{random_sid, Model, PatchEffect};
pub use nodes::{ArrNode, ConNode, CrdtNode, NodeIndex, ObjNode};
