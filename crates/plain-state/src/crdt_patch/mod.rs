//! Patch protocol: logical clocks, operations, patches and their wire codec.

pub mod clock;
pub mod codec;
pub mod constants;
pub mod operations;
pub mod patch;
pub mod patch_builder;

pub use clock::{Ts, Tss};
pub use operations::{ConValue, Op};
pub use patch::Patch;
pub use patch_builder::PatchBuilder;
