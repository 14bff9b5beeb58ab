//! Reserved sessions and sentinel timestamps.

use super::clock::Ts;

/// Reserved session IDs.
#[allow(non_snake_case)]
pub mod SESSION {
    /// Reserved by the protocol; never used by a replica.
    pub const SYSTEM: u64 = 0;
    /// Smallest session id handed out to randomly created replicas.
    pub const MIN_RANDOM: u64 = 65_536;
}

/// The origin timestamp `(SESSION::SYSTEM, 0)`.
///
/// Identifies the document root map on every replica and doubles as the
/// "before the first element" anchor for sequence inserts.
pub const ORIGIN: Ts = Ts::new(SESSION::SYSTEM, 0);

/// Largest logical time a decoded patch may use. Matches the integer range
/// JSON peers can represent exactly, and keeps local clocks far from `u64`
/// overflow after observing remote IDs.
pub const MAX_TIME: u64 = (1 << 53) - 1;
