//! Logical time.
//!
//! Every operation is stamped with a [`Ts`] `(sid, time)`: the session ID of
//! the replica that created it and a Lamport time. Timestamps order by time
//! first and session second, which gives every replica the same total order
//! without looking at a wall clock.
//!
//! A replica's [`ClockVector`] observes every applied operation, so the next
//! timestamp it hands out is ahead of everything it has seen.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use super::constants::SESSION;

/// An operation ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ts {
    pub sid: u64,
    pub time: u64,
}

impl Ts {
    pub const fn new(sid: u64, time: u64) -> Self {
        Self { sid, time }
    }
}

impl Ord for Ts {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then(self.sid.cmp(&other.sid))
    }
}

impl PartialOrd for Ts {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Short form used in logs: `.time` for system IDs, otherwise `sid.time`
/// with long session IDs cut to their last four digits.
impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sid == SESSION::SYSTEM {
            return write!(f, ".{}", self.time);
        }
        if self.sid >= 10_000 {
            write!(f, "..{:04}.{}", self.sid % 10_000, self.time)
        } else {
            write!(f, "{}.{}", self.sid, self.time)
        }
    }
}

/// `span` consecutive IDs of one session, starting at `time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tss {
    pub sid: u64,
    pub time: u64,
    pub span: u64,
}

impl Tss {
    pub const fn new(sid: u64, time: u64, span: u64) -> Self {
        Self { sid, time, span }
    }

    /// First ID of the span.
    pub fn ts(&self) -> Ts {
        Ts::new(self.sid, self.time)
    }
}

pub fn ts(sid: u64, time: u64) -> Ts {
    Ts::new(sid, time)
}

pub fn tss(sid: u64, time: u64, span: u64) -> Tss {
    Tss::new(sid, time, span)
}

/// `1` if `a` is newer than `b`, `-1` if older, `0` if equal.
pub fn compare(a: Ts, b: Ts) -> i8 {
    match a.cmp(&b) {
        Ordering::Greater => 1,
        Ordering::Less => -1,
        Ordering::Equal => 0,
    }
}

/// Whether the span of `span` IDs starting at `start` covers `id`.
pub fn contains_id(start: Ts, span: u64, id: Ts) -> bool {
    start.sid == id.sid && (start.time..start.time.saturating_add(span)).contains(&id.time)
}

pub fn print_ts(id: Ts) -> String {
    id.to_string()
}

/// Hands out consecutive IDs for one session.
#[derive(Debug, Clone)]
pub struct LogicalClock {
    pub sid: u64,
    /// Time of the next ID.
    pub time: u64,
}

impl LogicalClock {
    pub fn new(sid: u64, time: u64) -> Self {
        Self { sid, time }
    }

    /// Reserve `cycles` IDs and return the first.
    pub fn tick(&mut self, cycles: u64) -> Ts {
        let id = Ts::new(self.sid, self.time);
        self.time += cycles;
        id
    }
}

/// A replica's own clock plus the newest time observed from each peer.
#[derive(Debug, Clone)]
pub struct ClockVector {
    pub sid: u64,
    /// Time of the next local ID.
    pub time: u64,
    pub peers: BTreeMap<u64, u64>,
}

impl ClockVector {
    pub fn new(sid: u64, time: u64) -> Self {
        Self {
            sid,
            time,
            peers: BTreeMap::new(),
        }
    }

    /// Record that the IDs `[id, id + span)` exist. Observing the same
    /// range again changes nothing.
    pub fn observe(&mut self, id: Ts, span: u64) {
        let last = id.time.saturating_add(span.saturating_sub(1));
        if id.sid != self.sid && id.sid != SESSION::SYSTEM {
            let seen = self.peers.entry(id.sid).or_insert(last);
            *seen = (*seen).max(last);
        }
        self.time = self.time.max(last.saturating_add(1));
    }
}

impl fmt::Display for ClockVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Ts::new(self.sid, self.time))?;
        for (sid, time) in &self.peers {
            write!(f, " {}", Ts::new(*sid, *time))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_time_wins_then_higher_session() {
        assert_eq!(compare(ts(1, 10), ts(2, 9)), 1);
        assert_eq!(compare(ts(1, 10), ts(2, 10)), -1);
        assert_eq!(compare(ts(3, 4), ts(3, 4)), 0);
        assert!(ts(9, 1) < ts(1, 2));
    }

    #[test]
    fn span_membership() {
        assert!(contains_id(ts(1, 5), 3, ts(1, 5)));
        assert!(contains_id(ts(1, 5), 3, ts(1, 7)));
        assert!(!contains_id(ts(1, 5), 3, ts(1, 8)));
        assert!(!contains_id(ts(1, 5), 3, ts(2, 6)));
    }

    #[test]
    fn tick_reserves_ranges() {
        let mut clock = LogicalClock::new(42, 100);
        assert_eq!(clock.tick(1), ts(42, 100));
        assert_eq!(clock.tick(3), ts(42, 101));
        assert_eq!(clock.time, 104);
    }

    #[test]
    fn observe_moves_past_remote_ids() {
        let mut cv = ClockVector::new(1, 1);
        cv.observe(ts(7, 10), 4);
        assert_eq!(cv.time, 14);
        assert_eq!(cv.peers.get(&7), Some(&13));

        cv.observe(ts(7, 10), 4);
        cv.observe(ts(7, 2), 1);
        assert_eq!(cv.time, 14);
        assert_eq!(cv.peers.get(&7), Some(&13));

        cv.observe(ts(SESSION::SYSTEM, 0), 1);
        assert!(!cv.peers.contains_key(&SESSION::SYSTEM));
        assert_eq!(cv.to_string(), "1.14 7.13");
    }

    #[test]
    fn observe_saturates_at_the_top_of_the_range() {
        let mut cv = ClockVector::new(1, 1);
        cv.observe(ts(7, u64::MAX - 1), 5);
        assert_eq!(cv.time, u64::MAX);
        assert_eq!(cv.peers.get(&7), Some(&u64::MAX));
        assert!(contains_id(ts(7, u64::MAX - 1), 5, ts(7, u64::MAX - 1)));
    }

    #[test]
    fn display_forms() {
        assert_eq!(ts(SESSION::SYSTEM, 0).to_string(), ".0");
        assert_eq!(ts(123_456_789, 1).to_string(), "..6789.1");
        assert_eq!(ts(100_002, 3).to_string(), "..0002.3");
        assert_eq!(print_ts(ts(42, 7)), "42.7");
    }
}
