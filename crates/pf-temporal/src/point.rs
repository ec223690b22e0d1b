//! Point: one instant, three synced representations
//!
//! A `Point` pins together a superclock position, a quarter-note position
//! and a BBT position that all describe the same instant. The three fields
//! are only ever updated wholesale; partial updates would break the sync
//! invariant. Equality therefore tests superclock alone.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use pf_core::{superclock_to_samples, BbtTime, Beats, Superclock};

/// An instant on the timeline in all three coupled representations
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Point {
    sclock: Superclock,
    beats: Beats,
    bbt: BbtTime,
}

impl Point {
    pub fn new(sclock: Superclock, beats: Beats, bbt: BbtTime) -> Self {
        Self { sclock, beats, bbt }
    }

    #[inline]
    pub fn sclock(&self) -> Superclock {
        self.sclock
    }

    #[inline]
    pub fn beats(&self) -> Beats {
        self.beats
    }

    #[inline]
    pub fn bbt(&self) -> BbtTime {
        self.bbt
    }

    /// Replace all three representations at once.
    pub fn set(&mut self, sclock: Superclock, beats: Beats, bbt: BbtTime) {
        self.sclock = sclock;
        self.beats = beats;
        self.bbt = bbt;
    }

    /// Audio sample position at the given rate.
    #[inline]
    pub fn sample(&self, sample_rate: u32) -> i64 {
        superclock_to_samples(self.sclock, sample_rate)
    }

    /// Rewrite the superclock value only. Used by the map when the sample
    /// rate changes and sample positions are being preserved; every caller
    /// must immediately re-derive the grid.
    pub(crate) fn reset_sclock_for_rate_change(&mut self, sclock: Superclock) {
        self.sclock = sclock;
    }

    /// Ordering by superclock position
    pub fn cmp_sclock(a: &Point, b: &Point) -> Ordering {
        a.sclock.cmp(&b.sclock)
    }

    /// Ordering by quarter-note position
    pub fn cmp_beats(a: &Point, b: &Point) -> Ordering {
        a.beats.cmp(&b.beats)
    }

    /// Ordering by BBT position
    pub fn cmp_bbt(a: &Point, b: &Point) -> Ordering {
        a.bbt.cmp(&b.bbt)
    }
}

// all time members are synced at all times, so testing one suffices
impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.sclock == other.sclock
    }
}

impl Eq for Point {}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sc {} qn {} bbt {}", self.sclock, self.beats, self.bbt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_by_sclock() {
        let a = Point::new(100, Beats::from_beats(1), BbtTime::new(1, 2, 0));
        let b = Point::new(100, Beats::from_beats(2), BbtTime::new(1, 3, 0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_wholesale_set() {
        let mut p = Point::default();
        p.set(200, Beats::from_beats(4), BbtTime::new(2, 1, 0));
        assert_eq!(p.sclock(), 200);
        assert_eq!(p.beats(), Beats::from_beats(4));
        assert_eq!(p.bbt(), BbtTime::new(2, 1, 0));
    }

    #[test]
    fn test_sample_position() {
        use pf_core::SUPERCLOCK_TICKS_PER_SECOND;
        let p = Point::new(SUPERCLOCK_TICKS_PER_SECOND, Beats::ZERO, BbtTime::START);
        assert_eq!(p.sample(48000), 48000);
    }
}
