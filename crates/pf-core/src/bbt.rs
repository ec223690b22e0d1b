//! BBT: bars|beats|ticks musical positions
//!
//! A `BbtTime` is a position expressed against the active meter: bar number,
//! beat within the bar, tick within the beat. Bars and beats are 1-based,
//! ticks 0-based. Tick resolution is [`crate::Beats::PPQN`] per meter
//! subdivision.
//!
//! `BbtTime` carries no meter of its own; converting to or from linear time
//! always requires the meter in effect.

use serde::{Deserialize, Serialize};

/// Musical position: bar | beat | tick (1-based bar and beat)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BbtTime {
    pub bar: i32,
    pub beat: i32,
    pub tick: i32,
}

impl Default for BbtTime {
    fn default() -> Self {
        Self::START
    }
}

impl BbtTime {
    /// Start of the timeline: bar 1, beat 1, tick 0
    pub const START: Self = Self {
        bar: 1,
        beat: 1,
        tick: 0,
    };

    pub fn new(bar: i32, beat: i32, tick: i32) -> Self {
        Self { bar, beat, tick }
    }

    /// True at the first beat of a bar with no tick offset.
    #[inline]
    pub fn is_bar_start(&self) -> bool {
        self.beat == 1 && self.tick == 0
    }

    /// True when the position sits exactly on a beat boundary.
    #[inline]
    pub fn is_beat_start(&self) -> bool {
        self.tick == 0
    }

    /// Display format "bar|beat|tick"
    pub fn to_display_string(&self) -> String {
        format!("{}|{}|{:04}", self.bar, self.beat, self.tick)
    }

    /// Parse from display string
    pub fn from_display_string(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('|').collect();
        if parts.len() != 3 {
            return None;
        }

        let bar = parts[0].parse::<i32>().ok()?;
        let beat = parts[1].parse::<i32>().ok()?;
        let tick = parts[2].parse::<i32>().ok()?;

        Some(Self { bar, beat, tick })
    }
}

impl std::fmt::Display for BbtTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

/// A signed bar/beat/tick delta, applied through a meter's carry rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BbtOffset {
    pub bars: i32,
    pub beats: i32,
    pub ticks: i32,
}

impl BbtOffset {
    pub const ZERO: Self = Self {
        bars: 0,
        beats: 0,
        ticks: 0,
    };

    pub fn new(bars: i32, beats: i32, ticks: i32) -> Self {
        Self { bars, beats, ticks }
    }
}

impl std::fmt::Display for BbtOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:+}|{:+}|{:+}", self.bars, self.beats, self.ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        let a = BbtTime::new(2, 1, 0);
        let b = BbtTime::new(2, 3, 0);
        let c = BbtTime::new(3, 1, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_bar_and_beat_start() {
        assert!(BbtTime::START.is_bar_start());
        assert!(BbtTime::new(5, 2, 0).is_beat_start());
        assert!(!BbtTime::new(5, 2, 3).is_beat_start());
        assert!(!BbtTime::new(5, 2, 0).is_bar_start());
    }

    #[test]
    fn test_display_round_trip() {
        let bbt = BbtTime::new(17, 3, 480);
        assert_eq!(bbt.to_display_string(), "17|3|0480");

        let parsed = BbtTime::from_display_string("17|3|0480").unwrap();
        assert_eq!(parsed, bbt);
    }
}
