//! Beats: exact quarter-note counting
//!
//! A `Beats` value is a signed, fixed-point count of quarter notes at a
//! resolution of [`Beats::PPQN`] ticks per quarter. All arithmetic is exact;
//! floating-point views exist for display only and must never round-trip.

use serde::{Deserialize, Serialize};

/// Exact quarter-note count (fixed point, [`Beats::PPQN`] ticks per quarter).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Beats {
    ticks: i64,
}

impl Beats {
    /// Ticks per quarter note (MIDI-compatible musical resolution)
    pub const PPQN: i64 = 1920;

    pub const ZERO: Self = Self { ticks: 0 };
    pub const ONE: Self = Self { ticks: Self::PPQN };

    #[inline]
    pub fn from_ticks(ticks: i64) -> Self {
        Self { ticks }
    }

    #[inline]
    pub fn from_beats(beats: i64) -> Self {
        Self {
            ticks: beats * Self::PPQN,
        }
    }

    /// Build from a whole beat count and a tick remainder.
    #[inline]
    pub fn new(beats: i64, ticks: i64) -> Self {
        Self {
            ticks: beats * Self::PPQN + ticks,
        }
    }

    /// Round-to-nearest conversion from a floating quarter count.
    #[inline]
    pub fn from_f64(beats: f64) -> Self {
        Self {
            ticks: (beats * Self::PPQN as f64).round() as i64,
        }
    }

    /// Presentation-only floating view. Never feed this back into exact math.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.ticks as f64 / Self::PPQN as f64
    }

    #[inline]
    pub fn ticks(self) -> i64 {
        self.ticks
    }

    /// Whole-beat component (floor)
    #[inline]
    pub fn get_beats(self) -> i64 {
        self.ticks.div_euclid(Self::PPQN)
    }

    /// Tick remainder, always in `0..PPQN`
    #[inline]
    pub fn get_ticks(self) -> i64 {
        self.ticks.rem_euclid(Self::PPQN)
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.ticks < 0
    }

    /// True when the value sits exactly on a whole quarter note.
    #[inline]
    pub fn is_whole(self) -> bool {
        self.ticks % Self::PPQN == 0
    }

    /// Nearest whole beat
    #[inline]
    pub fn round_to_beat(self) -> Self {
        let beats = (self.ticks as f64 / Self::PPQN as f64).round() as i64;
        Self::from_beats(beats)
    }

    /// Next whole beat at or after this value
    #[inline]
    pub fn round_up_to_beat(self) -> Self {
        Self::from_beats(self.ticks.div_euclid(Self::PPQN) + i64::from(!self.is_whole()))
    }

    /// Previous whole beat at or before this value
    #[inline]
    pub fn round_down_to_beat(self) -> Self {
        Self::from_beats(self.ticks.div_euclid(Self::PPQN))
    }

    #[inline]
    pub fn abs(self) -> Self {
        Self {
            ticks: self.ticks.abs(),
        }
    }
}

impl std::ops::Add for Beats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            ticks: self.ticks + rhs.ticks,
        }
    }
}

impl std::ops::Sub for Beats {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            ticks: self.ticks - rhs.ticks,
        }
    }
}

impl std::ops::Neg for Beats {
    type Output = Self;

    fn neg(self) -> Self {
        Self { ticks: -self.ticks }
    }
}

impl std::ops::AddAssign for Beats {
    fn add_assign(&mut self, rhs: Self) {
        self.ticks += rhs.ticks;
    }
}

impl std::ops::SubAssign for Beats {
    fn sub_assign(&mut self, rhs: Self) {
        self.ticks -= rhs.ticks;
    }
}

impl std::ops::Mul<i64> for Beats {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self {
        Self {
            ticks: self.ticks * rhs,
        }
    }
}

impl std::fmt::Display for Beats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:04}", self.get_beats(), self.get_ticks())
    }
}
