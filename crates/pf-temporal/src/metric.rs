//! TempoMetric: combined tempo + meter computations at one location
//!
//! A metric pairs the nearest-preceding tempo point and meter point so that
//! questions needing both (bar lengths, BBT conversions) are answered in one
//! place instead of replicating the arithmetic at every call site.
//!
//! Metrics are short-lived query results. They hold snapshots of the two
//! points, taken under the map lock; the map's own stored grid refers to its
//! points by index, never by address.

use pf_core::{superclock_to_samples, BbtOffset, BbtTime, Beats, Superclock};

use crate::points::{MeterPoint, TempoPoint};

/// Tempo and meter in effect at a location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoMetric {
    tempo: TempoPoint,
    meter: MeterPoint,
}

impl TempoMetric {
    pub fn new(tempo: TempoPoint, meter: MeterPoint) -> Self {
        Self { tempo, meter }
    }

    #[inline]
    pub fn tempo(&self) -> &TempoPoint {
        &self.tempo
    }

    #[inline]
    pub fn meter(&self) -> &MeterPoint {
        &self.meter
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Tempo-only delegation
    // ─────────────────────────────────────────────────────────────────────────────

    #[inline]
    pub fn superclock_at(&self, qn: Beats) -> Superclock {
        self.tempo.superclock_at(qn)
    }

    #[inline]
    pub fn quarters_at(&self, sc: Superclock) -> Beats {
        self.tempo.quarters_at(sc)
    }

    #[inline]
    pub fn superclocks_per_note_type(&self) -> Superclock {
        self.tempo.tempo().superclocks_per_note_type()
    }

    #[inline]
    pub fn superclocks_per_quarter_note(&self) -> Superclock {
        self.tempo.tempo().superclocks_per_quarter_note()
    }

    #[inline]
    pub fn note_type(&self) -> u8 {
        self.tempo.tempo().note_type()
    }

    /// Instantaneous superclocks-per-quarter at a superclock position (ramp
    /// aware).
    #[inline]
    pub fn superclocks_per_quarter_note_at(&self, sc: Superclock) -> Superclock {
        self.tempo.superclocks_per_quarter_note_at(sc)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Meter-only delegation
    // ─────────────────────────────────────────────────────────────────────────────

    #[inline]
    pub fn divisions_per_bar(&self) -> u8 {
        self.meter.meter().divisions_per_bar()
    }

    #[inline]
    pub fn note_value(&self) -> u8 {
        self.meter.meter().note_value()
    }

    #[inline]
    pub fn bbt_add(&self, bbt: BbtTime, offset: BbtOffset) -> BbtTime {
        self.meter.meter().bbt_add(bbt, offset)
    }

    #[inline]
    pub fn bbt_subtract(&self, bbt: BbtTime, offset: BbtOffset) -> BbtTime {
        self.meter.meter().bbt_subtract(bbt, offset)
    }

    #[inline]
    pub fn round_to_bar(&self, bbt: BbtTime) -> BbtTime {
        self.meter.meter().round_to_bar(bbt)
    }

    #[inline]
    pub fn to_quarters(&self, offset: BbtOffset) -> Beats {
        self.meter.meter().to_quarters(offset)
    }

    #[inline]
    pub fn quarters_at_bbt(&self, bbt: BbtTime) -> Beats {
        self.meter.quarters_at(bbt)
    }

    #[inline]
    pub fn bbt_at(&self, beats: Beats) -> BbtTime {
        self.meter.bbt_at(beats)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Combination formulas (need both tempo and meter)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Superclocks per grid unit: the tempo's note-type rate rescaled to
    /// the meter's note value. Tempo and meter may each be expressed in a
    /// different subdivision (tempo in quarters, meter in eighths, ...), so
    /// the rate has to be scaled by their ratio.
    pub fn superclocks_per_grid(&self) -> Superclock {
        let tempo = self.tempo.tempo();
        let meter = self.meter.meter();
        (tempo.superclocks_per_note_type() as f64 * tempo.note_type() as f64
            / meter.note_value() as f64)
            .round() as Superclock
    }

    /// Superclocks in one bar of the current meter at the current tempo.
    pub fn superclocks_per_bar(&self) -> Superclock {
        self.superclocks_per_grid() * self.meter.meter().divisions_per_bar() as Superclock
    }

    /// Samples in one bar at the given rate.
    pub fn samples_per_bar(&self, sample_rate: u32) -> i64 {
        superclock_to_samples(self.superclocks_per_bar(), sample_rate)
    }

    /// BBT position of a superclock position within this metric's span.
    pub fn bbt_at_superclock(&self, sc: Superclock) -> BbtTime {
        self.meter.bbt_at(self.tempo.quarters_at(sc))
    }

    /// Superclock position of a BBT position within this metric's span.
    pub fn superclock_at_bbt(&self, bbt: BbtTime) -> Superclock {
        self.tempo.superclock_at(self.meter.quarters_at(bbt))
    }
}

impl std::fmt::Display for TempoMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "metric [{}] [{}]", self.tempo, self.meter)
    }
}
