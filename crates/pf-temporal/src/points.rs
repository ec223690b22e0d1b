//! Explicit map points: tempo, meter and bar-renumber markers
//!
//! These are the user-placed entities a tempo map owns. Each composes a
//! value (`Tempo` or `Meter`) with a `Point`; the diamond the original
//! design ran into is avoided by containment and delegation.
//!
//! `TempoPoint` additionally carries the two ramp coefficients. A ramp's
//! shape depends on both of its endpoints and the span between them, so the
//! coefficients are recomputed by the map whenever this tempo, its position,
//! or the following tempo changes. Recomputation happens in the rebuild
//! coefficient pass, never eagerly.

use serde::{Deserialize, Serialize};

use pf_core::{BbtOffset, BbtTime, Beats, Superclock};

use crate::point::Point;
use crate::tempo::{Meter, Tempo};

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPO POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// A `Tempo` bound to a timeline position, with ramp coefficients
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TempoPoint {
    tempo: Tempo,
    point: Point,
    /// Exponential coefficient over quarter-note offsets
    #[serde(skip)]
    c_per_quarter: f64,
    /// Exponential coefficient over superclock offsets
    #[serde(skip)]
    c_per_superclock: f64,
}

impl TempoPoint {
    pub fn new(tempo: Tempo, point: Point) -> Self {
        Self {
            tempo,
            point,
            c_per_quarter: 0.0,
            c_per_superclock: 0.0,
        }
    }

    #[inline]
    pub fn tempo(&self) -> &Tempo {
        &self.tempo
    }

    #[inline]
    pub fn point(&self) -> &Point {
        &self.point
    }

    #[inline]
    pub fn sclock(&self) -> Superclock {
        self.point.sclock()
    }

    #[inline]
    pub fn beats(&self) -> Beats {
        self.point.beats()
    }

    #[inline]
    pub fn bbt(&self) -> BbtTime {
        self.point.bbt()
    }

    #[inline]
    pub fn c_per_quarter(&self) -> f64 {
        self.c_per_quarter
    }

    #[inline]
    pub fn c_per_superclock(&self) -> f64 {
        self.c_per_superclock
    }

    /// Replace the tempo component without moving the point. The caller
    /// (the map) is responsible for dirtying the grid.
    pub(crate) fn set_tempo(&mut self, tempo: Tempo) {
        self.tempo = tempo;
        self.c_per_quarter = 0.0;
        self.c_per_superclock = 0.0;
    }

    pub(crate) fn point_mut(&mut self) -> &mut Point {
        &mut self.point
    }

    /// Solve the beat-domain ramp coefficient so the instantaneous rate
    /// runs continuously from this tempo's rate to `end_scpqn` (superclocks
    /// per quarter) over `duration` quarter notes. Constant tempo is the
    /// degenerate case `c = 0`.
    pub fn compute_c_quarters(&mut self, end_scpqn: Superclock, duration: Beats) {
        let start = self.tempo.superclocks_per_quarter_note();
        if !self.tempo.ramped() || end_scpqn == start || duration <= Beats::ZERO {
            self.c_per_quarter = 0.0;
            return;
        }
        self.c_per_quarter = (end_scpqn as f64 / start as f64).ln() / duration.to_f64();
    }

    /// Superclock-domain companion of [`compute_c_quarters`]: same rate
    /// endpoints, span expressed in superclocks.
    ///
    /// [`compute_c_quarters`]: TempoPoint::compute_c_quarters
    pub fn compute_c_superclock(&mut self, end_scpqn: Superclock, duration: Superclock) {
        let start = self.tempo.superclocks_per_quarter_note();
        if !self.tempo.ramped() || end_scpqn == start || duration <= 0 {
            self.c_per_superclock = 0.0;
            return;
        }
        self.c_per_superclock = (end_scpqn as f64 / start as f64).ln() / duration as f64;
    }

    /// Superclock position of a quarter-note position governed by this
    /// tempo.
    ///
    /// Ramped: `Δsc = P₀ · (e^(c·Δqn) − 1) / c`, evaluated with expm1 so the
    /// result stays stable as `c → 0`. Constant: exact linear integer math.
    pub fn superclock_at(&self, qn: Beats) -> Superclock {
        let scpqn = self.tempo.superclocks_per_quarter_note();
        let dq = qn - self.point.beats();

        if self.c_per_quarter == 0.0 {
            // exact: Δsc = scpqn * Δticks / PPQN
            let num = scpqn as i128 * dq.ticks() as i128;
            let den = Beats::PPQN as i128;
            let half = if num >= 0 { den / 2 } else { -(den / 2) };
            return self.point.sclock() + ((num + half) / den) as Superclock;
        }

        let delta =
            scpqn as f64 * f64::exp_m1(self.c_per_quarter * dq.to_f64()) / self.c_per_quarter;
        self.point.sclock() + delta.round() as Superclock
    }

    /// Quarter-note position of a superclock position governed by this
    /// tempo: the algebraic inverse of [`superclock_at`].
    ///
    /// [`superclock_at`]: TempoPoint::superclock_at
    pub fn quarters_at(&self, sc: Superclock) -> Beats {
        let scpqn = self.tempo.superclocks_per_quarter_note();
        let dsc = sc - self.point.sclock();

        if self.c_per_quarter == 0.0 {
            let num = dsc as i128 * Beats::PPQN as i128;
            let den = scpqn as i128;
            let half = if num >= 0 { den / 2 } else { -(den / 2) };
            return self.point.beats() + Beats::from_ticks(((num + half) / den) as i64);
        }

        let dq = f64::ln_1p(self.c_per_quarter * dsc as f64 / scpqn as f64) / self.c_per_quarter;
        self.point.beats() + Beats::from_f64(dq)
    }

    /// Instantaneous superclocks-per-quarter at a superclock position
    /// within this tempo's span.
    pub fn superclocks_per_quarter_note_at(&self, sc: Superclock) -> Superclock {
        let scpqn = self.tempo.superclocks_per_quarter_note();
        if self.c_per_superclock == 0.0 {
            return scpqn;
        }
        let dsc = (sc - self.point.sclock()) as f64;
        (scpqn as f64 * f64::exp(self.c_per_superclock * dsc)).round() as Superclock
    }
}

impl PartialEq for TempoPoint {
    fn eq(&self, other: &Self) -> bool {
        self.tempo == other.tempo && self.point == other.point
    }
}

impl std::fmt::Display for TempoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.tempo, self.point)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// METER POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// A `Meter` bound to a timeline position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterPoint {
    meter: Meter,
    point: Point,
}

impl MeterPoint {
    pub fn new(meter: Meter, point: Point) -> Self {
        Self { meter, point }
    }

    #[inline]
    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    #[inline]
    pub fn point(&self) -> &Point {
        &self.point
    }

    #[inline]
    pub fn sclock(&self) -> Superclock {
        self.point.sclock()
    }

    #[inline]
    pub fn beats(&self) -> Beats {
        self.point.beats()
    }

    #[inline]
    pub fn bbt(&self) -> BbtTime {
        self.point.bbt()
    }

    pub(crate) fn set_meter(&mut self, meter: Meter) {
        self.meter = meter;
    }

    pub(crate) fn point_mut(&mut self) -> &mut Point {
        &mut self.point
    }

    /// Quarter-note position of a BBT position, using this meter point as
    /// the anchor.
    pub fn quarters_at(&self, bbt: BbtTime) -> Beats {
        let offset = self.meter.bbt_delta(bbt, self.point.bbt());
        self.point.beats() + self.meter.to_quarters(offset)
    }

    /// BBT position of a quarter-note position, anchored at this meter
    /// point.
    pub fn bbt_at(&self, beats: Beats) -> BbtTime {
        let dq = beats - self.point.beats();

        // quarter ticks -> meter-division ticks
        let num = dq.ticks() as i128 * self.meter.note_value() as i128;
        let half = if num >= 0 { 2 } else { -2 };
        let division_ticks = ((num + half) / 4) as i64;

        let beats_c = division_ticks.div_euclid(Beats::PPQN);
        let ticks_c = division_ticks.rem_euclid(Beats::PPQN);

        self.meter.bbt_add(
            self.point.bbt(),
            BbtOffset::new(0, beats_c as i32, ticks_c as i32),
        )
    }
}

impl std::fmt::Display for MeterPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.meter, self.point)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MUSIC TIME POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// A bar-renumbering marker: a point whose BBT component has been
/// explicitly overridden by the user. From here on, bar/beat numbering
/// restarts from the forced value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MusicTimePoint {
    point: Point,
}

impl MusicTimePoint {
    /// Take an existing consistent point and overwrite its BBT label.
    pub fn new(bbt: BbtTime, point: Point) -> Self {
        let mut point = point;
        point.set(point.sclock(), point.beats(), bbt);
        Self { point }
    }

    #[inline]
    pub fn point(&self) -> &Point {
        &self.point
    }

    #[inline]
    pub fn sclock(&self) -> Superclock {
        self.point.sclock()
    }

    #[inline]
    pub fn beats(&self) -> Beats {
        self.point.beats()
    }

    #[inline]
    pub fn bbt(&self) -> BbtTime {
        self.point.bbt()
    }

    pub(crate) fn point_mut(&mut self) -> &mut Point {
        &mut self.point
    }
}

impl std::fmt::Display for MusicTimePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bartime @ {}", self.point)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tempo_point(npm: f64) -> TempoPoint {
        TempoPoint::new(
            Tempo::new(npm, 4),
            Point::new(0, Beats::ZERO, BbtTime::START),
        )
    }

    #[test]
    fn test_constant_tempo_is_linear() {
        let tp = tempo_point(120.0);
        let one = tp.superclock_at(Beats::from_beats(1));
        let four = tp.superclock_at(Beats::from_beats(4));
        assert_eq!(four, one * 4);

        // 120 qpm: half a second per quarter
        assert_eq!(one, pf_core::SUPERCLOCK_TICKS_PER_SECOND / 2);
    }

    #[test]
    fn test_constant_tempo_round_trip() {
        let tp = tempo_point(97.3);
        for beat in [0i64, 1, 2, 7, 100, 1000] {
            let qn = Beats::from_beats(beat);
            let sc = tp.superclock_at(qn);
            assert_eq!(tp.quarters_at(sc), qn);
        }
    }

    #[test]
    fn test_ramp_coefficient_connects_endpoints() {
        let mut tp = TempoPoint::new(
            Tempo::with_ramp(120.0, 240.0, 4),
            Point::new(0, Beats::ZERO, BbtTime::START),
        );
        let end_scpqn = Tempo::new(240.0, 4).superclocks_per_quarter_note();
        let duration = Beats::from_beats(8);
        tp.compute_c_quarters(end_scpqn, duration);

        let span_sc = tp.superclock_at(Beats::from_beats(8));
        tp.compute_c_superclock(end_scpqn, span_sc);

        // instantaneous rate approaching the boundary equals the target
        let at_end = tp.superclocks_per_quarter_note_at(span_sc);
        assert_relative_eq!(at_end as f64, end_scpqn as f64, max_relative = 1e-6);
    }

    #[test]
    fn test_ramp_round_trip() {
        let mut tp = TempoPoint::new(
            Tempo::with_ramp(120.0, 180.0, 4),
            Point::new(0, Beats::ZERO, BbtTime::START),
        );
        let end_scpqn = Tempo::new(180.0, 4).superclocks_per_quarter_note();
        tp.compute_c_quarters(end_scpqn, Beats::from_beats(16));

        for beat in [0i64, 1, 3, 8, 15] {
            let qn = Beats::from_beats(beat);
            let sc = tp.superclock_at(qn);
            assert_eq!(tp.quarters_at(sc), qn);
        }
    }

    #[test]
    fn test_zero_c_matches_direct_multiplication() {
        // a ramp with equal endpoints must produce identical results to the
        // linear formula
        let mut tp = TempoPoint::new(
            Tempo::with_ramp(132.0, 132.0, 4),
            Point::new(0, Beats::ZERO, BbtTime::START),
        );
        tp.compute_c_quarters(tp.tempo().superclocks_per_quarter_note(), Beats::from_beats(4));
        assert_eq!(tp.c_per_quarter(), 0.0);

        let direct = tempo_point(132.0);
        for beat in [1i64, 2, 9] {
            assert_eq!(
                tp.superclock_at(Beats::from_beats(beat)),
                direct.superclock_at(Beats::from_beats(beat))
            );
        }
    }

    #[test]
    fn test_meter_point_bbt_round_trip() {
        let mp = MeterPoint::new(
            Meter::new(4, 4),
            Point::new(0, Beats::ZERO, BbtTime::START),
        );

        let bbt = mp.bbt_at(Beats::from_beats(5));
        assert_eq!(bbt, BbtTime::new(2, 2, 0));
        assert_eq!(mp.quarters_at(bbt), Beats::from_beats(5));
    }

    #[test]
    fn test_meter_point_non_quarter_note_value() {
        // 6/8 anchored at quarter 0: one bar = 3 quarters
        let mp = MeterPoint::new(
            Meter::new(6, 8),
            Point::new(0, Beats::ZERO, BbtTime::START),
        );
        assert_eq!(mp.bbt_at(Beats::from_beats(3)), BbtTime::new(2, 1, 0));
        assert_eq!(mp.quarters_at(BbtTime::new(2, 1, 0)), Beats::from_beats(3));
    }

    #[test]
    fn test_music_time_point_overrides_bbt() {
        let p = Point::new(1000, Beats::from_beats(16), BbtTime::new(5, 1, 0));
        let mtp = MusicTimePoint::new(BbtTime::new(100, 1, 0), p);
        assert_eq!(mtp.bbt(), BbtTime::new(100, 1, 0));
        assert_eq!(mtp.beats(), Beats::from_beats(16));
        assert_eq!(mtp.sclock(), 1000);
    }
}
