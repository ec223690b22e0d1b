//! Tempo and Meter value types
//!
//! Pure values with no map-wide side effects:
//! - `Tempo`: playback speed between two rate endpoints (constant or ramped)
//! - `Meter`: time signature with bar/beat arithmetic
//!
//! Rates are stored as superclocks per note type (a period, not a
//! frequency). BPM views are computed for display and never stored.

use serde::{Deserialize, Serialize};

use pf_core::{BbtOffset, BbtTime, Beats, Superclock, SUPERCLOCK_TICKS_PER_SECOND};

/// Tempo progression between this point and the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TempoKind {
    #[default]
    Constant,
    Ramped,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPO
// ═══════════════════════════════════════════════════════════════════════════════

/// The speed at which musical time progresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tempo {
    /// Superclocks per note type at the start of this tempo's span
    superclocks_per_note_type: Superclock,
    /// Superclocks per note type approaching the next tempo
    end_superclocks_per_note_type: Superclock,
    /// Note type the rate is expressed in (4 = quarter, 8 = eighth)
    note_type: u8,
    /// Inactive tempos are retained but ignored by the grid
    active: bool,
    /// Tempo follows its meter point when the meter moves
    locked_to_meter: bool,
    /// Ramp end is clamped to the next tempo's start rate
    clamped: bool,
    /// Constant or ramped
    kind: TempoKind,
}

impl Tempo {
    /// Constant tempo from note types per minute.
    pub fn new(npm: f64, note_type: u8) -> Self {
        let sc = Self::npm_to_superclocks(npm);
        Self {
            superclocks_per_note_type: sc,
            end_superclocks_per_note_type: sc,
            note_type,
            active: true,
            locked_to_meter: false,
            clamped: false,
            kind: TempoKind::Constant,
        }
    }

    /// Tempo with distinct start and end rates. Ramped iff they differ.
    pub fn with_ramp(npm: f64, end_npm: f64, note_type: u8) -> Self {
        let sc = Self::npm_to_superclocks(npm);
        let end_sc = Self::npm_to_superclocks(end_npm);
        Self {
            superclocks_per_note_type: sc,
            end_superclocks_per_note_type: end_sc,
            note_type,
            active: true,
            locked_to_meter: false,
            clamped: false,
            kind: if sc != end_sc {
                TempoKind::Ramped
            } else {
                TempoKind::Constant
            },
        }
    }

    #[inline]
    fn npm_to_superclocks(npm: f64) -> Superclock {
        ((SUPERCLOCK_TICKS_PER_SECOND as f64 / npm) * 60.0).round() as Superclock
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Presentation views (computed, never stored)
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn note_types_per_minute(&self) -> f64 {
        (SUPERCLOCK_TICKS_PER_SECOND as f64 * 60.0) / self.superclocks_per_note_type as f64
    }

    pub fn end_note_types_per_minute(&self) -> f64 {
        (SUPERCLOCK_TICKS_PER_SECOND as f64 * 60.0) / self.end_superclocks_per_note_type as f64
    }

    pub fn quarter_notes_per_minute(&self) -> f64 {
        (SUPERCLOCK_TICKS_PER_SECOND as f64 * 60.0 * 4.0)
            / (self.note_type as f64 * self.superclocks_per_note_type as f64)
    }

    pub fn samples_per_note_type(&self, sample_rate: u32) -> f64 {
        self.superclocks_per_note_type as f64 * sample_rate as f64
            / SUPERCLOCK_TICKS_PER_SECOND as f64
    }

    pub fn samples_per_quarter_note(&self, sample_rate: u32) -> f64 {
        self.superclocks_per_quarter_note() as f64 * sample_rate as f64
            / SUPERCLOCK_TICKS_PER_SECOND as f64
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Primary data
    // ─────────────────────────────────────────────────────────────────────────────

    #[inline]
    pub fn note_type(&self) -> u8 {
        self.note_type
    }

    #[inline]
    pub fn superclocks_per_note_type(&self) -> Superclock {
        self.superclocks_per_note_type
    }

    #[inline]
    pub fn end_superclocks_per_note_type(&self) -> Superclock {
        self.end_superclocks_per_note_type
    }

    /// Rate rescaled to a different note type.
    #[inline]
    pub fn superclocks_per_note_type_of(&self, note_type: u8) -> Superclock {
        (self.superclocks_per_note_type * self.note_type as Superclock) / note_type as Superclock
    }

    #[inline]
    pub fn superclocks_per_quarter_note(&self) -> Superclock {
        self.superclocks_per_note_type_of(4)
    }

    #[inline]
    pub fn end_superclocks_per_quarter_note(&self) -> Superclock {
        (self.end_superclocks_per_note_type * self.note_type as Superclock) / 4
    }

    /// Superclocks per beat tick (PPQN subdivision of a quarter)
    #[inline]
    pub fn superclocks_per_ppqn(&self) -> Superclock {
        self.superclocks_per_quarter_note() / Beats::PPQN
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Flags
    // ─────────────────────────────────────────────────────────────────────────────

    #[inline]
    pub fn active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, yn: bool) {
        self.active = yn;
    }

    #[inline]
    pub fn locked_to_meter(&self) -> bool {
        self.locked_to_meter
    }

    pub fn set_locked_to_meter(&mut self, yn: bool) {
        self.locked_to_meter = yn;
    }

    #[inline]
    pub fn clamped(&self) -> bool {
        self.clamped
    }

    pub fn set_clamped(&mut self, yn: bool) {
        self.clamped = yn;
    }

    #[inline]
    pub fn kind(&self) -> TempoKind {
        self.kind
    }

    #[inline]
    pub fn ramped(&self) -> bool {
        self.kind == TempoKind::Ramped
    }

    /// Switch between ramped and constant. Dropping the ramp collapses the
    /// end rate onto the start rate.
    pub fn set_ramped(&mut self, yn: bool) {
        if yn {
            self.kind = TempoKind::Ramped;
        } else {
            self.kind = TempoKind::Constant;
            self.end_superclocks_per_note_type = self.superclocks_per_note_type;
        }
    }

    pub fn set_note_types_per_minute(&mut self, npm: f64) {
        self.superclocks_per_note_type = Self::npm_to_superclocks(npm);
        if !self.ramped() {
            self.end_superclocks_per_note_type = self.superclocks_per_note_type;
        }
    }

    pub fn set_end_note_types_per_minute(&mut self, npm: f64) {
        self.end_superclocks_per_note_type = Self::npm_to_superclocks(npm);
        self.kind = if self.end_superclocks_per_note_type != self.superclocks_per_note_type {
            TempoKind::Ramped
        } else {
            TempoKind::Constant
        };
    }
}

impl std::fmt::Display for Tempo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ramped() {
            write!(
                f,
                "{:.2}..{:.2} npm (note type {})",
                self.note_types_per_minute(),
                self.end_note_types_per_minute(),
                self.note_type
            )
        } else {
            write!(
                f,
                "{:.2} npm (note type {})",
                self.note_types_per_minute(),
                self.note_type
            )
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// METER
// ═══════════════════════════════════════════════════════════════════════════════

/// Time signature: subdivisions per bar, note value of one subdivision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    /// How many subdivisions make up a bar
    divisions_per_bar: u8,
    /// The note type of one subdivision (4 = quarter, 8 = eighth)
    note_value: u8,
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            divisions_per_bar: 4,
            note_value: 4,
        }
    }
}

impl Meter {
    pub fn new(divisions_per_bar: u8, note_value: u8) -> Self {
        Self {
            divisions_per_bar,
            note_value,
        }
    }

    #[inline]
    pub fn divisions_per_bar(&self) -> u8 {
        self.divisions_per_bar
    }

    #[inline]
    pub fn note_value(&self) -> u8 {
        self.note_value
    }

    /// Convert a bar/beat/tick *offset* (not an absolute position) to
    /// quarter notes. Offsets are meter-dependent: beat width is
    /// `4 / note_value` quarters.
    pub fn to_quarters(&self, offset: BbtOffset) -> Beats {
        // total offset in meter-beat ticks, then rescale to quarter ticks
        let division_ticks = (offset.bars as i64 * self.divisions_per_bar as i64
            + offset.beats as i64)
            * Beats::PPQN
            + offset.ticks as i64;
        let num = division_ticks as i128 * 4;
        let den = self.note_value as i128;
        let half = if num >= 0 { den / 2 } else { -(den / 2) };
        Beats::from_ticks(((num + half) / den) as i64)
    }

    /// Quarter notes in one bar of this meter.
    #[inline]
    pub fn quarters_per_bar(&self) -> Beats {
        self.to_quarters(BbtOffset::new(1, 0, 0))
    }

    /// Offset a BBT position forward, carrying ticks into beats and beats
    /// into bars.
    pub fn bbt_add(&self, bbt: BbtTime, offset: BbtOffset) -> BbtTime {
        let dpb = self.divisions_per_bar as i64;
        let ppqn = Beats::PPQN;

        // flatten to zero-based total ticks within the bar/beat lattice
        let total = ((bbt.bar as i64 - 1) * dpb + (bbt.beat as i64 - 1)) * ppqn
            + bbt.tick as i64
            + ((offset.bars as i64 * dpb + offset.beats as i64) * ppqn + offset.ticks as i64);

        let beats_total = total.div_euclid(ppqn);
        let tick = total.rem_euclid(ppqn);
        let bar = beats_total.div_euclid(dpb);
        let beat = beats_total.rem_euclid(dpb);

        BbtTime::new((bar + 1) as i32, (beat + 1) as i32, tick as i32)
    }

    /// Offset a BBT position backward.
    pub fn bbt_subtract(&self, bbt: BbtTime, offset: BbtOffset) -> BbtTime {
        self.bbt_add(
            bbt,
            BbtOffset::new(-offset.bars, -offset.beats, -offset.ticks),
        )
    }

    /// The offset from `b` to `a` (i.e. `a - b`) under this meter's carry
    /// rules. Normalized so beats and ticks are non-negative.
    pub fn bbt_delta(&self, a: BbtTime, b: BbtTime) -> BbtOffset {
        let dpb = self.divisions_per_bar as i64;
        let ppqn = Beats::PPQN;

        let flat = |t: BbtTime| {
            ((t.bar as i64 - 1) * dpb + (t.beat as i64 - 1)) * ppqn + t.tick as i64
        };

        let delta = flat(a) - flat(b);
        let beats_total = delta.div_euclid(ppqn);
        let ticks = delta.rem_euclid(ppqn);
        let bars = beats_total.div_euclid(dpb);
        let beats = beats_total.rem_euclid(dpb);

        BbtOffset::new(bars as i32, beats as i32, ticks as i32)
    }

    /// Nearest bar start (past the midpoint of a bar rounds up).
    pub fn round_to_bar(&self, bbt: BbtTime) -> BbtTime {
        if bbt.is_bar_start() {
            return bbt;
        }
        if bbt.beat as i64 > self.divisions_per_bar as i64 / 2 {
            BbtTime::new(bbt.bar + 1, 1, 0)
        } else {
            BbtTime::new(bbt.bar, 1, 0)
        }
    }

    /// Next beat boundary at or after the position.
    pub fn round_up_to_beat(&self, bbt: BbtTime) -> BbtTime {
        if bbt.tick == 0 {
            return bbt;
        }
        self.bbt_add(BbtTime::new(bbt.bar, bbt.beat, 0), BbtOffset::new(0, 1, 0))
    }

    /// Nearest beat boundary.
    pub fn round_to_beat(&self, bbt: BbtTime) -> BbtTime {
        if (bbt.tick as i64) >= Beats::PPQN / 2 {
            self.round_up_to_beat(bbt)
        } else {
            BbtTime::new(bbt.bar, bbt.beat, 0)
        }
    }
}

impl std::fmt::Display for Meter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.divisions_per_bar, self.note_value)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
