//! Tempo Map
//!
//! The top-level container mapping between superclock time, quarter notes,
//! audio samples and BBT positions:
//! - Sparse, user-edited tempo / meter / bar-renumber marker lists
//! - A dense derived grid with one point per quarter note
//! - Lazy rebuild driven by a dirty flag and a generation counter
//! - All query and mutation operations
//!
//! ## Thread Safety Design
//!
//! One reader/writer lock guards both the explicit lists and the derived
//! grid. Queries take the read lock; mutations and any query that finds the
//! grid dirty or too short take the write lock. A query that discovers it
//! needs a rebuild while holding read intent releases the read lock,
//! reacquires as a writer, revalidates, rebuilds, then downgrades back to a
//! reader. A rebuild never calls into any other subsystem.
//!
//! Change events are delivered after the write lock has been released.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use pf_core::{
    samples_to_superclock, superclock_to_samples, BbtOffset, BbtTime, Beats, Position, Superclock,
    TemporalError, TemporalResult, TimeDomain, SUPERCLOCK_TICKS_PER_SECOND,
};

use crate::events::{ChangeObservers, ObserverId};
use crate::metric::TempoMetric;
use crate::point::Point;
use crate::points::{MeterPoint, MusicTimePoint, TempoPoint};
use crate::tempo::{Meter, Tempo};

/// Grid coverage established when a rebuild is not driven by a specific
/// request (roughly one minute of timeline).
const DEFAULT_EXTENT: Superclock = SUPERCLOCK_TICKS_PER_SECOND * 60;

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPO MAP POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// One materialized grid point, one per quarter note.
///
/// Carries the position triple plus *indices* of the governing tempo and
/// meter in the map's explicit lists. Indices stay valid because the grid is
/// discarded and regenerated whenever the explicit lists change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoMapPoint {
    point: Point,
    tempo: usize,
    meter: usize,
    explicit_tempo: bool,
    explicit_meter: bool,
    explicit_bartime: bool,
}

impl TempoMapPoint {
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

    /// Index of the governing tempo in the explicit tempo list
    #[inline]
    pub fn tempo_index(&self) -> usize {
        self.tempo
    }

    /// Index of the governing meter in the explicit meter list
    #[inline]
    pub fn meter_index(&self) -> usize {
        self.meter
    }

    #[inline]
    pub fn is_explicit_tempo(&self) -> bool {
        self.explicit_tempo
    }

    #[inline]
    pub fn is_explicit_meter(&self) -> bool {
        self.explicit_meter
    }

    #[inline]
    pub fn is_explicit_bartime(&self) -> bool {
        self.explicit_bartime
    }

    #[inline]
    pub fn is_explicit(&self) -> bool {
        self.explicit_tempo || self.explicit_meter || self.explicit_bartime
    }
}

/// A grid point resolved for external consumption (display, export): the
/// position triple plus a full metric snapshot.
#[derive(Debug, Clone, Copy)]
pub struct GridPoint {
    pub point: Point,
    pub metric: TempoMetric,
    pub explicit_tempo: bool,
    pub explicit_meter: bool,
    pub explicit_bartime: bool,
}

impl std::fmt::Display for GridPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = if self.explicit_bartime {
            " [bartime]"
        } else if self.explicit_tempo {
            " [tempo]"
        } else if self.explicit_meter {
            " [meter]"
        } else {
            ""
        };
        write!(f, "{} {}{}", self.point, self.metric, tag)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAP INTERIOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct MapInner {
    tempos: Vec<TempoPoint>,
    meters: Vec<MeterPoint>,
    bartimes: Vec<MusicTimePoint>,
    points: Vec<TempoMapPoint>,
    sample_rate: u32,
    dirty: bool,
    generation: u64,
    time_domain: TimeDomain,
}

impl MapInner {
    // ─────────────────────────────────────────────────────────────────────────────
    // Sparse lookups (valid even while dirty; used by mutations)
    // ─────────────────────────────────────────────────────────────────────────────

    fn sparse_tempo_index_at_beats(&self, b: Beats) -> usize {
        let n = self.tempos.partition_point(|t| t.beats() <= b);
        n.saturating_sub(1)
    }

    fn sparse_meter_index_at_beats(&self, b: Beats) -> usize {
        let n = self.meters.partition_point(|m| m.beats() <= b);
        n.saturating_sub(1)
    }

    /// BBT anchor in effect at a BBT position: the latest explicit meter or
    /// bar-renumber marker at or before it. Bar markers anchor the meter in
    /// effect at their own position.
    fn sparse_anchor_at_bbt(&self, bbt: BbtTime) -> MeterPoint {
        let mut anchor = self.meters[0];
        for m in &self.meters {
            if m.bbt() <= bbt {
                anchor = *m;
            }
        }
        for btp in &self.bartimes {
            if btp.bbt() <= bbt && btp.beats() > anchor.beats() {
                let mi = self.sparse_meter_index_at_beats(btp.beats());
                anchor = MeterPoint::new(*self.meters[mi].meter(), *btp.point());
            }
        }
        anchor
    }

    /// Same, keyed by quarter-note position.
    fn sparse_anchor_at_beats(&self, b: Beats) -> MeterPoint {
        let mi = self.sparse_meter_index_at_beats(b);
        let mut anchor = self.meters[mi];
        for btp in &self.bartimes {
            if btp.beats() <= b && btp.beats() > anchor.beats() {
                anchor = MeterPoint::new(*anchor.meter(), *btp.point());
            }
        }
        anchor
    }

    /// Anchor strictly before `b`. Used when relabeling a meter that sits
    /// at `b` itself, which must not anchor on its own stale label.
    fn sparse_anchor_before_beats(&self, b: Beats) -> MeterPoint {
        let n = self.meters.partition_point(|m| m.beats() < b);
        let mut anchor = self.meters[n.saturating_sub(1)];
        for btp in &self.bartimes {
            if btp.beats() < b && btp.beats() > anchor.beats() {
                anchor = MeterPoint::new(*anchor.meter(), *btp.point());
            }
        }
        anchor
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Dense lookups (grid must be clean and cover the position)
    // ─────────────────────────────────────────────────────────────────────────────

    fn point_index_at_sc(&self, sc: Superclock) -> usize {
        assert!(!self.points.is_empty(), "tempo map is empty");
        let n = self.points.partition_point(|p| p.sclock() <= sc);
        n.saturating_sub(1)
    }

    fn point_index_at_beats(&self, b: Beats) -> usize {
        assert!(!self.points.is_empty(), "tempo map is empty");
        let n = self.points.partition_point(|p| p.beats() <= b);
        n.saturating_sub(1)
    }

    /// BBT is not guaranteed monotonic across bar-renumber markers, so this
    /// scans instead of bisecting.
    fn point_index_at_bbt(&self, bbt: BbtTime) -> usize {
        assert!(!self.points.is_empty(), "tempo map is empty");
        let mut idx = 0;
        for (i, p) in self.points.iter().enumerate() {
            if p.bbt() <= bbt {
                idx = i;
            }
        }
        idx
    }

    /// BBT anchor derived from a grid point: the grid point's own triple
    /// with the governing meter's signature. Anchoring at the grid point
    /// (rather than the raw meter point) keeps bar-renumber markers
    /// honored.
    fn anchor_for(&self, p: &TempoMapPoint) -> MeterPoint {
        MeterPoint::new(*self.meters[p.meter_index()].meter(), *p.point())
    }

    fn metric_for(&self, p: &TempoMapPoint) -> TempoMetric {
        TempoMetric::new(self.tempos[p.tempo_index()], self.meters[p.meter_index()])
    }

    /// Invalidate the grid and advance the generation. Every mutation ends
    /// here so staleness checks see the change before the next rebuild.
    fn bump(&mut self) {
        self.dirty = true;
        self.generation = self.generation.wrapping_add(1);
    }

    fn covers_sc(&self, sc: Superclock) -> bool {
        self.points.last().is_some_and(|p| p.sclock() >= sc)
    }

    fn covers_beats(&self, b: Beats) -> bool {
        self.points.last().is_some_and(|p| p.beats() >= b)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Ramp coefficients
    // ─────────────────────────────────────────────────────────────────────────────

    /// Recompute the beat-domain coefficient of every tempo pairwise. The
    /// quarter-domain coefficient depends only on rates and beat spans, so
    /// it is valid before superclock positions have been solved.
    fn coefficient_pass_quarters(&mut self) {
        for i in 0..self.tempos.len() {
            if i + 1 < self.tempos.len() {
                let end_scpqn = self.tempos[i + 1].tempo().superclocks_per_quarter_note();
                let duration = self.tempos[i + 1].beats() - self.tempos[i].beats();
                debug_assert!(duration > Beats::ZERO, "zero-duration tempo span");
                self.tempos[i].compute_c_quarters(end_scpqn, duration);
            } else {
                // final tempo extrapolates at its start rate
                let own = self.tempos[i].tempo().superclocks_per_quarter_note();
                self.tempos[i].compute_c_quarters(own, Beats::ZERO);
            }
        }
    }

    /// Superclock-domain coefficients, valid once positions are solved.
    fn coefficient_pass_superclock(&mut self) {
        for i in 0..self.tempos.len() {
            if i + 1 < self.tempos.len() {
                let end_scpqn = self.tempos[i + 1].tempo().superclocks_per_quarter_note();
                let duration = self.tempos[i + 1].sclock() - self.tempos[i].sclock();
                self.tempos[i].compute_c_superclock(end_scpqn, duration);
            } else {
                let own = self.tempos[i].tempo().superclocks_per_quarter_note();
                self.tempos[i].compute_c_superclock(own, 0);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Downstream re-solve after a mutation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Re-derive the superclock position of every explicit point strictly
    /// after `after`, from the tempo model. Beat and BBT values are
    /// primary and stay untouched; a moved or changed tempo gives later
    /// points new superclock positions but the same musical ones.
    fn reposition_downstream(&mut self, after: Beats) {
        self.coefficient_pass_quarters();

        for i in 1..self.tempos.len() {
            if self.tempos[i].beats() > after {
                let b = self.tempos[i].beats();
                let bbt = self.tempos[i].bbt();
                let sc = self.tempos[i - 1].superclock_at(b);
                self.tempos[i].point_mut().set(sc, b, bbt);
            }
        }

        for i in 0..self.meters.len() {
            if self.meters[i].beats() > after {
                let b = self.meters[i].beats();
                let bbt = self.meters[i].bbt();
                let ti = self.sparse_tempo_index_at_beats(b);
                let sc = self.tempos[ti].superclock_at(b);
                self.meters[i].point_mut().set(sc, b, bbt);
            }
        }

        for i in 0..self.bartimes.len() {
            if self.bartimes[i].beats() > after {
                let b = self.bartimes[i].beats();
                let bbt = self.bartimes[i].bbt();
                let ti = self.sparse_tempo_index_at_beats(b);
                let sc = self.tempos[ti].superclock_at(b);
                self.bartimes[i].point_mut().set(sc, b, bbt);
            }
        }
    }

    /// Re-derive the BBT label of every explicit point strictly after
    /// `after` from the anchor chain, so labels and beat positions agree
    /// again after a move changed beat values. Meters first, ascending,
    /// each anchored strictly before itself; tempos then read the
    /// corrected chain. Bar-renumber markers keep their forced labels.
    fn relabel_downstream(&mut self, after: Beats) {
        for i in 0..self.meters.len() {
            if self.meters[i].beats() > after {
                let b = self.meters[i].beats();
                let sc = self.meters[i].sclock();
                let bbt = self.sparse_anchor_before_beats(b).bbt_at(b);
                self.meters[i].point_mut().set(sc, b, bbt);
            }
        }
        for i in 0..self.tempos.len() {
            if self.tempos[i].beats() > after {
                let b = self.tempos[i].beats();
                let sc = self.tempos[i].sclock();
                let bbt = self.sparse_anchor_at_beats(b).bbt_at(b);
                self.tempos[i].point_mut().set(sc, b, bbt);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Rebuild / extend
    // ─────────────────────────────────────────────────────────────────────────────

    /// Full regeneration of the dense grid out to at least `limit`
    /// superclocks (and always past the final explicit point).
    fn rebuild_locked(&mut self, limit: Superclock) {
        debug_assert!(!self.tempos.is_empty() && !self.meters.is_empty());

        self.coefficient_pass_quarters();
        self.coefficient_pass_superclock();

        let last_explicit_sc = self
            .tempos
            .last()
            .map(|t| t.sclock())
            .into_iter()
            .chain(self.meters.last().map(|m| m.sclock()))
            .chain(self.bartimes.last().map(|b| b.sclock()))
            .max()
            .unwrap_or(0);
        let limit = limit.max(DEFAULT_EXTENT).max(last_explicit_sc);

        log::debug!(
            "tempo map rebuild to sc {} ({} tempos, {} meters, {} bartimes)",
            limit,
            self.tempos.len(),
            self.meters.len(),
            self.bartimes.len()
        );

        self.points.clear();

        let mut beat = self.tempos[0].beats().min(self.meters[0].beats());
        let mut tempo_idx = 0usize;
        let mut meter_idx = 0usize;
        let mut next_tempo = 0usize;
        let mut next_meter = 0usize;
        let mut next_bartime = 0usize;
        let mut anchor = self.meters[0];
        let mut prev_sc = Superclock::MIN;

        loop {
            let mut explicit_tempo = false;
            let mut explicit_meter = false;
            let mut explicit_bartime = false;

            if next_tempo < self.tempos.len() && self.tempos[next_tempo].beats() == beat {
                tempo_idx = next_tempo;
                next_tempo += 1;
                explicit_tempo = true;
            }
            if next_meter < self.meters.len() && self.meters[next_meter].beats() == beat {
                meter_idx = next_meter;
                next_meter += 1;
                explicit_meter = true;
                anchor = self.meters[meter_idx];
            }
            if next_bartime < self.bartimes.len() && self.bartimes[next_bartime].beats() == beat {
                // numbering restarts here with the forced BBT
                anchor = MeterPoint::new(
                    *self.meters[meter_idx].meter(),
                    *self.bartimes[next_bartime].point(),
                );
                next_bartime += 1;
                explicit_bartime = true;
            }

            // explicit points are emitted verbatim; gaps are interpolated
            let point = if explicit_tempo {
                *self.tempos[tempo_idx].point()
            } else if explicit_meter {
                *self.meters[meter_idx].point()
            } else if explicit_bartime {
                *self.bartimes[next_bartime - 1].point()
            } else {
                let sc = self.tempos[tempo_idx].superclock_at(beat);
                Point::new(sc, beat, anchor.bbt_at(beat))
            };

            if point.sclock() <= prev_sc {
                log::warn!("tempo map ordering inversion at {}", point);
            }
            debug_assert!(point.sclock() > prev_sc, "grid must increase strictly");
            prev_sc = point.sclock();

            self.points.push(TempoMapPoint {
                point,
                tempo: tempo_idx,
                meter: meter_idx,
                explicit_tempo,
                explicit_meter,
                explicit_bartime,
            });

            let explicit_done = next_tempo >= self.tempos.len()
                && next_meter >= self.meters.len()
                && next_bartime >= self.bartimes.len();
            if point.sclock() >= limit && explicit_done {
                break;
            }

            beat += Beats::ONE;
        }

        self.dirty = false;
    }

    /// Fill only the uncovered tail out to `limit`. Valid when the grid is
    /// clean; every explicit point is already materialized, so the tail is
    /// implicit points under the final metric.
    fn extend_locked(&mut self, limit: Superclock) {
        debug_assert!(!self.dirty);
        let last = match self.points.last() {
            Some(p) => *p,
            None => {
                self.rebuild_locked(limit);
                return;
            }
        };

        log::trace!("tempo map extend from sc {} to {}", last.sclock(), limit);

        let tempo_idx = last.tempo_index();
        let meter_idx = last.meter_index();
        let anchor = self.anchor_for(&last);
        let mut beat = last.beats() + Beats::ONE;

        loop {
            let sc = self.tempos[tempo_idx].superclock_at(beat);
            self.points.push(TempoMapPoint {
                point: Point::new(sc, beat, anchor.bbt_at(beat)),
                tempo: tempo_idx,
                meter: meter_idx,
                explicit_tempo: false,
                explicit_meter: false,
                explicit_bartime: false,
            });
            if sc >= limit {
                break;
            }
            beat += Beats::ONE;
        }
    }

    /// Superclock extent a beat-targeted request needs, via the sparse
    /// model.
    fn sc_for_beats(&self, b: Beats) -> Superclock {
        let ti = self.sparse_tempo_index_at_beats(b);
        self.tempos[ti].superclock_at(b)
    }

    fn sc_for_bbt(&self, bbt: BbtTime) -> Superclock {
        let anchor = self.sparse_anchor_at_bbt(bbt);
        self.sc_for_beats(anchor.quarters_at(bbt))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPO MAP
// ═══════════════════════════════════════════════════════════════════════════════

/// Mapping of audio time to musical time: superclock / samples on one side,
/// quarter notes and BBT on the other.
pub struct TempoMap {
    inner: RwLock<MapInner>,
    observers: ChangeObservers,
}

impl TempoMap {
    /// A map always owns one initial tempo and one initial meter, anchored
    /// at the timeline origin. They can be modified but never removed.
    pub fn new(initial_tempo: Tempo, initial_meter: Meter, sample_rate: u32) -> Self {
        let origin = Point::new(0, Beats::ZERO, BbtTime::START);
        let inner = MapInner {
            tempos: vec![TempoPoint::new(initial_tempo, origin)],
            meters: vec![MeterPoint::new(initial_meter, origin)],
            bartimes: Vec::new(),
            points: Vec::new(),
            sample_rate,
            dirty: true,
            generation: 0,
            time_domain: TimeDomain::AudioTime,
        };
        Self {
            inner: RwLock::new(inner),
            observers: ChangeObservers::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lock discipline
    // ─────────────────────────────────────────────────────────────────────────────

    /// Read access to a grid guaranteed clean and covering `sc`.
    ///
    /// The common path is a plain read lock. When a rebuild or extension is
    /// needed, the read lock is released, the write lock acquired, the
    /// preconditions revalidated (another writer may have run in between),
    /// and the guard downgraded back to a reader.
    fn read_covering_sc(&self, sc: Superclock) -> RwLockReadGuard<'_, MapInner> {
        {
            let guard = self.inner.read();
            if !guard.dirty && guard.covers_sc(sc) {
                return guard;
            }
        }

        let mut w = self.inner.write();
        if w.dirty {
            w.rebuild_locked(sc);
        } else if !w.covers_sc(sc) {
            w.extend_locked(sc);
        }
        RwLockWriteGuard::downgrade(w)
    }

    fn read_covering_beats(&self, b: Beats) -> RwLockReadGuard<'_, MapInner> {
        {
            let guard = self.inner.read();
            if !guard.dirty && guard.covers_beats(b) {
                return guard;
            }
        }

        let mut w = self.inner.write();
        if w.dirty || !w.covers_beats(b) {
            let sc = w.sc_for_beats(b);
            if w.dirty {
                w.rebuild_locked(sc);
            } else {
                w.extend_locked(sc);
            }
        }
        RwLockWriteGuard::downgrade(w)
    }

    fn read_covering_bbt(&self, bbt: BbtTime) -> RwLockReadGuard<'_, MapInner> {
        let sc = {
            let guard = self.inner.read();
            guard.sc_for_bbt(bbt)
        };
        self.read_covering_sc(sc)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn sample_rate(&self) -> u32 {
        self.inner.read().sample_rate
    }

    pub fn time_domain(&self) -> TimeDomain {
        self.inner.read().time_domain
    }

    /// Monotonically increasing rebuild counter; lets callers detect stale
    /// cached conversions without holding the lock.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    pub fn n_tempos(&self) -> usize {
        self.inner.read().tempos.len()
    }

    pub fn n_meters(&self) -> usize {
        self.inner.read().meters.len()
    }

    pub fn n_bartimes(&self) -> usize {
        self.inner.read().bartimes.len()
    }

    /// Switch the authoritative time domain. `BarTime` is never a legal map
    /// domain.
    pub fn set_time_domain(&self, domain: TimeDomain) -> TemporalResult<()> {
        if domain == TimeDomain::BarTime {
            return Err(TemporalError::BarTimeDomain);
        }
        self.inner.write().time_domain = domain;
        Ok(())
    }

    /// Resolve an opaque position to superclocks, honoring the domain it
    /// was expressed in.
    pub fn superclock_at_position(&self, pos: Position) -> Superclock {
        match pos {
            Position::Audio(sc) => sc,
            Position::Music(b) => self.superclock_at(b),
        }
    }

    fn beats_at_position(&self, pos: Position) -> Beats {
        match pos {
            Position::Audio(sc) => self.quarters_at(sc),
            Position::Music(b) => b,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Queries: tempo / meter / metric
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn tempo_at(&self, sc: Superclock) -> TempoPoint {
        let guard = self.read_covering_sc(sc);
        let idx = guard.point_index_at_sc(sc);
        guard.tempos[guard.points[idx].tempo_index()]
    }

    pub fn tempo_at_beats(&self, b: Beats) -> TempoPoint {
        let guard = self.read_covering_beats(b);
        let idx = guard.point_index_at_beats(b);
        guard.tempos[guard.points[idx].tempo_index()]
    }

    pub fn tempo_at_bbt(&self, bbt: BbtTime) -> TempoPoint {
        let guard = self.read_covering_bbt(bbt);
        let idx = guard.point_index_at_bbt(bbt);
        guard.tempos[guard.points[idx].tempo_index()]
    }

    pub fn tempo_at_position(&self, pos: Position) -> TempoPoint {
        match pos {
            Position::Audio(sc) => self.tempo_at(sc),
            Position::Music(b) => self.tempo_at_beats(b),
        }
    }

    pub fn meter_at(&self, sc: Superclock) -> MeterPoint {
        let guard = self.read_covering_sc(sc);
        let idx = guard.point_index_at_sc(sc);
        guard.meters[guard.points[idx].meter_index()]
    }

    pub fn meter_at_beats(&self, b: Beats) -> MeterPoint {
        let guard = self.read_covering_beats(b);
        let idx = guard.point_index_at_beats(b);
        guard.meters[guard.points[idx].meter_index()]
    }

    pub fn meter_at_bbt(&self, bbt: BbtTime) -> MeterPoint {
        let guard = self.read_covering_bbt(bbt);
        let idx = guard.point_index_at_bbt(bbt);
        guard.meters[guard.points[idx].meter_index()]
    }

    pub fn meter_at_position(&self, pos: Position) -> MeterPoint {
        match pos {
            Position::Audio(sc) => self.meter_at(sc),
            Position::Music(b) => self.meter_at_beats(b),
        }
    }

    pub fn metric_at(&self, sc: Superclock) -> TempoMetric {
        let guard = self.read_covering_sc(sc);
        let idx = guard.point_index_at_sc(sc);
        guard.metric_for(&guard.points[idx])
    }

    pub fn metric_at_beats(&self, b: Beats) -> TempoMetric {
        let guard = self.read_covering_beats(b);
        let idx = guard.point_index_at_beats(b);
        guard.metric_for(&guard.points[idx])
    }

    pub fn metric_at_bbt(&self, bbt: BbtTime) -> TempoMetric {
        let guard = self.read_covering_bbt(bbt);
        let idx = guard.point_index_at_bbt(bbt);
        guard.metric_for(&guard.points[idx])
    }

    pub fn metric_at_position(&self, pos: Position) -> TempoMetric {
        match pos {
            Position::Audio(sc) => self.metric_at(sc),
            Position::Music(b) => self.metric_at_beats(b),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Queries: position conversion
    // ─────────────────────────────────────────────────────────────────────────────

    /// Quarter notes at a superclock position. Positions before the first
    /// grid point extrapolate backward from it; positions past the end
    /// extrapolate forward from the last point.
    pub fn quarters_at(&self, sc: Superclock) -> Beats {
        let guard = self.read_covering_sc(sc);
        let idx = guard.point_index_at_sc(sc);
        let b = guard.tempos[guard.points[idx].tempo_index()].quarters_at(sc);
        // interpolation never runs past the next grid point: a time
        // insertion leaves a superclock gap in which the governing
        // tempo would otherwise extrapolate beyond it
        match guard.points.get(idx + 1) {
            Some(next) => b.min(next.beats()),
            None => b,
        }
    }

    pub fn quarters_at_bbt(&self, bbt: BbtTime) -> Beats {
        let guard = self.read_covering_bbt(bbt);
        let idx = guard.point_index_at_bbt(bbt);
        let anchor = guard.anchor_for(&guard.points[idx]);
        anchor.quarters_at(bbt)
    }

    pub fn quarters_at_position(&self, pos: Position) -> Beats {
        self.beats_at_position(pos)
    }

    /// Superclock position of a quarter-note position.
    pub fn superclock_at(&self, b: Beats) -> Superclock {
        let guard = self.read_covering_beats(b);
        let idx = guard.point_index_at_beats(b);
        guard.tempos[guard.points[idx].tempo_index()].superclock_at(b)
    }

    pub fn superclock_at_bbt(&self, bbt: BbtTime) -> Superclock {
        let b = self.quarters_at_bbt(bbt);
        self.superclock_at(b)
    }

    /// BBT position at a superclock position.
    pub fn bbt_at(&self, sc: Superclock) -> BbtTime {
        let guard = self.read_covering_sc(sc);
        let idx = guard.point_index_at_sc(sc);
        let p = guard.points[idx];
        let anchor = guard.anchor_for(&p);
        let beats = guard.tempos[p.tempo_index()].quarters_at(sc);
        // same clamp as quarters_at: stay behind the next grid point
        let beats = match guard.points.get(idx + 1) {
            Some(next) => beats.min(next.beats()),
            None => beats,
        };
        anchor.bbt_at(beats)
    }

    pub fn bbt_at_beats(&self, b: Beats) -> BbtTime {
        let guard = self.read_covering_beats(b);
        let idx = guard.point_index_at_beats(b);
        let anchor = guard.anchor_for(&guard.points[idx]);
        anchor.bbt_at(b)
    }

    pub fn bbt_at_position(&self, pos: Position) -> BbtTime {
        match pos {
            Position::Audio(sc) => self.bbt_at(sc),
            Position::Music(b) => self.bbt_at_beats(b),
        }
    }

    /// Audio sample position of a quarter-note position.
    pub fn sample_at(&self, b: Beats) -> i64 {
        let guard = self.read_covering_beats(b);
        let idx = guard.point_index_at_beats(b);
        let sc = guard.tempos[guard.points[idx].tempo_index()].superclock_at(b);
        superclock_to_samples(sc, guard.sample_rate)
    }

    pub fn sample_at_bbt(&self, bbt: BbtTime) -> i64 {
        let sc = self.superclock_at_bbt(bbt);
        superclock_to_samples(sc, self.sample_rate())
    }

    pub fn sample_at_position(&self, pos: Position) -> i64 {
        let sc = self.superclock_at_position(pos);
        superclock_to_samples(sc, self.sample_rate())
    }

    /// Quarter notes at an audio sample position.
    pub fn quarters_at_sample(&self, sample: i64) -> Beats {
        let sr = self.sample_rate();
        self.quarters_at(samples_to_superclock(sample, sr))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Queries: walking helpers
    // ─────────────────────────────────────────────────────────────────────────────

    /// Round a BBT position to the nearest bar under the meter in effect.
    pub fn round_to_bar(&self, bbt: BbtTime) -> BbtTime {
        self.metric_at_bbt(bbt).round_to_bar(bbt)
    }

    /// Offset a BBT position by a bar/beat/tick delta under the meter in
    /// effect at the starting position.
    pub fn bbt_walk(&self, bbt: BbtTime, offset: BbtOffset) -> BbtTime {
        self.metric_at_bbt(bbt).bbt_add(bbt, offset)
    }

    /// Quarter notes spanned by `distance` samples starting at `pos`.
    pub fn samplewalk_to_quarters(&self, pos: i64, distance: i64) -> Beats {
        let sr = self.sample_rate();
        let from = self.quarters_at(samples_to_superclock(pos, sr));
        let to = self.quarters_at(samples_to_superclock(pos + distance, sr));
        to - from
    }

    /// Sample position reached by walking `distance` quarter notes from a
    /// sample position.
    pub fn sample_plus_quarters_as_samples(&self, start: i64, distance: Beats) -> i64 {
        let sr = self.sample_rate();
        let from = self.quarters_at(samples_to_superclock(start, sr));
        self.sample_at(from + distance)
    }

    /// Instantaneous samples-per-quarter (ramp aware) at a sample position.
    pub fn samples_per_quarter_note_at(&self, pos: i64) -> f64 {
        let sr = self.sample_rate();
        let sc = samples_to_superclock(pos, sr);
        let scpqn = self.metric_at(sc).superclocks_per_quarter_note_at(sc);
        scpqn as f64 * sr as f64 / SUPERCLOCK_TICKS_PER_SECOND as f64
    }

    /// Next explicit tempo after the given one, if any.
    pub fn next_tempo(&self, tp: &TempoPoint) -> Option<TempoPoint> {
        let guard = self.inner.read();
        let idx = guard.tempos.iter().position(|t| t.point() == tp.point())?;
        guard.tempos.get(idx + 1).copied()
    }

    /// Previous explicit tempo before the given one, if any.
    pub fn previous_tempo(&self, tp: &TempoPoint) -> Option<TempoPoint> {
        let guard = self.inner.read();
        let idx = guard.tempos.iter().position(|t| t.point() == tp.point())?;
        idx.checked_sub(1).map(|i| guard.tempos[i])
    }

    /// Resolved grid points in `[start, end)`. With `bar_mod == 0` every
    /// beat point is returned; otherwise only bar starts whose bar number
    /// matches the modulus (for coarse rulers).
    pub fn grid(&self, start: Superclock, end: Superclock, bar_mod: u32) -> Vec<GridPoint> {
        let guard = self.read_covering_sc(end);
        guard
            .points
            .iter()
            .filter(|p| p.sclock() >= start && p.sclock() < end)
            .filter(|p| {
                if bar_mod == 0 {
                    true
                } else {
                    p.bbt().is_bar_start() && (p.bbt().bar - 1) as u32 % bar_mod == 0
                }
            })
            .map(|p| GridPoint {
                point: *p.point(),
                metric: guard.metric_for(p),
                explicit_tempo: p.is_explicit_tempo(),
                explicit_meter: p.is_explicit_meter(),
                explicit_bartime: p.is_explicit_bartime(),
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Staleness-checked bulk conversions
    // ─────────────────────────────────────────────────────────────────────────────

    /// Refresh a cached (beats, bbt) pair for a sample position. Does
    /// nothing when the caller's generation is current, unless `force`.
    /// Returns the map's current generation.
    pub fn update_music_times(
        &self,
        gen: u64,
        sample: i64,
        beats: &mut Beats,
        bbt: &mut BbtTime,
        force: bool,
    ) -> u64 {
        let current = self.generation();
        if !force && gen == current {
            return current;
        }
        let sc = samples_to_superclock(sample, self.sample_rate());
        *beats = self.quarters_at(sc);
        *bbt = self.bbt_at(sc);
        self.generation()
    }

    /// Refresh cached (sample, beats) for a BBT position.
    pub fn update_samples_and_beat_times(
        &self,
        gen: u64,
        bbt: BbtTime,
        sample: &mut i64,
        beats: &mut Beats,
        force: bool,
    ) -> u64 {
        let current = self.generation();
        if !force && gen == current {
            return current;
        }
        *beats = self.quarters_at_bbt(bbt);
        *sample = self.sample_at(*beats);
        self.generation()
    }

    /// Refresh cached (sample, bbt) for a quarter-note position.
    pub fn update_samples_and_bbt_times(
        &self,
        gen: u64,
        beats: Beats,
        sample: &mut i64,
        bbt: &mut BbtTime,
        force: bool,
    ) -> u64 {
        let current = self.generation();
        if !force && gen == current {
            return current;
        }
        *sample = self.sample_at(beats);
        *bbt = self.bbt_at_beats(beats);
        self.generation()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Mutations: tempo
    // ─────────────────────────────────────────────────────────────────────────────

    /// Insert (or replace) an explicit tempo at a BBT position. Positions
    /// off the beat grid are silently rounded to the nearest beat.
    pub fn set_tempo_bbt(&self, tempo: Tempo, bbt: BbtTime) -> TempoPoint {
        let beats = {
            let guard = self.inner.read();
            let anchor = guard.sparse_anchor_at_bbt(bbt);
            anchor.quarters_at(anchor.meter().round_to_beat(bbt))
        };
        self.set_tempo_beats(tempo, beats)
    }

    /// Insert (or replace) an explicit tempo at a quarter-note position,
    /// rounded to a whole beat.
    pub fn set_tempo_beats(&self, tempo: Tempo, beats: Beats) -> TempoPoint {
        let (result, sc) = {
            let mut w = self.inner.write();
            let beats = beats.round_to_beat().max(Beats::ZERO);
            w.coefficient_pass_quarters();

            let point = {
                let ti = w.sparse_tempo_index_at_beats(beats);
                let sc = w.tempos[ti].superclock_at(beats);
                let anchor = w.sparse_anchor_at_beats(beats);
                Point::new(sc, beats, anchor.bbt_at(beats))
            };

            let tp = TempoPoint::new(tempo, point);
            let idx = match w.tempos.iter().position(|t| t.beats() == beats) {
                Some(i) => {
                    w.tempos[i].set_tempo(tempo);
                    i
                }
                None => {
                    let i = w.tempos.partition_point(|t| t.beats() < beats);
                    w.tempos.insert(i, tp);
                    i
                }
            };

            // one tick back so the new point's own superclock is
            // re-solved: inserting it re-targets the preceding span's
            // ramp coefficient, which moves the point itself
            w.reposition_downstream(beats - Beats::from_ticks(1));
            w.bump();
            let solved = w.tempos[idx];
            (solved, solved.sclock())
        };
        self.observers.emit(sc, Superclock::MAX);
        result
    }

    /// Insert (or replace) an explicit tempo at an opaque position.
    pub fn set_tempo(&self, tempo: Tempo, pos: Position) -> TempoPoint {
        let beats = self.beats_at_position(pos);
        self.set_tempo_beats(tempo, beats)
    }

    /// Replace the tempo value of an existing point without moving it.
    /// Returns false when the point is not in the map.
    pub fn change_tempo(&self, at: &TempoPoint, tempo: Tempo) -> bool {
        let sc = {
            let mut w = self.inner.write();
            let Some(i) = w.tempos.iter().position(|t| t.point() == at.point()) else {
                return false;
            };
            let old_sc = w.tempos[i].sclock();
            w.tempos[i].set_tempo(tempo);
            let b = w.tempos[i].beats();
            // one tick back: a ramped predecessor ends at this point's
            // rate, so changing the rate moves the point itself
            w.reposition_downstream(b - Beats::from_ticks(1));
            w.bump();
            old_sc.min(w.tempos[i].sclock())
        };
        self.observers.emit(sc, Superclock::MAX);
        true
    }

    /// True unless the point is the map's initial tempo.
    pub fn can_remove_tempo(&self, tp: &TempoPoint) -> bool {
        let guard = self.inner.read();
        guard
            .tempos
            .iter()
            .position(|t| t.point() == tp.point())
            .is_some_and(|i| i != 0)
    }

    pub fn is_initial_tempo(&self, tp: &TempoPoint) -> bool {
        self.inner.read().tempos[0].point() == tp.point()
    }

    /// Remove an explicit tempo. Removing the initial tempo is a documented
    /// no-op returning false.
    pub fn remove_tempo(&self, tp: &TempoPoint) -> bool {
        let sc = {
            let mut w = self.inner.write();
            let Some(i) = w.tempos.iter().position(|t| t.point() == tp.point()) else {
                return false;
            };
            if i == 0 {
                return false;
            }
            let removed = w.tempos.remove(i);
            let b = removed.beats();
            w.reposition_downstream(b);
            w.bump();
            removed.sclock()
        };
        self.observers.emit(sc, Superclock::MAX);
        true
    }

    /// Relocate an explicit tempo. With `push`, every later explicit point
    /// shifts by the same beat delta, preserving relative spacing; without
    /// it the destination must stay between the point's neighbors. Returns
    /// false when the move is not possible.
    pub fn move_tempo(&self, tp: &TempoPoint, destination: Position, push: bool) -> bool {
        let dest = self.beats_at_position(destination).round_to_beat();
        let emit_from = {
            let mut w = self.inner.write();
            let Some(i) = w.tempos.iter().position(|t| t.point() == tp.point()) else {
                return false;
            };
            if i == 0 {
                return false;
            }

            let old = w.tempos[i].beats();
            if dest == old {
                return true;
            }
            let delta = dest - old;

            if push {
                // everything at or after the moved point travels with it
                for t in w.tempos.iter_mut().skip(i) {
                    shift_beats(t.point_mut(), delta);
                }
                for m in 0..w.meters.len() {
                    if w.meters[m].beats() >= old {
                        shift_beats(w.meters[m].point_mut(), delta);
                    }
                }
                for b in 0..w.bartimes.len() {
                    if w.bartimes[b].beats() >= old {
                        shift_beats(w.bartimes[b].point_mut(), delta);
                    }
                }
            } else {
                let lower = w.tempos[i - 1].beats();
                let upper = w.tempos.get(i + 1).map(|t| t.beats());
                if dest <= lower || upper.is_some_and(|u| dest >= u) {
                    return false;
                }
                let p = &mut w.tempos[i];
                let bbt = p.bbt();
                let sc = p.sclock();
                p.point_mut().set(sc, dest, bbt);
            }

            let from = old.min(dest);
            // one tick back so the moved point itself is re-solved and
            // relabeled
            w.relabel_downstream(from - Beats::from_ticks(1));
            w.reposition_downstream(from - Beats::from_ticks(1));
            w.bump();
            w.sc_for_beats(from)
        };
        self.observers.emit(emit_from, Superclock::MAX);
        true
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Mutations: meter
    // ─────────────────────────────────────────────────────────────────────────────

    /// Insert (or replace) an explicit meter at a BBT position, rounded to
    /// the nearest bar start.
    pub fn set_meter_bbt(&self, meter: Meter, bbt: BbtTime) -> MeterPoint {
        let beats = {
            let guard = self.inner.read();
            let anchor = guard.sparse_anchor_at_bbt(bbt);
            anchor.quarters_at(anchor.meter().round_to_bar(bbt))
        };
        self.set_meter_beats(meter, beats)
    }

    /// Insert (or replace) an explicit meter at a quarter-note position,
    /// rounded to the start of a bar.
    pub fn set_meter_beats(&self, meter: Meter, beats: Beats) -> MeterPoint {
        let (result, sc) = {
            let mut w = self.inner.write();
            w.coefficient_pass_quarters();

            // bar alignment: round through the governing anchor's BBT
            let anchor = w.sparse_anchor_at_beats(beats.round_to_beat().max(Beats::ZERO));
            let bar_bbt = anchor.meter().round_to_bar(anchor.bbt_at(beats.round_to_beat()));
            let beats = anchor.quarters_at(bar_bbt).round_to_beat().max(Beats::ZERO);

            let ti = w.sparse_tempo_index_at_beats(beats);
            let sc = w.tempos[ti].superclock_at(beats);
            let point = Point::new(sc, beats, bar_bbt);

            let mp = MeterPoint::new(meter, point);
            match w.meters.iter().position(|m| m.beats() == beats) {
                Some(i) => {
                    w.meters[i].set_meter(meter);
                    *w.meters[i].point_mut() = point;
                }
                None => {
                    let i = w.meters.partition_point(|m| m.beats() < beats);
                    w.meters.insert(i, mp);
                }
            }

            w.bump();
            (mp, sc)
        };
        self.observers.emit(sc, Superclock::MAX);
        result
    }

    /// Insert (or replace) an explicit meter at an opaque position.
    pub fn set_meter(&self, meter: Meter, pos: Position) -> MeterPoint {
        let beats = self.beats_at_position(pos);
        self.set_meter_beats(meter, beats)
    }

    pub fn can_remove_meter(&self, mp: &MeterPoint) -> bool {
        let guard = self.inner.read();
        guard
            .meters
            .iter()
            .position(|m| m.point() == mp.point())
            .is_some_and(|i| i != 0)
    }

    pub fn is_initial_meter(&self, mp: &MeterPoint) -> bool {
        self.inner.read().meters[0].point() == mp.point()
    }

    /// Remove an explicit meter. Removing the initial meter is a no-op
    /// returning false.
    pub fn remove_meter(&self, mp: &MeterPoint) -> bool {
        let sc = {
            let mut w = self.inner.write();
            let Some(i) = w.meters.iter().position(|m| m.point() == mp.point()) else {
                return false;
            };
            if i == 0 {
                return false;
            }
            let removed = w.meters.remove(i);
            w.bump();
            removed.sclock()
        };
        self.observers.emit(sc, Superclock::MAX);
        true
    }

    /// Relocate an explicit meter, keeping it on a bar start.
    pub fn move_meter(&self, mp: &MeterPoint, destination: Position, push: bool) -> bool {
        let dest = self.beats_at_position(destination);
        let emit_from = {
            let mut w = self.inner.write();
            let Some(i) = w.meters.iter().position(|m| m.point() == mp.point()) else {
                return false;
            };
            if i == 0 {
                return false;
            }

            w.coefficient_pass_quarters();

            // snap the destination onto a bar start under the preceding
            // meter
            let prev = w.meters[i - 1];
            let bar_bbt = prev.meter().round_to_bar(prev.bbt_at(dest.round_to_beat()));
            let dest = prev.quarters_at(bar_bbt).round_to_beat();

            let old = w.meters[i].beats();
            if dest == old {
                return true;
            }
            let delta = dest - old;

            if push {
                for m in w.meters.iter_mut().skip(i) {
                    shift_beats(m.point_mut(), delta);
                }
                for b in 0..w.bartimes.len() {
                    if w.bartimes[b].beats() >= old {
                        shift_beats(w.bartimes[b].point_mut(), delta);
                    }
                }
            } else {
                let lower = w.meters[i - 1].beats();
                let upper = w.meters.get(i + 1).map(|m| m.beats());
                if dest <= lower || upper.is_some_and(|u| dest >= u) {
                    return false;
                }
                let ti = w.sparse_tempo_index_at_beats(dest);
                let sc = w.tempos[ti].superclock_at(dest);
                w.meters[i].point_mut().set(sc, dest, bar_bbt);
            }

            let from = old.min(dest);
            w.relabel_downstream(from - Beats::from_ticks(1));
            w.reposition_downstream(from - Beats::from_ticks(1));
            w.bump();
            w.sc_for_beats(from)
        };
        self.observers.emit(emit_from, Superclock::MAX);
        true
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Mutations: bar-renumber markers
    // ─────────────────────────────────────────────────────────────────────────────

    /// Place a marker forcing bar numbering to restart at `bbt` (rounded to
    /// a bar start) from the given position onward.
    pub fn set_bartime(&self, bbt: BbtTime, pos: Position) -> MusicTimePoint {
        let beats = self.beats_at_position(pos).round_to_beat().max(Beats::ZERO);
        let (result, sc) = {
            let mut w = self.inner.write();
            w.coefficient_pass_quarters();

            let ti = w.sparse_tempo_index_at_beats(beats);
            let sc = w.tempos[ti].superclock_at(beats);
            let forced = BbtTime::new(bbt.bar, 1, 0);
            let btp = MusicTimePoint::new(forced, Point::new(sc, beats, forced));

            match w.bartimes.iter().position(|b| b.beats() == beats) {
                Some(i) => w.bartimes[i] = btp,
                None => {
                    let i = w.bartimes.partition_point(|b| b.beats() < beats);
                    w.bartimes.insert(i, btp);
                }
            }
            w.bump();
            (btp, sc)
        };
        self.observers.emit(sc, Superclock::MAX);
        result
    }

    /// Remove a bar-renumber marker. Returns false when not found.
    pub fn remove_bartime(&self, btp: &MusicTimePoint) -> bool {
        let sc = {
            let mut w = self.inner.write();
            let Some(i) = w.bartimes.iter().position(|b| b.point() == btp.point()) else {
                return false;
            };
            let removed = w.bartimes.remove(i);
            w.bump();
            removed.sclock()
        };
        self.observers.emit(sc, Superclock::MAX);
        true
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Mutations: timeline editing
    // ─────────────────────────────────────────────────────────────────────────────

    /// Shift every explicit point at or after `pos` later by `duration`
    /// superclocks. Points keep their musical labels; the inserted span
    /// belongs to the preceding tempo.
    pub fn insert_time(&self, pos: Superclock, duration: Superclock) {
        if duration <= 0 {
            return;
        }
        {
            let mut w = self.inner.write();
            for t in w.tempos.iter_mut() {
                if t.sclock() >= pos {
                    shift_sclock(t.point_mut(), duration);
                }
            }
            for m in w.meters.iter_mut() {
                if m.sclock() >= pos {
                    shift_sclock(m.point_mut(), duration);
                }
            }
            for b in w.bartimes.iter_mut() {
                if b.sclock() >= pos {
                    shift_sclock(b.point_mut(), duration);
                }
            }
            w.bump();
        }
        self.observers.emit(pos, Superclock::MAX);
    }

    /// Remove the span `[pos, pos + duration)`, shifting every explicit
    /// point at or after its end earlier by `duration`. Fails (returns
    /// false, no change) if an explicit point lies inside the span, since
    /// shifting it would invert ordering.
    pub fn remove_time(&self, pos: Superclock, duration: Superclock) -> bool {
        if duration <= 0 {
            return true;
        }
        {
            let mut w = self.inner.write();
            let end = pos + duration;

            let in_span = |sc: Superclock| sc >= pos && sc < end;
            if w.tempos.iter().any(|t| in_span(t.sclock()))
                || w.meters.iter().any(|m| in_span(m.sclock()))
                || w.bartimes.iter().any(|b| in_span(b.sclock()))
            {
                log::warn!(
                    "remove_time: explicit point inside removed span [{}, {})",
                    pos,
                    end
                );
                return false;
            }

            // the first point past the span must not land behind the
            // implicit grid that precedes it musically; that grid is
            // interpolated from an unshifted tempo and does not move
            let first_shifted = w
                .tempos
                .iter()
                .map(|t| (t.beats(), t.sclock()))
                .chain(w.meters.iter().map(|m| (m.beats(), m.sclock())))
                .chain(w.bartimes.iter().map(|b| (b.beats(), b.sclock())))
                .filter(|&(_, sc)| sc >= end)
                .min();
            if let Some((b, sc)) = first_shifted {
                w.coefficient_pass_quarters();
                let pred = b - Beats::ONE;
                let ti = w.sparse_tempo_index_at_beats(pred);
                if sc - duration <= w.tempos[ti].superclock_at(pred) {
                    log::warn!(
                        "remove_time: shift would reorder the map at {} qn",
                        b
                    );
                    return false;
                }
            }

            for t in w.tempos.iter_mut() {
                if t.sclock() >= end {
                    shift_sclock(t.point_mut(), -duration);
                }
            }
            for m in w.meters.iter_mut() {
                if m.sclock() >= end {
                    shift_sclock(m.point_mut(), -duration);
                }
            }
            for b in w.bartimes.iter_mut() {
                if b.sclock() >= end {
                    shift_sclock(b.point_mut(), -duration);
                }
            }
            w.bump();
        }
        self.observers.emit(pos, Superclock::MAX);
        true
    }

    /// Change the sample rate. Every explicit and grid point keeps its
    /// *sample* position; superclock values are rewritten through the old
    /// rate. A local recomputation, not a structural rebuild.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        let mut w = self.inner.write();
        let old = w.sample_rate;
        if old == sample_rate {
            return;
        }

        let remap =
            |sc: Superclock| samples_to_superclock(superclock_to_samples(sc, old), sample_rate);

        for t in w.tempos.iter_mut() {
            let sc = remap(t.sclock());
            t.point_mut().reset_sclock_for_rate_change(sc);
        }
        for m in w.meters.iter_mut() {
            let sc = remap(m.sclock());
            m.point_mut().reset_sclock_for_rate_change(sc);
        }
        for b in w.bartimes.iter_mut() {
            let sc = remap(b.sclock());
            b.point_mut().reset_sclock_for_rate_change(sc);
        }
        for p in w.points.iter_mut() {
            let sc = remap(p.point.sclock());
            p.point.reset_sclock_for_rate_change(sc);
        }

        w.sample_rate = sample_rate;
        w.generation = w.generation.wrapping_add(1);
        log::debug!("tempo map sample rate {} -> {}", old, sample_rate);
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Observers
    // ─────────────────────────────────────────────────────────────────────────────

    /// Register a change observer; the callback receives the affected
    /// superclock range after each effective mutation. Observers must not
    /// re-enter the map's write path synchronously.
    pub fn subscribe<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(Superclock, Superclock) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Explicit-list access (for persistence and display)
    // ─────────────────────────────────────────────────────────────────────────────

    pub(crate) fn with_lists<R>(
        &self,
        f: impl FnOnce(&[TempoPoint], &[MeterPoint], &[MusicTimePoint], u32, TimeDomain) -> R,
    ) -> R {
        let guard = self.inner.read();
        f(
            &guard.tempos,
            &guard.meters,
            &guard.bartimes,
            guard.sample_rate,
            guard.time_domain,
        )
    }

    pub(crate) fn replace_lists(
        &self,
        tempos: Vec<TempoPoint>,
        meters: Vec<MeterPoint>,
        bartimes: Vec<MusicTimePoint>,
        sample_rate: u32,
        time_domain: TimeDomain,
    ) {
        {
            let mut w = self.inner.write();
            w.tempos = tempos;
            w.meters = meters;
            w.bartimes = bartimes;
            w.sample_rate = sample_rate;
            w.time_domain = time_domain;
            w.points.clear();
            w.bump();
        }
        self.observers.emit(0, Superclock::MAX);
    }

    /// First explicit tempo (always present).
    pub fn initial_tempo(&self) -> TempoPoint {
        self.inner.read().tempos[0]
    }

    /// First explicit meter (always present).
    pub fn initial_meter(&self) -> MeterPoint {
        self.inner.read().meters[0]
    }

    /// Snapshot of the explicit tempo list in beat order.
    pub fn tempos(&self) -> Vec<TempoPoint> {
        self.inner.read().tempos.clone()
    }

    pub fn meters(&self) -> Vec<MeterPoint> {
        self.inner.read().meters.clone()
    }

    pub fn bartimes(&self) -> Vec<MusicTimePoint> {
        self.inner.read().bartimes.clone()
    }
}

impl std::fmt::Display for TempoMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with_lists(|tempos, meters, bartimes, sr, domain| {
            writeln!(f, "tempo map: {} Hz, domain {:?}", sr, domain)?;
            for t in tempos {
                writeln!(f, "  tempo {}", t)?;
            }
            for m in meters {
                writeln!(f, "  meter {}", m)?;
            }
            for b in bartimes {
                writeln!(f, "  {}", b)?;
            }
            Ok(())
        })
    }
}

impl std::fmt::Debug for TempoMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.read();
        f.debug_struct("TempoMap")
            .field("tempos", &guard.tempos.len())
            .field("meters", &guard.meters.len())
            .field("bartimes", &guard.bartimes.len())
            .field("points", &guard.points.len())
            .field("dirty", &guard.dirty)
            .field("generation", &guard.generation)
            .finish()
    }
}

#[inline]
fn shift_beats(p: &mut Point, delta: Beats) {
    p.set(p.sclock(), p.beats() + delta, p.bbt());
}

#[inline]
fn shift_sclock(p: &mut Point, delta: Superclock) {
    p.set(p.sclock() + delta, p.beats(), p.bbt());
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
