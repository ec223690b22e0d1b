//! Tempo map integration tests
//!
//! End-to-end properties of the full map: monotonicity, exact round trips,
//! ramp continuity, rebuild stability, editing scenarios and persistence.

use approx::assert_relative_eq;

use pf_temporal::{
    superclock_to_samples, BbtTime, Beats, Meter, Position, Tempo, TempoMap, TempoMapState,
};

const SR: u32 = 48000;

fn default_map() -> TempoMap {
    TempoMap::new(Tempo::new(120.0, 4), Meter::new(4, 4), SR)
}

/// A map exercising every explicit point type: a ramp, a tempo change, a
/// meter change and a bar renumber.
fn busy_map() -> TempoMap {
    let map = default_map();
    map.set_tempo_beats(Tempo::with_ramp(120.0, 180.0, 4), Beats::from_beats(8));
    map.set_tempo_beats(Tempo::new(180.0, 4), Beats::from_beats(16));
    map.set_meter_beats(Meter::new(3, 4), Beats::from_beats(16));
    map.set_bartime(
        BbtTime::new(50, 1, 0),
        Position::Music(Beats::from_beats(28)),
    );
    map
}

// ─────────────────────────────────────────────────────────────────────────────
// Monotonicity and round trips
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_beat_to_sample_is_strictly_monotonic() {
    let map = busy_map();
    let mut prev = i64::MIN;
    for beat in 0..64 {
        let s = map.sample_at(Beats::from_beats(beat));
        assert!(s > prev, "sample position regressed at beat {}", beat);
        prev = s;
    }
}

#[test]
fn test_constant_tempo_round_trip_is_exact() {
    let map = default_map();
    for beat in [0i64, 1, 2, 3, 17, 100, 999] {
        let qn = Beats::from_beats(beat);
        let sc = map.superclock_at(qn);
        assert_eq!(map.quarters_at(sc), qn);
    }
}

#[test]
fn test_bbt_round_trip_across_meter_change() {
    let map = default_map();
    map.set_meter_beats(Meter::new(6, 8), Beats::from_beats(8));

    for &bbt in &[
        BbtTime::new(1, 1, 0),
        BbtTime::new(2, 3, 480),
        BbtTime::new(3, 1, 0),  // the 6/8 boundary (beat 8)
        BbtTime::new(4, 5, 0),
        BbtTime::new(9, 2, 960),
    ] {
        let qn = map.quarters_at_bbt(bbt);
        assert_eq!(map.bbt_at_beats(qn), bbt, "round trip failed for {}", bbt);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ramps
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_ramp_rate_is_continuous_at_boundary() {
    let map = default_map();
    map.set_tempo_beats(Tempo::with_ramp(120.0, 240.0, 4), Beats::ZERO);
    map.set_tempo_beats(Tempo::new(240.0, 4), Beats::from_beats(8));

    let boundary = map.sample_at(Beats::from_beats(8));
    let before = map.samples_per_quarter_note_at(boundary - 1);
    let after = map.samples_per_quarter_note_at(boundary);
    assert_relative_eq!(before, after, max_relative = 1e-3);

    // and the declared 240 qpm rate holds after the boundary
    assert_relative_eq!(after, SR as f64 / 4.0, max_relative = 1e-6);
}

#[test]
fn test_ramp_round_trip_within_tolerance() {
    let map = default_map();
    map.set_tempo_beats(Tempo::with_ramp(120.0, 90.0, 4), Beats::ZERO);
    map.set_tempo_beats(Tempo::new(90.0, 4), Beats::from_beats(32));

    for beat in 0..32 {
        let qn = Beats::from_beats(beat);
        let back = map.quarters_at(map.superclock_at(qn));
        let drift = (back - qn).abs();
        assert!(drift <= Beats::from_ticks(1), "drift {} at beat {}", drift, beat);
    }
}

#[test]
fn test_ramp_takes_less_time_than_constant_start_rate() {
    // accelerating 120 -> 180 must reach beat 8 sooner than constant 120
    // but later than constant 180
    let ramp = default_map();
    ramp.set_tempo_beats(Tempo::with_ramp(120.0, 180.0, 4), Beats::ZERO);
    ramp.set_tempo_beats(Tempo::new(180.0, 4), Beats::from_beats(8));

    let slow = default_map();
    let fast = TempoMap::new(Tempo::new(180.0, 4), Meter::new(4, 4), SR);

    let at = Beats::from_beats(8);
    assert!(ramp.sample_at(at) < slow.sample_at(at));
    assert!(ramp.sample_at(at) > fast.sample_at(at));
}

// ─────────────────────────────────────────────────────────────────────────────
// Rebuild stability
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_rebuild_is_idempotent() {
    let map = busy_map();
    let end = map.superclock_at(Beats::from_beats(48));
    let first: Vec<_> = map.grid(0, end, 0).iter().map(|g| g.point).collect();
    let second: Vec<_> = map.grid(0, end, 0).iter().map(|g| g.point).collect();
    assert_eq!(first, second);
}

#[test]
fn test_queries_do_not_advance_generation() {
    let map = busy_map();
    map.sample_at(Beats::from_beats(4)); // settle the lazy rebuild
    let gen = map.generation();
    map.bbt_at(map.superclock_at(Beats::from_beats(30)));
    map.quarters_at_bbt(BbtTime::new(4, 2, 0));
    assert_eq!(map.generation(), gen);

    map.set_tempo_beats(Tempo::new(99.0, 4), Beats::from_beats(40));
    assert_ne!(map.generation(), gen);
}

#[test]
fn test_update_music_times_tracks_generation() {
    let map = default_map();
    let mut beats = Beats::ZERO;
    let mut bbt = BbtTime::START;

    let sample = 48000; // one second = beat 2 at 120 qpm
    let gen = map.update_music_times(u64::MAX, sample, &mut beats, &mut bbt, false);
    assert_eq!(beats, Beats::from_beats(2));
    assert_eq!(bbt, BbtTime::new(1, 3, 0));

    // current generation: no recomputation happens
    let mut stale_beats = Beats::ZERO;
    let mut stale_bbt = BbtTime::START;
    let same = map.update_music_times(gen, sample, &mut stale_beats, &mut stale_bbt, false);
    assert_eq!(same, gen);
    assert_eq!(stale_beats, Beats::ZERO);

    // after a tempo change the same sample maps to different music time
    map.set_tempo_beats(Tempo::new(60.0, 4), Beats::ZERO);
    let next = map.update_music_times(gen, sample, &mut beats, &mut bbt, false);
    assert_ne!(next, gen);
    assert_eq!(beats, Beats::from_beats(1));
}

// ─────────────────────────────────────────────────────────────────────────────
// Editing scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_sample_of_beat_four_is_twice_beat_two() {
    let map = default_map();
    assert_eq!(
        map.sample_at(Beats::from_beats(4)),
        2 * map.sample_at(Beats::from_beats(2))
    );
}

#[test]
fn test_tempo_change_boundary_is_left_exclusive() {
    let map = default_map();
    map.set_tempo_beats(Tempo::new(140.0, 4), Beats::from_beats(8));

    let just_before = Beats::from_beats(8) - Beats::from_ticks(1);
    let before = map.tempo_at_beats(just_before);
    assert_relative_eq!(before.tempo().note_types_per_minute(), 120.0, max_relative = 1e-9);

    let at = map.tempo_at_beats(Beats::from_beats(8));
    assert_relative_eq!(at.tempo().note_types_per_minute(), 140.0, max_relative = 1e-9);
}

#[test]
fn test_initial_markers_cannot_be_removed() {
    let map = default_map();
    let t0 = map.initial_tempo();
    let m0 = map.initial_meter();

    assert!(!map.can_remove_tempo(&t0));
    assert!(!map.remove_tempo(&t0));
    assert_eq!(map.n_tempos(), 1);

    assert!(!map.can_remove_meter(&m0));
    assert!(!map.remove_meter(&m0));
    assert_eq!(map.n_meters(), 1);
}

#[test]
fn test_remove_second_tempo_restores_original_mapping() {
    let map = default_map();
    let baseline = map.sample_at(Beats::from_beats(16));

    let tp = map.set_tempo_beats(Tempo::new(70.0, 4), Beats::from_beats(8));
    assert_ne!(map.sample_at(Beats::from_beats(16)), baseline);

    assert!(map.can_remove_tempo(&tp));
    assert!(map.remove_tempo(&tp));
    assert_eq!(map.sample_at(Beats::from_beats(16)), baseline);
}

#[test]
fn test_insert_time_shifts_later_points_exactly() {
    let map = busy_map();
    let state_before = map.get_state();
    let tempos_before = map.tempos();

    let pos = map.superclock_at(Beats::from_beats(12));
    let duration = 1_000_000;
    map.insert_time(pos, duration);

    for (before, after) in tempos_before.iter().zip(map.tempos()) {
        if before.sclock() >= pos {
            assert_eq!(after.sclock(), before.sclock() + duration);
        } else {
            assert_eq!(after.sclock(), before.sclock());
        }
        assert_eq!(after.beats(), before.beats());
    }

    // removing the same span is an exact undo
    assert!(map.remove_time(pos, duration));
    assert_eq!(map.get_state(), state_before);
}

#[test]
fn test_remove_time_refuses_to_swallow_points() {
    let map = default_map();
    let tp = map.set_tempo_beats(Tempo::new(100.0, 4), Beats::from_beats(8));

    let before = map.get_state();
    assert!(!map.remove_time(tp.sclock() - 100, 200));
    assert_eq!(map.get_state(), before);
}

#[test]
fn test_move_tempo_between_neighbors() {
    let map = default_map();
    let tp = map.set_tempo_beats(Tempo::new(150.0, 4), Beats::from_beats(8));

    assert!(map.move_tempo(&tp, Position::Music(Beats::from_beats(12)), false));
    let moved = map.tempos()[1];
    assert_eq!(moved.beats(), Beats::from_beats(12));
    assert_eq!(moved.sclock(), map.superclock_at(Beats::from_beats(12)));

    // the initial tempo never moves
    let t0 = map.initial_tempo();
    assert!(!map.move_tempo(&t0, Position::Music(Beats::from_beats(2)), false));
}

#[test]
fn test_move_tempo_push_preserves_spacing() {
    let map = default_map();
    let a = map.set_tempo_beats(Tempo::new(140.0, 4), Beats::from_beats(8));
    map.set_tempo_beats(Tempo::new(160.0, 4), Beats::from_beats(16));

    assert!(map.move_tempo(&a, Position::Music(Beats::from_beats(12)), true));
    let tempos = map.tempos();
    assert_eq!(tempos[1].beats(), Beats::from_beats(12));
    assert_eq!(tempos[2].beats(), Beats::from_beats(20));

    // shifted points carry fresh BBT labels, not the pre-move ones
    assert_eq!(tempos[1].bbt(), BbtTime::new(4, 1, 0));
    assert_eq!(tempos[2].bbt(), BbtTime::new(6, 1, 0));
}

#[test]
fn test_tempo_after_ramp_lands_on_ramp_solution() {
    // a decelerating ramp reaches beat 16 later than its start rate
    // would; the inserted point must sit at the ramp solution, not the
    // linear one, or the grid behind it overtakes it
    let map = default_map();
    map.set_tempo_beats(Tempo::with_ramp(120.0, 60.0, 4), Beats::ZERO);
    let tp = map.set_tempo_beats(Tempo::new(60.0, 4), Beats::from_beats(16));

    let linear = default_map().superclock_at(Beats::from_beats(16));
    assert!(tp.sclock() > linear);
    assert_eq!(tp.sclock(), map.superclock_at(Beats::from_beats(16)));

    let mut prev = i64::MIN;
    for g in map.grid(0, map.superclock_at(Beats::from_beats(24)), 0) {
        assert!(g.point.sclock() > prev);
        prev = g.point.sclock();
    }
}

#[test]
fn test_moved_tempo_is_relabeled() {
    let map = default_map();
    let tp = map.set_tempo_beats(Tempo::new(150.0, 4), Beats::from_beats(8));

    assert!(map.move_tempo(&tp, Position::Music(Beats::from_beats(12)), false));
    let moved = map.tempos()[1];
    assert_eq!(moved.bbt(), BbtTime::new(4, 1, 0));
    assert_eq!(map.bbt_at_beats(Beats::from_beats(12)), BbtTime::new(4, 1, 0));

    // grid BBT never walks backward without a bar-renumber marker
    let end = map.superclock_at(Beats::from_beats(16));
    for pair in map.grid(0, end, 0).windows(2) {
        assert!(pair[1].point.bbt() > pair[0].point.bbt());
    }
}

#[test]
fn test_change_tempo_in_place() {
    let map = default_map();
    let tp = map.set_tempo_beats(Tempo::new(140.0, 4), Beats::from_beats(8));
    let before = map.sample_at(Beats::from_beats(16));

    assert!(map.change_tempo(&tp, Tempo::new(70.0, 4)));
    assert_eq!(map.n_tempos(), 2);
    assert_eq!(map.tempos()[1].beats(), Beats::from_beats(8));
    assert!(map.sample_at(Beats::from_beats(16)) > before);
}

#[test]
fn test_change_tempo_retargets_preceding_ramp() {
    let map = default_map();
    map.set_tempo_beats(Tempo::with_ramp(120.0, 180.0, 4), Beats::ZERO);
    let tp = map.set_tempo_beats(Tempo::new(180.0, 4), Beats::from_beats(8));
    let before = tp.sclock();

    // slowing the target stretches the ramp, moving the point itself
    assert!(map.change_tempo(&tp, Tempo::new(90.0, 4)));
    let after = map.tempos()[1].sclock();
    assert!(after > before);
    assert_eq!(map.superclock_at(Beats::from_beats(8)), after);
}

#[test]
fn test_move_meter_snaps_to_bar_start() {
    let map = default_map();
    let mp = map.set_meter_beats(Meter::new(3, 4), Beats::from_beats(8));

    // destination off the bar grid snaps under the preceding 4/4 meter
    assert!(map.move_meter(&mp, Position::Music(Beats::from_beats(13)), false));
    let moved = map.meters()[1];
    assert_eq!(moved.beats(), Beats::from_beats(12));
    assert_eq!(moved.bbt(), BbtTime::new(4, 1, 0));
    assert_eq!(map.bbt_at_beats(Beats::from_beats(15)), BbtTime::new(5, 1, 0));
}

#[test]
fn test_move_meter_push_carries_downstream_markers() {
    let map = default_map();
    let mp = map.set_meter_beats(Meter::new(3, 4), Beats::from_beats(8));
    map.set_bartime(
        BbtTime::new(50, 1, 0),
        Position::Music(Beats::from_beats(14)),
    );

    assert!(map.move_meter(&mp, Position::Music(Beats::from_beats(12)), true));
    assert_eq!(map.meters()[1].beats(), Beats::from_beats(12));
    assert_eq!(map.meters()[1].bbt(), BbtTime::new(4, 1, 0));
    assert_eq!(map.bartimes()[0].beats(), Beats::from_beats(18));
    assert_eq!(map.bartimes()[0].bbt(), BbtTime::new(50, 1, 0));
}

#[test]
fn test_remove_bartime_restores_numbering() {
    let map = default_map();
    let btp = map.set_bartime(
        BbtTime::new(100, 1, 0),
        Position::Music(Beats::from_beats(16)),
    );
    assert_eq!(map.bbt_at_beats(Beats::from_beats(20)), BbtTime::new(101, 1, 0));

    assert!(map.remove_bartime(&btp));
    assert_eq!(map.n_bartimes(), 0);
    assert_eq!(map.bbt_at_beats(Beats::from_beats(20)), BbtTime::new(6, 1, 0));

    assert!(!map.remove_bartime(&btp));
}

#[test]
fn test_remove_time_refuses_reordering_shift() {
    let map = default_map();
    map.set_tempo_beats(Tempo::new(100.0, 4), Beats::from_beats(8));
    let one_beat = map.superclock_at(Beats::from_beats(1));

    // three beats removed would drop the beat-8 tempo behind the
    // implicit grid that precedes it
    let before = map.get_state();
    let pos = 2 * one_beat;
    assert!(!map.remove_time(pos, 3 * one_beat));
    assert_eq!(map.get_state(), before);

    // a shift smaller than the slack to the previous beat succeeds
    assert!(map.remove_time(pos, one_beat / 2));
    let mut prev = i64::MIN;
    for g in map.grid(0, map.superclock_at(Beats::from_beats(12)), 0) {
        assert!(g.point.sclock() > prev);
        prev = g.point.sclock();
    }
}

#[test]
fn test_quarters_stay_monotonic_across_inserted_gap() {
    let map = default_map();
    map.set_tempo_beats(Tempo::new(100.0, 4), Beats::from_beats(8));
    let one_beat = map.superclock_at(Beats::from_beats(1));

    map.insert_time(6 * one_beat, 4 * one_beat);

    // inside the gap the mapping holds at the next point's beat value
    assert_eq!(map.quarters_at(12 * one_beat), Beats::from_beats(8));

    let step = one_beat / 8;
    let mut prev = map.quarters_at(0);
    let mut sc = step;
    while sc <= 14 * one_beat {
        let q = map.quarters_at(sc);
        assert!(q >= prev, "quarters regressed at sc {}", sc);
        prev = q;
        sc += step;
    }
}

#[test]
fn test_walking_helpers_agree() {
    let map = busy_map();
    let start = map.sample_at(Beats::from_beats(2));

    let distance = map.sample_at(Beats::from_beats(6)) - start;
    assert_eq!(
        map.samplewalk_to_quarters(start, distance),
        Beats::from_beats(4)
    );
    assert_eq!(
        map.sample_plus_quarters_as_samples(start, Beats::from_beats(4)),
        start + distance
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistence and notification
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_json_round_trip_preserves_mapping() {
    let map = busy_map();
    let json = map.get_state().to_json().unwrap();
    let restored = TempoMap::from_state(TempoMapState::from_json(&json).unwrap()).unwrap();

    for beat in [0i64, 5, 10, 20, 30, 40] {
        let qn = Beats::from_beats(beat);
        assert_eq!(restored.sample_at(qn), map.sample_at(qn));
        assert_eq!(restored.bbt_at_beats(qn), map.bbt_at_beats(qn));
    }
    assert_eq!(restored.n_bartimes(), 1);
}

#[test]
fn test_observers_fire_once_per_mutation() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let map = default_map();
    let count = Arc::new(AtomicUsize::new(0));
    let count2 = Arc::clone(&count);
    map.subscribe(move |_start, _end| {
        count2.fetch_add(1, Ordering::SeqCst);
    });

    map.set_tempo_beats(Tempo::new(130.0, 4), Beats::from_beats(4));
    map.set_meter_beats(Meter::new(3, 4), Beats::from_beats(8));
    map.sample_at(Beats::from_beats(16)); // queries never notify
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_sample_positions_follow_rate() {
    let map = default_map();
    // beat 1 at 120 qpm: half a second at any rate
    assert_eq!(map.sample_at(Beats::from_beats(1)), SR as i64 / 2);

    let hi = TempoMap::new(Tempo::new(120.0, 4), Meter::new(4, 4), 96000);
    assert_eq!(hi.sample_at(Beats::from_beats(1)), 48000);
    assert_eq!(
        superclock_to_samples(hi.superclock_at(Beats::from_beats(1)), 96000),
        48000
    );
}
