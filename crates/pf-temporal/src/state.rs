//! Tempo map persistence
//!
//! Only the explicit lists are serialized; the dense grid and ramp
//! coefficients are derived and regenerated after load. Snapshots carry a
//! version tag and loading an unknown version is an explicit error, never a
//! silent best-effort parse.

use serde::{Deserialize, Serialize};

use pf_core::{BbtTime, Beats, TemporalError, TemporalResult, TimeDomain};

use crate::map::TempoMap;
use crate::points::{MeterPoint, MusicTimePoint, TempoPoint};

/// Current snapshot format version.
pub const TEMPO_MAP_STATE_VERSION: u32 = 1;

/// Serializable snapshot of a tempo map's explicit state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoMapState {
    pub version: u32,
    pub time_domain: TimeDomain,
    pub sample_rate: u32,
    pub tempos: Vec<TempoPoint>,
    pub meters: Vec<MeterPoint>,
    pub bartimes: Vec<MusicTimePoint>,
}

impl TempoMapState {
    /// Structural checks applied before a snapshot is allowed to replace a
    /// live map.
    fn validate(&self) -> TemporalResult<()> {
        if self.version != TEMPO_MAP_STATE_VERSION {
            return Err(TemporalError::UnsupportedStateVersion(self.version));
        }
        if self.time_domain == TimeDomain::BarTime {
            return Err(TemporalError::BarTimeDomain);
        }
        if self.tempos.is_empty() {
            return Err(TemporalError::InvalidParam(
                "tempo map state has no tempo".into(),
            ));
        }
        if self.meters.is_empty() {
            return Err(TemporalError::InvalidParam(
                "tempo map state has no meter".into(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(TemporalError::InvalidParam(
                "tempo map state has zero sample rate".into(),
            ));
        }

        let sorted_t = self.tempos.windows(2).all(|w| w[0].beats() < w[1].beats());
        let sorted_m = self.meters.windows(2).all(|w| w[0].beats() < w[1].beats());
        let sorted_b = self
            .bartimes
            .windows(2)
            .all(|w| w[0].beats() < w[1].beats());
        if !(sorted_t && sorted_m && sorted_b) {
            return Err(TemporalError::InvalidParam(
                "tempo map state is not strictly ordered".into(),
            ));
        }

        // grid generation assumes every explicit point sits on a beat
        let whole = |b: Beats| b.is_whole();
        if !self.tempos.iter().all(|t| whole(t.beats()))
            || !self.meters.iter().all(|m| whole(m.beats()))
            || !self.bartimes.iter().all(|b| whole(b.beats()))
        {
            return Err(TemporalError::InvalidParam(
                "tempo map state has off-beat points".into(),
            ));
        }

        if self.tempos[0].beats() != Beats::ZERO || self.meters[0].beats() != Beats::ZERO {
            return Err(TemporalError::InvalidParam(
                "tempo map state must anchor initial points at zero".into(),
            ));
        }

        Ok(())
    }

    pub fn to_json(&self) -> TemporalResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TemporalError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> TemporalResult<Self> {
        serde_json::from_str(json).map_err(|e| TemporalError::Serialization(e.to_string()))
    }
}

impl TempoMap {
    /// Snapshot the explicit state for persistence.
    pub fn get_state(&self) -> TempoMapState {
        self.with_lists(|tempos, meters, bartimes, sample_rate, time_domain| TempoMapState {
            version: TEMPO_MAP_STATE_VERSION,
            time_domain,
            sample_rate,
            tempos: tempos.to_vec(),
            meters: meters.to_vec(),
            bartimes: bartimes.to_vec(),
        })
    }

    /// Atomically replace the whole map from a snapshot. On error the map
    /// is untouched.
    pub fn set_state(&self, state: TempoMapState) -> TemporalResult<()> {
        state.validate()?;
        self.replace_lists(
            state.tempos,
            state.meters,
            state.bartimes,
            state.sample_rate,
            state.time_domain,
        );
        Ok(())
    }

    /// Build a fresh map from a snapshot.
    pub fn from_state(state: TempoMapState) -> TemporalResult<TempoMap> {
        state.validate()?;
        let map = TempoMap::new(
            *state.tempos[0].tempo(),
            *state.meters[0].meter(),
            state.sample_rate,
        );
        map.replace_lists(
            state.tempos,
            state.meters,
            state.bartimes,
            state.sample_rate,
            state.time_domain,
        );
        Ok(map)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
