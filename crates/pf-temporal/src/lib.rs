//! # pf-temporal — Tempo Map Engine
//!
//! Lossless mapping between the timeline's time bases:
//! - Superclock ticks and audio samples (audio time)
//! - Quarter notes (musical time)
//! - Bars/beats/ticks under a meter (presentation time)
//!
//! The [`TempoMap`] owns sparse, user-edited tempo, meter and bar-renumber
//! lists and derives a dense per-beat grid from them on demand. Constant
//! tempo spans convert with exact integer arithmetic; ramped spans use an
//! exponential model continuous at span boundaries.
//!
//! ## Architecture
//!
//! ```text
//! Tempo / Meter          (pure values)
//!   TempoPoint / MeterPoint / MusicTimePoint   (value + Point)
//!     TempoMetric        (tempo + meter snapshot for conversions)
//!       TempoMap         (lists + dense grid, RwLock, lazy rebuild)
//! ```

pub mod events;
pub mod map;
pub mod metric;
pub mod point;
pub mod points;
pub mod state;
pub mod tempo;

pub use events::{ChangeObservers, ObserverId};
pub use map::{GridPoint, TempoMap, TempoMapPoint};
pub use metric::TempoMetric;
pub use point::Point;
pub use points::{MeterPoint, MusicTimePoint, TempoPoint};
pub use state::{TempoMapState, TEMPO_MAP_STATE_VERSION};
pub use tempo::{Meter, Tempo, TempoKind};

// the foundational time types travel with the engine
pub use pf_core::{
    samples_to_superclock, superclock_to_samples, superclock_to_seconds, BbtOffset, BbtTime,
    Beats, Position, Superclock, TemporalError, TemporalResult, TimeDomain,
    SUPERCLOCK_TICKS_PER_SECOND,
};
