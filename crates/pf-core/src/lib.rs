//! pf-core: Foundational time types for Pulseframe
//!
//! This crate provides the primitive time representations shared by every
//! Pulseframe crate:
//! - Superclock: high-resolution absolute time ticks
//! - Beats: exact quarter-note counts
//! - BBT: bars|beats|ticks musical positions

mod bbt;
mod beats;
mod error;
mod superclock;

pub use bbt::*;
pub use beats::*;
pub use error::*;
pub use superclock::*;

/// Which representation is authoritative when a position is ambiguous.
///
/// A tempo map is only ever in `AudioTime` or `BeatTime`; `BarTime` exists
/// for marker anchoring but is not a legal map domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum TimeDomain {
    #[default]
    AudioTime,
    BeatTime,
    BarTime,
}

/// A position on the timeline, tagged with the domain it was expressed in.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Position {
    /// Superclock ticks from timeline origin
    Audio(Superclock),
    /// Quarter notes from timeline origin
    Music(Beats),
}

impl From<Superclock> for Position {
    fn from(sc: Superclock) -> Self {
        Self::Audio(sc)
    }
}

impl From<Beats> for Position {
    fn from(b: Beats) -> Self {
        Self::Music(b)
    }
}
