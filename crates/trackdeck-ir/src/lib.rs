//! Core IR types for the tracker playback engine.
//!
//! Defines the data shared by every format player: samples, patterns,
//! effects, the period/sine lookup tables, and the stereo mixer. Format
//! parsers in `trackdeck-formats` produce these types; `trackdeck-engine`
//! and `trackdeck-formats` consume them.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod effects;
mod error;
mod mixer;
mod pattern;
mod period;
mod sample;
mod sine;

pub use effects::Effect;
pub use error::{LoadError, LoadResult};
pub use mixer::{mix_stereo, mmd_pan_to_normalized, pan_to_gains, MixerVoice};
pub use pattern::{Cell, Pattern};
pub use period::{
    clamp_period, note_to_period, period_to_frequency, shift_period_by_semitones, PAL_CLOCK_HZ, PERIOD_MAX,
    PERIOD_MIN,
};
pub use sample::{Sample, SampleData};
pub use sine::sine;

/// An ordered sequence of pattern indices plus the loop range over it.
///
/// Shared shape for MOD/MMD order lists; AHX position lists reuse it too
/// (with `patterns` entries addressing AHX's own per-position track set).
#[derive(Clone, Debug, Default)]
pub struct OrderList {
    pub entries: alloc::vec::Vec<u16>,
}

impl OrderList {
    pub fn new(entries: alloc::vec::Vec<u16>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pattern_at(&self, order: usize) -> Option<u16> {
        self.entries.get(order).copied()
    }
}
