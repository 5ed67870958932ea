//! Sample payload types shared by the MOD and MMD players.

use alloc::vec::Vec;
use arrayvec::ArrayString;

/// A PCM sample as parsed from a MOD or MMD file.
///
/// `finetune` only applies to MOD samples; MMD samples carry their own
/// per-instrument tuning via `c4_speed` instead (see the MMD player).
#[derive(Clone, Debug)]
pub struct Sample {
    pub name: ArrayString<26>,
    pub data: SampleData,
    /// Loop window start, in sample frames (not bytes).
    pub repeat_start: u32,
    /// Loop window length, in sample frames. `<= 1` means "no loop".
    pub repeat_length: u32,
    pub default_volume: u8,
    /// Finetune in [-8, 7], MOD-style.
    pub finetune: i8,
    /// Playback rate, in Hz, that reproduces the sample at its recorded pitch.
    pub c4_speed: u32,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            data: SampleData::Mono8(Vec::new()),
            repeat_start: 0,
            repeat_length: 0,
            default_volume: 64,
            finetune: 0,
            c4_speed: 8363,
        }
    }
}

impl Sample {
    pub fn new(name: &str) -> Self {
        let mut sample = Self::default();
        let _ = sample.name.try_push_str(name);
        sample
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn has_loop(&self) -> bool {
        self.repeat_length > 1
    }

    /// End of the loop window (exclusive), in frames.
    pub fn repeat_end(&self) -> u32 {
        self.repeat_start + self.repeat_length
    }
}

/// Sample audio payload. Stereo source material is downmixed to mono at
/// load time (per-format loaders do this), so only mono variants exist here.
#[derive(Clone, Debug)]
pub enum SampleData {
    Mono8(Vec<i8>),
    Mono16(Vec<i16>),
}

impl SampleData {
    pub fn len(&self) -> usize {
        match self {
            SampleData::Mono8(v) => v.len(),
            SampleData::Mono16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample value at `pos`, normalized to [-1.0, 1.0]. Out-of-range reads
    /// return silence rather than panicking, since voice position can briefly
    /// overshoot by less than one frame before loop wrap is applied.
    pub fn get_normalized(&self, pos: usize) -> f32 {
        match self {
            SampleData::Mono8(v) => v.get(pos).copied().unwrap_or(0) as f32 / 128.0,
            SampleData::Mono16(v) => v.get(pos).copied().unwrap_or(0) as f32 / 32768.0,
        }
    }
}
