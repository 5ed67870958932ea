//! Tracker file format parsers and players: ProTracker MOD, OctaMED
//! MMD2/MMD3, and AHX/HVL.
//!
//! Each format module exposes a `load_*` function returning plain IR types
//! plus a `*Player` that drives a `trackdeck_engine::PatternSequencer` and
//! renders audio. `trackdeck-master` composes all three behind one facade.

extern crate alloc;

mod ahx_format;
mod bigendian;
mod effect_parser;
mod mmd_format;
mod mod_format;

pub use ahx_format::{load_ahx, AhxPlayer, AhxSong};
pub use mmd_format::{load_mmd, MmdPlayer, MmdSong};
pub use mod_format::{load_mod, ModPlayer, ModSong};

pub use trackdeck_ir::{LoadError, LoadResult};
