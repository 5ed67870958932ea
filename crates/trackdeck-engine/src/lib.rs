//! Pattern Sequencer and Regroove Controller: the timing and performance
//! layer shared by every format player in `trackdeck-formats`.
//!
//! This crate knows nothing about file formats. It owns tick/row/pattern
//! timing (`sequencer`) and the looping/command-queue/pattern-mode logic
//! layered on top of it (`regroove`); format players drive a
//! `PatternSequencer` and implement `SequencerCallbacks` to parse notes and
//! update their own voice state.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod regroove;
mod sequencer;

pub use regroove::{
    Command, CommandKind, LoopState, PatternMode, RegrooveCallbacks, RegrooveController, RowPosition,
};
pub use sequencer::{PatternSequencer, Position, SequencerCallbacks, SequencerMode};
