//! Pattern Sequencer: the single source of truth for song time.
//!
//! Owns tick/row/order position plus the transient flow-control state
//! (pending jumps, pattern loop, pattern delay) that tracker effects poke
//! at from inside the row callback. Every field that a callback might touch
//! reentrantly is wrapped in `Cell`, so `process` and its setters all take
//! `&self` — a callback can hold a shared reference to the sequencer while
//! also holding `&mut self` on its own state.

use alloc::vec::Vec;
use core::cell::Cell;

/// Tick-based (MOD/MMD, BPM controls tick duration) vs frame-based
/// (AHX/HVL, the "BPM" field holds a frame rate in Hz).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequencerMode {
    TickBased,
    FrameBased,
}

/// Current playback position, as reported by `PatternSequencer::position`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub order_index: u16,
    pub pattern_number: u16,
    pub row: u16,
}

/// Callbacks invoked from inside `PatternSequencer::process`.
///
/// `seq` is the sequencer that's driving the callback; implementors may
/// call back into its flow-control methods (`pattern_break`,
/// `position_jump`, `set_speed`, ...) to react to row effects.
pub trait SequencerCallbacks {
    fn on_tick(&mut self, seq: &PatternSequencer, tick: u8);
    fn on_row(&mut self, seq: &PatternSequencer, order_index: u16, pattern_number: u16, row: u16);
    fn on_pattern_change(&mut self, seq: &PatternSequencer, order_index: u16, pattern_number: u16) {
        let _ = (seq, order_index, pattern_number);
    }
    /// Consulted when playback runs past `loop_end`. Return `true` to allow
    /// looping (subject to `looping_enabled`), `false` to stop for good.
    fn on_song_end(&mut self, seq: &PatternSequencer) -> bool {
        let _ = seq;
        true
    }
}

pub struct PatternSequencer {
    pattern_order: Vec<u16>,
    rows_per_pattern: u16,

    mode: Cell<SequencerMode>,
    playing: Cell<bool>,

    current_order: Cell<u16>,
    current_row: Cell<u16>,
    tick: Cell<u8>,
    speed: Cell<u8>,
    bpm: Cell<u8>,

    samples_per_tick: Cell<f64>,
    sample_accumulator: Cell<f64>,

    loop_start: Cell<u16>,
    loop_end: Cell<u16>,
    looping_enabled: Cell<bool>,

    pattern_loop_row: Cell<u16>,
    pattern_loop_count: Cell<u8>,
    pattern_loop_target: Cell<u8>,
    pattern_loop_pending: Cell<bool>,

    pattern_delay: Cell<u8>,
    in_pattern_delay: Cell<bool>,

    jump_pending: Cell<bool>,
    jump_to_order: Cell<u16>,
    jump_to_row: Cell<u16>,
}

impl PatternSequencer {
    pub fn new() -> Self {
        Self {
            pattern_order: Vec::new(),
            rows_per_pattern: 64,
            mode: Cell::new(SequencerMode::TickBased),
            playing: Cell::new(false),
            current_order: Cell::new(0),
            current_row: Cell::new(0),
            tick: Cell::new(0),
            speed: Cell::new(6),
            bpm: Cell::new(125),
            samples_per_tick: Cell::new(0.0),
            sample_accumulator: Cell::new(0.0),
            loop_start: Cell::new(0),
            loop_end: Cell::new(0),
            looping_enabled: Cell::new(true),
            pattern_loop_row: Cell::new(0),
            pattern_loop_count: Cell::new(0),
            pattern_loop_target: Cell::new(0),
            pattern_loop_pending: Cell::new(false),
            pattern_delay: Cell::new(0),
            in_pattern_delay: Cell::new(false),
            jump_pending: Cell::new(false),
            jump_to_order: Cell::new(0),
            jump_to_row: Cell::new(0),
        }
    }

    /// Must be called before `start`.
    pub fn set_mode(&mut self, mode: SequencerMode) {
        self.mode.set(mode);
    }

    pub fn mode(&self) -> SequencerMode {
        self.mode.get()
    }

    /// Replace the order list and reset position. Default loop is the
    /// whole song.
    pub fn set_song(&mut self, pattern_order: Vec<u16>, rows_per_pattern: u16) {
        let order_length = pattern_order.len() as u16;
        self.pattern_order = pattern_order;
        self.rows_per_pattern = rows_per_pattern;
        self.current_order.set(0);
        self.current_row.set(0);
        self.tick.set(0);
        self.loop_start.set(0);
        self.loop_end.set(order_length.saturating_sub(1));
    }

    pub fn order_length(&self) -> u16 {
        self.pattern_order.len() as u16
    }

    pub fn rows_per_pattern(&self) -> u16 {
        self.rows_per_pattern
    }

    fn pattern_number_at(&self, order: u16) -> u16 {
        self.pattern_order.get(order as usize).copied().unwrap_or(0)
    }

    /// Start from `loop_start`, clear pending flow flags, reset the
    /// accumulator. Does not fire `on_pattern_change` (unlike the original
    /// source); the player reads `position()` directly after start.
    pub fn start(&self) {
        self.playing.set(true);
        self.current_order.set(self.loop_start.get());
        self.current_row.set(0);
        self.tick.set(0);
        self.sample_accumulator.set(0.0);
        self.pattern_loop_row.set(0);
        self.pattern_loop_count.set(0);
        self.pattern_loop_pending.set(false);
        self.pattern_delay.set(0);
        self.in_pattern_delay.set(false);
        self.jump_pending.set(false);
    }

    pub fn stop(&self) {
        self.playing.set(false);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.get()
    }

    pub fn set_bpm(&self, bpm: u16) {
        self.bpm.set(bpm.clamp(32, 255) as u8);
    }

    pub fn bpm(&self) -> u16 {
        self.bpm.get() as u16
    }

    pub fn set_speed(&self, speed: u8) {
        self.speed.set(speed.clamp(1, 31));
    }

    pub fn speed(&self) -> u8 {
        self.speed.get()
    }

    /// `(0, 0)` means "loop the whole song".
    pub fn set_loop_range(&self, start: u16, end: u16) {
        self.loop_start.set(start);
        if start == 0 && end == 0 {
            self.loop_end.set(self.order_length().saturating_sub(1));
        } else {
            self.loop_end.set(end);
        }
    }

    pub fn set_looping(&self, enabled: bool) {
        self.looping_enabled.set(enabled);
    }

    pub fn position(&self) -> Position {
        Position {
            order_index: self.current_order.get(),
            pattern_number: self.pattern_number_at(self.current_order.get()),
            row: self.current_row.get(),
        }
    }

    pub fn song_length(&self) -> u16 {
        self.order_length()
    }

    /// Immediate seek. Unlike `pattern_sequencer_set_position` in the
    /// original source, this does not fire `on_pattern_change` itself —
    /// `&self` setters never hold callback context (see `start()` above).
    /// Callers that need the notification re-read `position()` after this
    /// returns and fire their own callback with it, the same pattern
    /// `RegrooveController`'s `on_pattern_change` handler uses. Documented
    /// as a deliberate divergence in DESIGN.md.
    pub fn set_position(&self, order: u16, row: u16) {
        if order < self.order_length() {
            self.current_order.set(order);
            self.current_row.set(row);
            self.tick.set(0);
            self.sample_accumulator.set(0.0);
        }
    }

    /// Advance to next order at `row` on the next row boundary.
    pub fn pattern_break(&self, row: u16) {
        self.jump_pending.set(true);
        self.jump_to_order.set(self.current_order.get() + 1);
        self.jump_to_row.set(row);
    }

    /// Seek to `(order, 0)` on the next row boundary.
    pub fn position_jump(&self, order: u16) {
        self.jump_pending.set(true);
        self.jump_to_order.set(order);
        self.jump_to_row.set(0);
    }

    /// Combined B+D behavior: seek to `(order, row)` on the next row boundary.
    pub fn jump_to(&self, order: u16, row: u16) {
        self.jump_pending.set(true);
        self.jump_to_order.set(order);
        self.jump_to_row.set(row);
    }

    /// Record the current row as the pattern loop's return point (E60).
    pub fn set_pattern_loop_start(&self) {
        self.pattern_loop_row.set(self.current_row.get());
    }

    /// Repeat back to the recorded row up to `count` times (E6x, x != 0).
    /// The counter is per-order: it is cleared whenever the order changes.
    pub fn execute_pattern_loop(&self, count: u8) {
        if self.pattern_loop_count.get() == 0 {
            self.pattern_loop_count.set(1);
            self.pattern_loop_target.set(count);
            self.pattern_loop_pending.set(true);
        } else if self.pattern_loop_count.get() < self.pattern_loop_target.get() {
            self.pattern_loop_count.set(self.pattern_loop_count.get() + 1);
            self.pattern_loop_pending.set(true);
        } else {
            self.pattern_loop_count.set(0);
            self.pattern_loop_pending.set(false);
        }
    }

    /// Re-time the current row `count` extra times without re-triggering
    /// notes (EEx). A no-op if a delay is already in progress.
    pub fn pattern_delay(&self, count: u8) {
        if !self.in_pattern_delay.get() {
            self.pattern_delay.set(count);
        }
    }

    pub fn current_tick(&self) -> u8 {
        self.tick.get()
    }

    pub fn samples_per_tick(&self) -> f64 {
        self.samples_per_tick.get()
    }

    fn recalculate_timing(&self, sample_rate: u32) {
        self.samples_per_tick.set(match self.mode.get() {
            SequencerMode::TickBased => (2.5 * sample_rate as f64) / self.bpm.get() as f64,
            SequencerMode::FrameBased => sample_rate as f64 / self.bpm.get() as f64,
        });
    }

    /// Advance the accumulator by `frames` frames at `sample_rate`, issuing
    /// `on_tick`/`on_row`/`on_pattern_change`/`on_song_end` callbacks as
    /// ticks and rows are crossed. `samples_per_tick` is recomputed once at
    /// the start of the call, so a BPM/speed change made via a row effect
    /// during this call takes effect starting with the *next* call.
    pub fn process(&self, frames: u32, sample_rate: u32, callbacks: &mut impl SequencerCallbacks) {
        if !self.playing.get() || self.pattern_order.is_empty() {
            return;
        }

        self.recalculate_timing(sample_rate);

        for _ in 0..frames {
            if self.sample_accumulator.get() >= self.samples_per_tick.get() {
                self.sample_accumulator.set(self.sample_accumulator.get() - self.samples_per_tick.get());

                if self.pattern_loop_pending.get() {
                    self.pattern_loop_pending.set(false);
                    self.current_row.set(self.pattern_loop_row.get());
                    self.tick.set(0);
                    self.sample_accumulator.set(self.sample_accumulator.get() + 1.0);
                    continue;
                }

                callbacks.on_tick(self, self.tick.get());
                self.tick.set(self.tick.get() + 1);

                if self.tick.get() >= self.speed.get() {
                    self.tick.set(0);

                    if self.pattern_delay.get() > 0 {
                        self.pattern_delay.set(self.pattern_delay.get() - 1);
                        self.in_pattern_delay.set(true);
                        self.sample_accumulator.set(self.sample_accumulator.get() + 1.0);
                        continue;
                    }
                    self.in_pattern_delay.set(false);

                    let order = self.current_order.get();
                    let pattern_num = self.pattern_number_at(order);
                    let row = self.current_row.get();
                    callbacks.on_row(self, order, pattern_num, row);

                    if self.jump_pending.get() {
                        self.jump_pending.set(false);
                        let mut target = self.jump_to_order.get();
                        if target >= self.order_length() {
                            target = 0;
                        }
                        self.current_order.set(target);
                        self.current_row.set(self.jump_to_row.get());
                        self.pattern_loop_row.set(0);
                        self.pattern_loop_count.set(0);

                        let pattern_num = self.pattern_number_at(target);
                        callbacks.on_pattern_change(self, target, pattern_num);
                    } else {
                        self.current_row.set(self.current_row.get() + 1);

                        if self.current_row.get() >= self.rows_per_pattern {
                            self.current_row.set(0);
                            let next_order = self.current_order.get() + 1;
                            self.current_order.set(next_order);
                            self.pattern_loop_row.set(0);
                            self.pattern_loop_count.set(0);

                            if next_order > self.loop_end.get() {
                                let should_continue = callbacks.on_song_end(self);
                                if should_continue && self.looping_enabled.get() {
                                    self.current_order.set(self.loop_start.get());
                                } else {
                                    self.playing.set(false);
                                    return;
                                }
                            }

                            let order = self.current_order.get();
                            let pattern_num = self.pattern_number_at(order);
                            callbacks.on_pattern_change(self, order, pattern_num);
                        }
                    }
                }
            }

            self.sample_accumulator.set(self.sample_accumulator.get() + 1.0);
        }
    }
}

impl Default for PatternSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TraceCallbacks {
        ticks: Vec<u8>,
        rows: Vec<(u16, u16, u16)>,
        pattern_changes: Vec<(u16, u16)>,
    }

    impl SequencerCallbacks for TraceCallbacks {
        fn on_tick(&mut self, _seq: &PatternSequencer, tick: u8) {
            self.ticks.push(tick);
        }
        fn on_row(&mut self, _seq: &PatternSequencer, order_index: u16, pattern_number: u16, row: u16) {
            self.rows.push((order_index, pattern_number, row));
        }
        fn on_pattern_change(&mut self, _seq: &PatternSequencer, order_index: u16, pattern_number: u16) {
            self.pattern_changes.push((order_index, pattern_number));
        }
    }

    fn make_seq(order: Vec<u16>, rows_per_pattern: u16) -> PatternSequencer {
        let mut seq = PatternSequencer::new();
        seq.set_mode(SequencerMode::TickBased);
        seq.set_song(order, rows_per_pattern);
        seq.set_speed(6);
        seq.set_bpm(125);
        seq.start();
        seq
    }

    #[test]
    fn tick_rate_matches_bpm_over_ten_seconds() {
        let seq = make_seq(vec![0, 1, 2, 3, 4, 5, 6, 7], 64);
        let mut cb = TraceCallbacks::default();
        seq.process(480_000, 48000, &mut cb);
        // bpm=125 tick-based: ticks/sec = bpm * 2 / 5 = 50
        let expected = 125 * 2 / 5 * 10;
        assert!((cb.ticks.len() as i64 - expected as i64).unsigned_abs() <= 1);
    }

    #[test]
    fn row_advances_after_speed_ticks() {
        let seq = make_seq(vec![0], 64);
        let mut cb = TraceCallbacks::default();
        // samples_per_tick at 48000/125 = 960; 6 ticks/row = 5760 samples/row
        seq.process(5760, 48000, &mut cb);
        assert!(cb.rows.len() >= 1);
        assert_eq!(cb.rows[0], (0, 0, 0));
    }

    #[test]
    fn pattern_break_bcd_advances_order_and_sets_row() {
        let seq = make_seq(vec![0, 1], 64);
        let mut cb = TraceCallbacks::default();
        // Drive to the first row, then request a pattern break as if D16 fired.
        seq.process(960 * 6, 48000, &mut cb);
        seq.pattern_break(16);
        seq.process(960 * 6, 48000, &mut cb);
        let pos = seq.position();
        assert_eq!(pos.order_index, 1);
        assert_eq!(pos.row, 16);
    }

    #[test]
    fn jump_to_lands_exactly_on_next_row_boundary() {
        let seq = make_seq(vec![0, 1, 2], 64);
        seq.jump_to(2, 10);
        let mut cb = TraceCallbacks::default();
        seq.process(960 * 6, 48000, &mut cb);
        assert_eq!(seq.position(), Position { order_index: 2, pattern_number: 2, row: 10 });
    }

    #[test]
    fn pattern_loop_e6x_repeats_rows() {
        let seq = make_seq(vec![0], 64);
        let mut cb = TraceCallbacks::default();
        let samples_per_row = 960 * 6;

        // Drive rows 0..=6, arming the loop at row 2 and firing the loop at row 6.
        for row in 0..=6u16 {
            seq.process(samples_per_row, 48000, &mut cb);
            if row == 2 {
                seq.set_pattern_loop_start();
            }
            if row == 6 {
                seq.execute_pattern_loop(2);
            }
        }
        // First loop iteration: jump back to row 2.
        seq.process(samples_per_row, 48000, &mut cb);
        assert_eq!(seq.position().row, 2);
    }

    #[test]
    fn stop_then_process_is_noop() {
        let seq = make_seq(vec![0], 64);
        seq.stop();
        let mut cb = TraceCallbacks::default();
        seq.process(48000, 48000, &mut cb);
        assert!(cb.ticks.is_empty());
    }

    #[test]
    fn position_set_position_is_immediate() {
        let seq = make_seq(vec![0, 1, 2], 64);
        seq.set_position(2, 5);
        assert_eq!(seq.position(), Position { order_index: 2, pattern_number: 2, row: 5 });
    }

    #[test]
    fn frame_based_mode_uses_bpm_as_frame_rate() {
        let mut seq = PatternSequencer::new();
        seq.set_mode(SequencerMode::FrameBased);
        seq.set_song(vec![0], 64);
        seq.set_bpm(50);
        seq.start();
        let mut cb = TraceCallbacks::default();
        seq.process(48000, 48000, &mut cb);
        assert!((cb.ticks.len() as i64 - 50).unsigned_abs() <= 1);
    }
}
