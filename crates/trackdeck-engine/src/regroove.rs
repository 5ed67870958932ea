//! Regroove Controller: row-precise looping, a command queue, and pattern
//! mode layered on top of a plain `PatternSequencer`.
//!
//! The controller does not own the sequencer it wraps and never advances
//! time itself — every effect it has on playback is expressed as a request
//! (`jump_to`, `set_position`) made back to the sequencer from inside the
//! sequencer's own callbacks.

use core::cell::{Cell, RefCell};
use heapless::Deque;

use crate::sequencer::{PatternSequencer, SequencerCallbacks};

const COMMAND_QUEUE_CAPACITY: usize = 16;
const MAX_CHANNELS: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Off,
    Armed,
    Active,
}

/// A `(order, row)` position, ordered lexicographically by `(order, row)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RowPosition {
    pub order: u16,
    pub row: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternMode {
    Off,
    Single,
    /// Reserved; currently behaves identically to `Off`.
    Chain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    JumpToOrder(u16),
    NextOrder,
    PrevOrder,
    RetriggerPattern,
    ToggleChannelMute(u8),
    SetChannelSolo(u8, bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self { kind }
    }
}

/// Extended callback set the controller forwards to, layered on top of the
/// plain sequencer callbacks.
pub trait RegrooveCallbacks {
    fn on_tick(&mut self, seq: &PatternSequencer, tick: u8);
    fn on_row(&mut self, seq: &PatternSequencer, order_index: u16, pattern_number: u16, row: u16);
    fn on_pattern_change(&mut self, seq: &PatternSequencer, order_index: u16, pattern_number: u16) {
        let _ = (seq, order_index, pattern_number);
    }
    fn on_song_end(&mut self, seq: &PatternSequencer) -> bool {
        let _ = seq;
        true
    }
    fn on_loop_trigger(&mut self, seq: &PatternSequencer) {
        let _ = seq;
    }
    fn on_command_executed(&mut self, seq: &PatternSequencer, kind: CommandKind) {
        let _ = (seq, kind);
    }
}

pub struct RegrooveController {
    loop_state: Cell<LoopState>,
    loop_start: Cell<RowPosition>,
    loop_end: Cell<RowPosition>,

    pattern_mode: Cell<PatternMode>,
    locked_order: Cell<u16>,

    execute_on_pattern_boundary: Cell<bool>,
    queue: RefCell<Deque<Command, COMMAND_QUEUE_CAPACITY>>,

    channel_mute: RefCell<[bool; MAX_CHANNELS]>,
    channel_solo: RefCell<[bool; MAX_CHANNELS]>,
    any_solo_active: Cell<bool>,
}

impl RegrooveController {
    pub fn new() -> Self {
        Self {
            loop_state: Cell::new(LoopState::Off),
            loop_start: Cell::new(RowPosition { order: 0, row: 0 }),
            loop_end: Cell::new(RowPosition { order: 0, row: 0 }),
            pattern_mode: Cell::new(PatternMode::Off),
            locked_order: Cell::new(0),
            execute_on_pattern_boundary: Cell::new(true),
            queue: RefCell::new(Deque::new()),
            channel_mute: RefCell::new([false; MAX_CHANNELS]),
            channel_solo: RefCell::new([false; MAX_CHANNELS]),
            any_solo_active: Cell::new(false),
        }
    }

    // --- Loop control -----------------------------------------------

    pub fn loop_state(&self) -> LoopState {
        self.loop_state.get()
    }

    pub fn set_loop_range_rows(&self, start_order: u16, start_row: u16, end_order: u16, end_row: u16) {
        self.loop_start.set(RowPosition { order: start_order, row: start_row });
        self.loop_end.set(RowPosition { order: end_order, row: end_row });
    }

    pub fn arm_loop(&self) {
        self.loop_state.set(LoopState::Armed);
    }

    pub fn disarm_loop(&self) {
        self.loop_state.set(LoopState::Off);
    }

    // --- Pattern mode -------------------------------------------------

    pub fn set_pattern_mode(&self, mode: PatternMode, locked_order: u16) {
        self.pattern_mode.set(mode);
        self.locked_order.set(locked_order);
    }

    pub fn pattern_mode(&self) -> PatternMode {
        self.pattern_mode.get()
    }

    // --- Command queue --------------------------------------------------

    pub fn set_execute_on_pattern_boundary(&self, enabled: bool) {
        self.execute_on_pattern_boundary.set(enabled);
    }

    /// Enqueue a command. In "free" mode (`execute_on_pattern_boundary ==
    /// false`) it is drained immediately against `seq`/`callbacks`; otherwise
    /// it waits for the next `on_pattern_change`.
    pub fn queue(&self, seq: &PatternSequencer, callbacks: &mut impl RegrooveCallbacks, command: Command) {
        if self.execute_on_pattern_boundary.get() {
            // Drop silently if full, matching a bounded FIFO's overflow policy.
            let _ = self.queue.borrow_mut().push_back(command);
        } else {
            self.execute_command(seq, callbacks, command);
        }
    }

    fn drain_queue(&self, seq: &PatternSequencer, callbacks: &mut impl RegrooveCallbacks) {
        loop {
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(command) => self.execute_command(seq, callbacks, command),
                None => break,
            }
        }
    }

    fn execute_command(&self, seq: &PatternSequencer, callbacks: &mut impl RegrooveCallbacks, command: Command) {
        match command.kind {
            CommandKind::JumpToOrder(order) => seq.position_jump(order),
            CommandKind::NextOrder => {
                let order = seq.position().order_index + 1;
                seq.position_jump(order);
            }
            CommandKind::PrevOrder => {
                let order = seq.position().order_index.saturating_sub(1);
                seq.position_jump(order);
            }
            CommandKind::RetriggerPattern => {
                let order = seq.position().order_index;
                seq.set_position(order, 0);
            }
            CommandKind::ToggleChannelMute(channel) => {
                if let Some(slot) = self.channel_mute.borrow_mut().get_mut(channel as usize) {
                    *slot = !*slot;
                }
            }
            CommandKind::SetChannelSolo(channel, solo) => {
                if let Some(slot) = self.channel_solo.borrow_mut().get_mut(channel as usize) {
                    *slot = solo;
                }
                let any = self.channel_solo.borrow().iter().any(|s| *s);
                self.any_solo_active.set(any);
            }
        }
        callbacks.on_command_executed(seq, command.kind);
    }

    // --- Channel mute/solo ----------------------------------------------

    pub fn channel_mute(&self, channel: u8) -> bool {
        self.channel_mute.borrow().get(channel as usize).copied().unwrap_or(false)
    }

    /// Effective mute state for rendering: muted directly, or silenced by
    /// another channel's solo.
    pub fn channel_effectively_muted(&self, channel: u8) -> bool {
        let muted = self.channel_mute(channel);
        if muted {
            return true;
        }
        if self.any_solo_active.get() {
            !self.channel_solo.borrow().get(channel as usize).copied().unwrap_or(false)
        } else {
            false
        }
    }

    // --- Sequencer callback interception ---------------------------------

    /// Drive `seq` for `frames`, intercepting its callbacks and forwarding
    /// the (possibly modified) results to `callbacks`.
    pub fn process(
        &self,
        seq: &PatternSequencer,
        frames: u32,
        sample_rate: u32,
        callbacks: &mut impl RegrooveCallbacks,
    ) {
        let mut trampoline = Trampoline { controller: self, user: callbacks };
        seq.process(frames, sample_rate, &mut trampoline);
    }
}

impl Default for RegrooveController {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridges `SequencerCallbacks` (what `PatternSequencer::process` expects)
/// to `RegrooveCallbacks` (what the controller's caller implements),
/// applying loop/pattern-mode/command-queue logic in between.
struct Trampoline<'a, C: RegrooveCallbacks> {
    controller: &'a RegrooveController,
    user: &'a mut C,
}

impl<'a, C: RegrooveCallbacks> SequencerCallbacks for Trampoline<'a, C> {
    fn on_tick(&mut self, seq: &PatternSequencer, tick: u8) {
        self.user.on_tick(seq, tick);
    }

    fn on_row(&mut self, seq: &PatternSequencer, order_index: u16, pattern_number: u16, row: u16) {
        let controller = self.controller;
        let current = RowPosition { order: order_index, row };

        match controller.loop_state.get() {
            LoopState::Armed => {
                if current >= controller.loop_start.get() {
                    controller.loop_state.set(LoopState::Active);
                    self.user.on_loop_trigger(seq);
                }
            }
            LoopState::Active => {
                if current >= controller.loop_end.get() {
                    let start = controller.loop_start.get();
                    seq.jump_to(start.order, start.row);
                }
            }
            LoopState::Off => {}
        }

        self.user.on_row(seq, order_index, pattern_number, row);
    }

    fn on_pattern_change(&mut self, seq: &PatternSequencer, order_index: u16, pattern_number: u16) {
        let controller = self.controller;
        let (order_index, pattern_number) = if controller.pattern_mode.get() == PatternMode::Single
            && order_index != controller.locked_order.get()
        {
            seq.set_position(controller.locked_order.get(), 0);
            let pos = seq.position();
            (pos.order_index, pos.pattern_number)
        } else {
            (order_index, pattern_number)
        };

        if controller.execute_on_pattern_boundary.get() {
            controller.drain_queue(seq, self.user);
        }

        self.user.on_pattern_change(seq, order_index, pattern_number);
    }

    fn on_song_end(&mut self, seq: &PatternSequencer) -> bool {
        self.user.on_song_end(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::SequencerMode;

    #[derive(Default)]
    struct RecordingCallbacks {
        rows: alloc::vec::Vec<(u16, u16)>,
        loop_triggers: u32,
        commands_executed: alloc::vec::Vec<CommandKind>,
    }

    impl RegrooveCallbacks for RecordingCallbacks {
        fn on_tick(&mut self, _seq: &PatternSequencer, _tick: u8) {}
        fn on_row(&mut self, _seq: &PatternSequencer, order_index: u16, _pattern_number: u16, row: u16) {
            self.rows.push((order_index, row));
        }
        fn on_loop_trigger(&mut self, _seq: &PatternSequencer) {
            self.loop_triggers += 1;
        }
        fn on_command_executed(&mut self, _seq: &PatternSequencer, kind: CommandKind) {
            self.commands_executed.push(kind);
        }
    }

    fn make_seq() -> PatternSequencer {
        let mut seq = PatternSequencer::new();
        seq.set_mode(SequencerMode::TickBased);
        seq.set_song(alloc::vec![0, 1, 2, 3], 16);
        seq.set_speed(2);
        seq.set_bpm(125);
        seq.start();
        seq
    }

    #[test]
    fn armed_loop_activates_on_start_crossing_then_bounces_at_end() {
        let seq = make_seq();
        let controller = RegrooveController::new();
        controller.set_loop_range_rows(0, 2, 0, 5);
        controller.arm_loop();

        let mut cb = RecordingCallbacks::default();
        let samples_per_row = 960 * 2;
        for _ in 0..40 {
            controller.process(&seq, samples_per_row, 48000, &mut cb);
        }

        assert_eq!(controller.loop_state(), LoopState::Active);
        assert!(cb.loop_triggers >= 1);
        // Every row visited after activation must stay within [2, 5].
        let activation_index = cb.rows.iter().position(|&(_, r)| r == 2).unwrap();
        for &(_, row) in &cb.rows[activation_index..] {
            assert!(row <= 5);
        }
    }

    #[test]
    fn channel_mute_toggle_round_trips() {
        let seq = make_seq();
        let controller = RegrooveController::new();
        controller.set_execute_on_pattern_boundary(false);
        let mut cb = RecordingCallbacks::default();

        assert!(!controller.channel_mute(1));
        controller.queue(&seq, &mut cb, Command::new(CommandKind::ToggleChannelMute(1)));
        assert!(controller.channel_mute(1));
        assert_eq!(cb.commands_executed, alloc::vec![CommandKind::ToggleChannelMute(1)]);
    }

    #[test]
    fn solo_mutes_non_solo_channels() {
        let seq = make_seq();
        let controller = RegrooveController::new();
        controller.set_execute_on_pattern_boundary(false);
        let mut cb = RecordingCallbacks::default();

        controller.queue(&seq, &mut cb, Command::new(CommandKind::SetChannelSolo(0, true)));
        assert!(!controller.channel_effectively_muted(0));
        assert!(controller.channel_effectively_muted(1));
    }

    #[test]
    fn pattern_boundary_queue_executes_exactly_once() {
        let seq = make_seq();
        let controller = RegrooveController::new();
        controller.set_execute_on_pattern_boundary(true);
        let mut cb = RecordingCallbacks::default();

        controller.queue(&seq, &mut cb, Command::new(CommandKind::NextOrder));
        // Command shouldn't have executed yet (no pattern boundary crossed).
        assert!(cb.commands_executed.is_empty());

        let samples_per_row = 960 * 2;
        for _ in 0..(16 + 1) {
            controller.process(&seq, samples_per_row, 48000, &mut cb);
        }

        assert_eq!(cb.commands_executed.len(), 1);
    }

    #[test]
    fn single_pattern_mode_locks_order() {
        let seq = make_seq();
        let controller = RegrooveController::new();
        controller.set_pattern_mode(PatternMode::Single, 1);
        let mut cb = RecordingCallbacks::default();

        let samples_per_row = 960 * 2;
        for _ in 0..(16 * 3) {
            controller.process(&seq, samples_per_row, 48000, &mut cb);
        }

        assert_eq!(seq.position().order_index, 1);
    }
}
