//! ProTracker MOD loader and player.
//!
//! The loader validates the 4-channel tag family and produces plain IR
//! types (`Sample`/`Pattern`/`OrderList`); `ModPlayer` drives a
//! `PatternSequencer` and renders the four Amiga-style voices.

use alloc::vec::Vec;
use trackdeck_engine::{PatternSequencer, RegrooveController, SequencerCallbacks, SequencerMode};
use trackdeck_ir::{mix_stereo, period_to_frequency, sine, Cell, Effect, LoadError, MixerVoice, OrderList, Pattern, Sample, SampleData};

use crate::effect_parser::parse_effect;

const NUM_CHANNELS: u8 = 4;
const ROWS_PER_PATTERN: u16 = 64;
const HEADER_SIZE: usize = 1084;
const SAMPLE_HEADER_SIZE: usize = 30;
const PATTERN_SIZE: usize = ROWS_PER_PATTERN as usize * NUM_CHANNELS as usize * 4;

/// Default Amiga hard-panning: left, right, right, left.
const DEFAULT_PAN: [f32; 4] = [-1.0, 1.0, 1.0, -1.0];

fn is_supported_tag(tag: &[u8]) -> bool {
    matches!(tag, b"M.K." | b"M!K!" | b"FLT4" | b"4CHN")
}

/// A parsed MOD song: samples, patterns and the order list, ready to drive
/// a `ModPlayer`.
#[derive(Clone, Debug)]
pub struct ModSong {
    pub samples: Vec<Sample>,
    pub patterns: Vec<Pattern>,
    pub order: OrderList,
}

pub fn load_mod(data: &[u8]) -> Result<ModSong, LoadError> {
    if data.len() < HEADER_SIZE {
        return Err(LoadError::FormatMismatch);
    }
    if !is_supported_tag(&data[1080..1084]) {
        return Err(LoadError::FormatMismatch);
    }

    let mut samples = Vec::with_capacity(31);
    for i in 0..31 {
        let offset = 20 + i * SAMPLE_HEADER_SIZE;
        samples.push(parse_sample_header(&data[offset..offset + SAMPLE_HEADER_SIZE])?);
    }

    let song_length = (data[950] as usize).min(128);
    let order_table = &data[952..952 + 128];
    let order_entries: Vec<u16> = order_table[..song_length].iter().map(|&b| b as u16).collect();
    let num_patterns = 1 + order_table.iter().copied().max().unwrap_or(0) as usize;

    let mut patterns = Vec::with_capacity(num_patterns);
    for pat_idx in 0..num_patterns {
        let offset = HEADER_SIZE + pat_idx * PATTERN_SIZE;
        if offset + PATTERN_SIZE > data.len() {
            return Err(LoadError::Corrupt);
        }
        patterns.push(parse_pattern(&data[offset..offset + PATTERN_SIZE]));
    }

    let mut sample_offset = HEADER_SIZE + num_patterns * PATTERN_SIZE;
    for sample in &mut samples {
        let len = sample.len();
        if len > 0 && sample_offset + len <= data.len() {
            let pcm: Vec<i8> = data[sample_offset..sample_offset + len].iter().map(|&b| b as i8).collect();
            sample.data = SampleData::Mono8(pcm);
            sample_offset += len;
        }
    }

    Ok(ModSong { samples, patterns, order: OrderList::new(order_entries) })
}

fn parse_sample_header(data: &[u8]) -> Result<Sample, LoadError> {
    let name_end = data[0..22].iter().position(|&b| b == 0).unwrap_or(22);
    let name = core::str::from_utf8(&data[0..name_end]).unwrap_or("").trim();

    let length_words = u16::from_be_bytes([data[22], data[23]]);
    let length_bytes = length_words as usize * 2;
    let finetune_raw = data[24] & 0x0F;
    let finetune = if finetune_raw > 7 { finetune_raw as i8 - 16 } else { finetune_raw as i8 };
    let volume = data[25].min(64);
    let repeat_start = u16::from_be_bytes([data[26], data[27]]) as u32 * 2;
    let repeat_length_words = u16::from_be_bytes([data[28], data[29]]);
    let repeat_length = repeat_length_words as u32 * 2;

    let mut sample = Sample::new(name);
    sample.default_volume = volume;
    sample.finetune = finetune;
    sample.repeat_start = repeat_start;
    sample.repeat_length = repeat_length;
    sample.c4_speed = 8363;
    sample.data = SampleData::Mono8(alloc::vec![0i8; length_bytes]);
    Ok(sample)
}

fn parse_pattern(data: &[u8]) -> Pattern {
    let mut pattern = Pattern::new(ROWS_PER_PATTERN, NUM_CHANNELS);
    for row in 0..ROWS_PER_PATTERN {
        for ch in 0..NUM_CHANNELS {
            let offset = (row as usize * NUM_CHANNELS as usize + ch as usize) * 4;
            *pattern.cell_mut(row, ch) = parse_cell(&data[offset..offset + 4]);
        }
    }
    pattern
}

fn parse_cell(data: &[u8]) -> Cell {
    let sample = (data[0] & 0xF0) | ((data[2] & 0xF0) >> 4);
    let period = ((data[0] & 0x0F) as u16) << 8 | data[1] as u16;
    let effect_cmd = data[2] & 0x0F;
    let effect_param = data[3];
    Cell { period, sample, effect: parse_effect(effect_cmd, effect_param) }
}

/// Per-voice playback state. Field layout mirrors the grounding player's
/// channel struct: one bound sample, fractional playback position, and the
/// slide/vibrato/tremolo/retrigger state that tracker effects mutate.
#[derive(Clone, Debug)]
struct ModChannel {
    sample: u8,
    position: f64,
    period: u16,
    volume: u8,
    finetune: i8,
    pan: f32,
    muted: bool,
    user_volume: f32,
    current_tick: u8,

    last_effect: Effect,
    portamento_target: u16,
    vibrato_pos: u8,
    vibrato_speed: u8,
    vibrato_depth: u8,
    tremolo_pos: u8,
    tremolo_speed: u8,
    tremolo_depth: u8,
    retrigger_count: u8,

    pending_note: Option<(Cell, u8)>,

    last_porta_up: u8,
    last_porta_down: u8,
    last_tone_porta: u8,
    last_volume_slide: i8,
    last_sample_offset: u8,
    last_sample_with_offset: u8,
}

impl ModChannel {
    fn new(index: u8) -> Self {
        Self {
            sample: 0,
            position: 0.0,
            period: 0,
            volume: 0,
            finetune: 0,
            pan: DEFAULT_PAN[index as usize % 4],
            muted: false,
            user_volume: 1.0,
            current_tick: 0,
            last_effect: Effect::None,
            portamento_target: 0,
            vibrato_pos: 0,
            vibrato_speed: 0,
            vibrato_depth: 0,
            tremolo_pos: 0,
            tremolo_speed: 0,
            tremolo_depth: 0,
            retrigger_count: 0,
            pending_note: None,
            last_porta_up: 0,
            last_porta_down: 0,
            last_tone_porta: 0,
            last_volume_slide: 0,
            last_sample_offset: 0,
            last_sample_with_offset: 0,
        }
    }
}

/// A loaded MOD song bound to its live voices and sequencer.
pub struct ModPlayer {
    song: ModSong,
    channels: [ModChannel; 4],
    sequencer: PatternSequencer,
}

impl ModPlayer {
    pub fn new(song: ModSong) -> Self {
        let mut sequencer = PatternSequencer::new();
        sequencer.set_mode(SequencerMode::TickBased);
        sequencer.set_song(song.order.entries.clone(), ROWS_PER_PATTERN);
        sequencer.set_speed(6);
        sequencer.set_bpm(125);

        Self {
            song,
            channels: [ModChannel::new(0), ModChannel::new(1), ModChannel::new(2), ModChannel::new(3)],
            sequencer,
        }
    }

    pub fn start(&self) {
        self.sequencer.start();
    }

    pub fn stop(&self) {
        self.sequencer.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.is_playing()
    }

    pub fn sequencer(&self) -> &PatternSequencer {
        &self.sequencer
    }

    pub fn set_channel_mute(&mut self, channel: u8, muted: bool) -> Result<(), LoadError> {
        self.channels.get_mut(channel as usize).map(|c| c.muted = muted).ok_or(LoadError::InvalidArgument)
    }

    pub fn channel_mute(&self, channel: u8) -> bool {
        self.channels.get(channel as usize).map(|c| c.muted).unwrap_or(false)
    }

    pub fn num_channels(&self) -> u8 {
        NUM_CHANNELS
    }

    /// Render `frames` interleaved-by-tick: each output frame is preceded by
    /// exactly the sequencer advance that covers it, so a row/tick boundary
    /// that falls inside this call always affects the very next sample, not
    /// a later one in the same buffer.
    pub fn render_stereo(&mut self, left: &mut [f32], right: &mut [f32], frames: usize, sample_rate: u32) {
        let frames = frames.min(left.len()).min(right.len());
        for i in 0..frames {
            self.advance_one_frame(sample_rate);
            let (l, r) = self.render_frame(sample_rate);
            left[i] = l;
            right[i] = r;
        }
    }

    pub fn render_per_channel(
        &mut self,
        channel_outs: &mut [&mut [f32]; 4],
        frames: usize,
        sample_rate: u32,
    ) {
        let frames = frames.min(channel_outs.iter().map(|b| b.len()).min().unwrap_or(0));
        for i in 0..frames {
            self.advance_one_frame(sample_rate);
            for ch in 0..4 {
                channel_outs[ch][i] = render_channel_sample(&mut self.channels[ch], &self.song.samples, sample_rate);
            }
        }
    }

    /// Same per-frame advance as `render_stereo`'s internals, but routed
    /// through a `RegrooveController` so its loop/command-queue/pattern-mode
    /// logic can intercept the sequencer's callbacks. Used by a Deck's
    /// Regroove-wrapped render path instead of `advance_one_frame`.
    pub fn advance_via_regroove(&mut self, regroove: &RegrooveController, sample_rate: u32) {
        let ModPlayer { channels, sequencer, song } = self;
        let mut shim = ModCallbacks { song, channels };
        regroove.process(sequencer, 1, sample_rate, &mut shim);
    }

    pub fn render_frame_audio(&mut self, sample_rate: u32) -> (f32, f32) {
        self.render_frame(sample_rate)
    }

    fn advance_one_frame(&mut self, sample_rate: u32) {
        let ModPlayer { song, channels, sequencer } = self;
        let mut shim = ModCallbacks { song, channels };
        sequencer.process(1, sample_rate, &mut shim);
    }

    fn render_frame(&mut self, sample_rate: u32) -> (f32, f32) {
        #[cfg(feature = "alloc_check")]
        {
            assert_no_alloc::assert_no_alloc(|| self.render_frame_inner(sample_rate))
        }
        #[cfg(not(feature = "alloc_check"))]
        {
            self.render_frame_inner(sample_rate)
        }
    }

    fn render_frame_inner(&mut self, sample_rate: u32) -> (f32, f32) {
        let mut voices = [MixerVoice::default(); 4];
        for ch in 0..4 {
            let sample = render_channel_sample(&mut self.channels[ch], &self.song.samples, sample_rate);
            voices[ch] = MixerVoice { sample, pan: self.channels[ch].pan, enabled: !self.channels[ch].muted };
        }
        mix_stereo(&voices, 0.5)
    }
}

/// Bridges `SequencerCallbacks` to the channel/sample state, without
/// aliasing the sequencer itself (split-borrowed out of `ModPlayer`).
struct ModCallbacks<'a> {
    song: &'a ModSong,
    channels: &'a mut [ModChannel; 4],
}

impl<'a> SequencerCallbacks for ModCallbacks<'a> {
    fn on_tick(&mut self, _seq: &PatternSequencer, tick: u8) {
        mod_on_tick(self.song, self.channels, tick);
    }

    fn on_row(&mut self, seq: &PatternSequencer, order_index: u16, pattern_number: u16, row: u16) {
        mod_on_row(self.song, self.channels, seq, order_index, pattern_number, row);
    }
}

/// Also drivable through a `RegrooveController` (see `ModPlayer::advance_via_regroove`);
/// same note-parsing logic either way, just a different caller for `process`.
impl<'a> trackdeck_engine::RegrooveCallbacks for ModCallbacks<'a> {
    fn on_tick(&mut self, _seq: &PatternSequencer, tick: u8) {
        mod_on_tick(self.song, self.channels, tick);
    }

    fn on_row(&mut self, seq: &PatternSequencer, order_index: u16, pattern_number: u16, row: u16) {
        mod_on_row(self.song, self.channels, seq, order_index, pattern_number, row);
    }
}

fn mod_on_tick(song: &ModSong, channels: &mut [ModChannel; 4], tick: u8) {
    for ch in 0..4 {
        channels[ch].current_tick = tick;
        process_pending_note(&mut channels[ch], tick, song);
        process_tick_effects(&mut channels[ch], tick);
    }
}

fn mod_on_row(
    song: &ModSong,
    channels: &mut [ModChannel; 4],
    seq: &PatternSequencer,
    order_index: u16,
    pattern_number: u16,
    row: u16,
) {
    let _ = order_index;
    let pattern = match song.patterns.get(pattern_number as usize) {
        Some(p) => p,
        None => return,
    };
    if row >= pattern.rows {
        return;
    }
    for ch in 0..4usize {
        let cell = *pattern.cell(row, ch as u8);
        process_row_cell(&mut channels[ch], cell, seq, song);
    }
}

/// Apply a row's cell: either trigger/process it now, or defer it for
/// `EDx` note delay.
fn process_row_cell(chan: &mut ModChannel, cell: Cell, seq: &PatternSequencer, song: &ModSong) {
    if let Effect::NoteDelay(n) = cell.effect {
        if n > 0 {
            chan.pending_note = Some((cell, n));
            return;
        }
    }
    process_note(chan, cell, song);
    process_row_effects(chan, cell, seq);
}

fn process_pending_note(chan: &mut ModChannel, tick: u8, song: &ModSong) {
    if let Some((cell, target_tick)) = chan.pending_note {
        if tick == target_tick {
            chan.pending_note = None;
            process_note(chan, cell, song);
        }
    }
}

/// Note-trigger logic, run once per row (or at the delayed tick for `EDx`).
fn process_note(chan: &mut ModChannel, cell: Cell, song: &ModSong) {
    let is_retrigger_effect = matches!(cell.effect, Effect::SampleOffset(_)) || cell.period > 0;

    if cell.sample > 0 {
        if let Some(sample) = song.samples.get(cell.sample as usize - 1) {
            if cell.period > 0 || is_retrigger_effect {
                chan.sample = cell.sample;
                chan.finetune = sample.finetune;
                match cell.effect {
                    Effect::SetVolume(v) => chan.volume = v.min(64),
                    _ if cell.period > 0 => chan.volume = sample.default_volume,
                    _ => {}
                }
                chan.position = 0.0;
            } else {
                chan.sample = cell.sample;
                chan.finetune = sample.finetune;
                chan.volume = sample.default_volume;
            }
        }
    }

    if cell.period > 0 {
        let tone_porta = matches!(cell.effect, Effect::TonePorta(_) | Effect::TonePortaVolSlide(_));
        if tone_porta && chan.period != 0 {
            chan.portamento_target = cell.period;
        } else if cell.sample == 0 && chan.sample > 0 && !tone_porta {
            // Period-only retrigger of the currently bound sample: reuse the
            // last sample-offset iff it still targets this same sample.
            chan.period = cell.period;
            if chan.last_sample_offset > 0 && chan.last_sample_with_offset == chan.sample {
                chan.position = chan.last_sample_offset as f64 * 256.0;
            } else {
                chan.position = 0.0;
            }
        } else {
            chan.period = cell.period;
            if cell.sample > 0 {
                chan.position = 0.0;
            }
        }

        let preserves_vibrato = matches!(cell.effect, Effect::Vibrato { .. } | Effect::VibratoVolSlide(_));
        if !preserves_vibrato {
            chan.vibrato_pos = 0;
        }
        let preserves_tremolo = matches!(cell.effect, Effect::Tremolo { .. });
        if !preserves_tremolo {
            chan.tremolo_pos = 0;
        }
    }
}

/// Effects applied once, immediately, when the row is read.
fn process_row_effects(chan: &mut ModChannel, cell: Cell, seq: &PatternSequencer) {
    match cell.effect {
        Effect::Vibrato { speed, depth } => {
            if speed != 0 {
                chan.vibrato_speed = speed;
            }
            if depth != 0 {
                chan.vibrato_depth = depth;
            }
        }
        Effect::Tremolo { speed, depth } => {
            if speed != 0 {
                chan.tremolo_speed = speed;
            }
            if depth != 0 {
                chan.tremolo_depth = depth;
            }
        }
        Effect::SetPan(p) => {
            chan.pan = (p as f32 / 127.5 - 1.0).clamp(-1.0, 1.0);
        }
        Effect::SampleOffset(param) => {
            let offset_param = if param == 0 {
                chan.last_sample_offset
            } else {
                chan.last_sample_offset = param;
                chan.last_sample_with_offset = chan.sample;
                param
            };
            if chan.sample > 0 {
                let byte_offset = offset_param as f64 * 256.0;
                chan.position = byte_offset;
            }
        }
        Effect::PositionJump(order) => seq.position_jump(order as u16),
        Effect::SetVolume(v) => chan.volume = v.min(64),
        Effect::PatternBreak(row) => seq.pattern_break(row as u16),
        Effect::FinePortaUp(n) => chan.period = clamp_period_floor(chan.period.saturating_sub(n as u16)),
        Effect::FinePortaDown(n) => chan.period = clamp_period_ceil(chan.period.saturating_add(n as u16)),
        Effect::SetFinetune(ft) => chan.finetune = ft,
        Effect::PatternLoop(sub) => {
            if sub == 0 {
                seq.set_pattern_loop_start();
            } else {
                seq.execute_pattern_loop(sub);
            }
        }
        Effect::RetriggerNote(_) => chan.retrigger_count = 0,
        Effect::FineVolumeSlideUp(n) => chan.volume = (chan.volume + n).min(64),
        Effect::FineVolumeSlideDown(n) => chan.volume = chan.volume.saturating_sub(n),
        Effect::PatternDelay(n) => seq.pattern_delay(n),
        Effect::SetSpeedOrTempo(v) => {
            if v > 0 {
                if v < 32 {
                    seq.set_speed(v);
                } else {
                    seq.set_bpm(v as u16);
                }
            }
        }
        _ => {}
    }

    if cell.effect != Effect::None {
        chan.last_effect = cell.effect;
    }
}

fn clamp_period_floor(period: u16) -> u16 {
    if period == 0 {
        0
    } else {
        period.max(trackdeck_ir::PERIOD_MIN)
    }
}

fn clamp_period_ceil(period: u16) -> u16 {
    period.min(trackdeck_ir::PERIOD_MAX)
}

/// Per-tick effect processing (ticks 1..speed-1; tick 0 was already applied
/// via the row trigger).
fn process_tick_effects(chan: &mut ModChannel, tick: u8) {
    match chan.last_effect {
        Effect::Arpeggio { x, y } => {
            // Nothing to mutate here: arpeggio is applied at render time
            // based on `tick % 3`, since it must not permanently change
            // `chan.period`.
            let _ = (x, y);
        }
        Effect::PortaUp(param) => {
            let amount = if param == 0 { chan.last_porta_up } else { chan.last_porta_up = param; param };
            chan.period = clamp_period_floor(chan.period.saturating_sub(amount as u16));
        }
        Effect::PortaDown(param) => {
            let amount = if param == 0 { chan.last_porta_down } else { chan.last_porta_down = param; param };
            chan.period = clamp_period_ceil(chan.period.saturating_add(amount as u16));
        }
        Effect::TonePorta(param) => {
            let amount = if param == 0 { chan.last_tone_porta } else { chan.last_tone_porta = param; param };
            slide_toward_target(chan, amount);
        }
        Effect::TonePortaVolSlide(_) => {
            let porta_amount = chan.last_tone_porta;
            slide_toward_target(chan, porta_amount);
            if tick != 0 {
                let slide_amount = chan.last_volume_slide;
                apply_volume_slide(chan, slide_amount);
            }
        }
        Effect::Vibrato { .. } | Effect::VibratoVolSlide(_) => {
            if chan.vibrato_depth > 0 && chan.vibrato_speed > 0 {
                chan.vibrato_pos = chan.vibrato_pos.wrapping_add(chan.vibrato_speed) & 0x3F;
            }
            if tick != 0 {
                if let Effect::VibratoVolSlide(_) = chan.last_effect {
                    let slide_amount = chan.last_volume_slide;
                    apply_volume_slide(chan, slide_amount);
                }
            }
        }
        Effect::Tremolo { .. } => {
            if chan.tremolo_depth > 0 && chan.tremolo_speed > 0 {
                chan.tremolo_pos = chan.tremolo_pos.wrapping_add(chan.tremolo_speed) & 0x3F;
            }
        }
        Effect::VolumeSlide(param) => {
            let amount = if param == 0 { chan.last_volume_slide } else { chan.last_volume_slide = param; param };
            if tick != 0 {
                apply_volume_slide(chan, amount);
            }
        }
        _ => {}
    }

    // Volume slide and retrigger only take effect from tick 1 onward,
    // matching original_source/players/mod_player.c's process_effects;
    // every other per-tick effect above applies starting at tick 0.
    if let Effect::RetriggerNote(n) = chan.last_effect {
        if n > 0 && tick != 0 {
            chan.retrigger_count += 1;
            if chan.retrigger_count >= n {
                chan.position = 0.0;
                chan.retrigger_count = 0;
            }
        }
    }
    if let Effect::NoteCut(n) = chan.last_effect {
        if tick == n {
            chan.volume = 0;
        }
    }
}

fn slide_toward_target(chan: &mut ModChannel, speed: u8) {
    if chan.period == chan.portamento_target || speed == 0 {
        return;
    }
    let speed = speed as i32;
    let current = chan.period as i32;
    let target = chan.portamento_target as i32;
    chan.period = if current < target {
        (current + speed).min(target) as u16
    } else {
        (current - speed).max(target) as u16
    };
}

fn apply_volume_slide(chan: &mut ModChannel, param: i8) {
    if param > 0 {
        chan.volume = (chan.volume + param as u8).min(64);
    } else if param < 0 {
        chan.volume = chan.volume.saturating_sub((-param) as u8);
    }
}

/// Render one output sample for `chan`, advancing its playback position.
fn render_channel_sample(chan: &mut ModChannel, samples: &[Sample], sample_rate: u32) -> f32 {
    if chan.sample == 0 || chan.period == 0 || chan.muted {
        return 0.0;
    }
    let sample = match samples.get(chan.sample as usize - 1) {
        Some(s) if !s.is_empty() => s,
        _ => return 0.0,
    };

    let arpeggio_period = if let Effect::Arpeggio { x, y } = chan.last_effect {
        arpeggio_shift(chan.period, chan.finetune, x, y, current_arpeggio_tick(chan))
    } else {
        chan.period
    };

    let effective_period = if chan.vibrato_depth > 0 {
        let signed = sine(chan.vibrato_pos) as i32;
        let delta = signed * chan.vibrato_depth as i32 / 128;
        trackdeck_ir::clamp_period((arpeggio_period as i32 + delta).clamp(0, u16::MAX as i32) as u16)
    } else {
        arpeggio_period
    };

    let rate = period_to_frequency(effective_period);
    let increment = rate / sample_rate as f64;

    let pos = chan.position as usize;
    let raw = sample.data.get_normalized(pos);

    chan.position += increment;
    if sample.has_loop() {
        let end = sample.repeat_end() as f64;
        if chan.position >= end {
            let span = sample.repeat_length as f64;
            if span > 0.0 {
                chan.position = sample.repeat_start as f64 + (chan.position - end) % span;
            } else {
                chan.position = sample.repeat_start as f64;
            }
        }
    } else if chan.position as usize >= sample.len() {
        chan.period = 0;
    }

    let effective_volume = if chan.tremolo_depth > 0 {
        let signed = sine(chan.tremolo_pos) as i32;
        let delta = signed * chan.tremolo_depth as i32 / 64;
        (chan.volume as i32 + delta).clamp(0, 64) as u8
    } else {
        chan.volume
    };

    raw * (effective_volume as f32 / 64.0) * chan.user_volume
}

/// Arpeggio's phase within its 3-tick cycle, taken from the sequencer's
/// live tick (tracked every `on_tick`, independent of which effect is set).
fn current_arpeggio_tick(chan: &ModChannel) -> u8 {
    chan.current_tick % 3
}

fn arpeggio_shift(period: u16, finetune: i8, x: u8, y: u8, tick_mod3: u8) -> u16 {
    match tick_mod3 {
        0 => period,
        1 => trackdeck_ir::shift_period_by_semitones(period, finetune, x),
        _ => trackdeck_ir::shift_period_by_semitones(period, finetune, y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth_mod(rows_effects: &[(u16, u8, u8, u8)]) -> Vec<u8> {
        let mut data = alloc::vec![0u8; HEADER_SIZE];
        data[950] = 1;
        data[952] = 0;
        data[1080..1084].copy_from_slice(b"M.K.");
        let mut pattern = alloc::vec![0u8; PATTERN_SIZE];
        for &(row, ch, effect, param) in rows_effects {
            let offset = (row as usize * NUM_CHANNELS as usize + ch as usize) * 4;
            pattern[offset + 2] = effect & 0x0F;
            pattern[offset + 3] = param;
        }
        data.extend_from_slice(&pattern);
        data
    }

    #[test]
    fn rejects_bad_tag() {
        let mut data = alloc::vec![0u8; HEADER_SIZE];
        data[1080..1084].copy_from_slice(b"XXXX");
        assert!(matches!(load_mod(&data), Err(LoadError::FormatMismatch)));
    }

    #[test]
    fn accepts_all_four_tags() {
        for tag in [&b"M.K."[..], b"M!K!", b"FLT4", b"4CHN"] {
            let mut data = alloc::vec![0u8; HEADER_SIZE];
            data[1080..1084].copy_from_slice(tag);
            assert!(load_mod(&data).is_ok());
        }
    }

    #[test]
    fn loads_order_list_and_pattern_count() {
        let data = synth_mod(&[]);
        let song = load_mod(&data).unwrap();
        assert_eq!(song.order.len(), 1);
        assert_eq!(song.patterns.len(), 1);
    }

    #[test]
    fn pattern_break_bcd_scenario() {
        // Row 0, channel 0: effect D 16 (BCD -> row 16).
        let mut data = synth_mod(&[(0, 0, 0xD, 0x16)]);
        data[950] = 2;
        data[952] = 0;
        data[953] = 0;
        let pattern = alloc::vec![0u8; PATTERN_SIZE];
        data.extend_from_slice(&pattern);
        let song = load_mod(&data).unwrap();
        let mut player = ModPlayer::new(song);
        player.start();

        let mut left = alloc::vec![0.0f32; 48000];
        let mut right = alloc::vec![0.0f32; 48000];
        player.render_stereo(&mut left, &mut right, 48000, 48000);

        let pos = player.sequencer().position();
        assert_eq!(pos.order_index, 1);
        assert_eq!(pos.row, 16);
    }

    #[test]
    fn speed_and_bpm_split_by_effect_f() {
        let data = synth_mod(&[(0, 0, 0xF, 0x05), (16, 0, 0xF, 0x7D)]);
        let song = load_mod(&data).unwrap();
        let mut player = ModPlayer::new(song);
        player.start();

        let mut left = alloc::vec![0.0f32; 48000];
        let mut right = alloc::vec![0.0f32; 48000];
        player.render_stereo(&mut left, &mut right, 48000, 48000);

        assert_eq!(player.sequencer().speed(), 5);
        // BPM should have become 125 (0x7D) once row 16 was reached.
        assert_eq!(player.sequencer().bpm(), 125);
    }

    #[test]
    fn pattern_loop_e6x_effect_jumps_back_instead_of_advancing() {
        // E60 at row 2 marks the loop start; E62 at row 6 repeats it.
        // on_row trace for the first 10 firings: 0,1,2,3,4,5,6,[loop]2,3,4 —
        // without the loop, the 10th firing would instead be row 9.
        let data = synth_mod(&[(2, 0, 0xE, 0x60), (6, 0, 0xE, 0x62)]);
        let song = load_mod(&data).unwrap();
        let mut player = ModPlayer::new(song);
        player.start();

        let samples_per_row = 960 * 6;
        let frames = samples_per_row * 10;
        let mut left = alloc::vec![0.0f32; frames];
        let mut right = alloc::vec![0.0f32; frames];
        player.render_stereo(&mut left, &mut right, frames, 48000);

        let pos = player.sequencer().position();
        assert_eq!(pos.order_index, 0);
        assert_eq!(pos.row, 5);
    }

    #[test]
    fn channel_mute_silences_output() {
        let data = synth_mod(&[]);
        let song = load_mod(&data).unwrap();
        let mut player = ModPlayer::new(song);
        player.set_channel_mute(0, true).unwrap();
        assert!(player.channel_mute(0));
        assert!(!player.channel_mute(1));
    }

    #[test]
    fn channel_mute_rejects_out_of_range() {
        let data = synth_mod(&[]);
        let song = load_mod(&data).unwrap();
        let mut player = ModPlayer::new(song);
        assert!(player.set_channel_mute(7, true).is_err());
    }

    #[test]
    fn note_cut_ec0_fires_on_tick_zero() {
        // EC0 ("cut immediately") only has a tick to act on at tick 0;
        // a mod_on_tick that skipped process_tick_effects there could
        // never apply it at all.
        let mut chan = ModChannel::new(0);
        chan.volume = 64;
        chan.last_effect = Effect::NoteCut(0);
        process_tick_effects(&mut chan, 0);
        assert_eq!(chan.volume, 0);
    }

    #[test]
    fn volume_slide_does_not_apply_on_tick_zero() {
        let mut chan = ModChannel::new(0);
        chan.volume = 32;
        chan.last_effect = Effect::VolumeSlide(4);
        process_tick_effects(&mut chan, 0);
        assert_eq!(chan.volume, 32, "volume slide must wait for tick 1");
        process_tick_effects(&mut chan, 1);
        assert_eq!(chan.volume, 36);
    }

    #[test]
    fn vibrato_position_advances_on_tick_zero() {
        let mut chan = ModChannel::new(0);
        chan.last_effect = Effect::Vibrato { speed: 4, depth: 2 };
        chan.vibrato_speed = 4;
        chan.vibrato_depth = 2;
        process_tick_effects(&mut chan, 0);
        assert_eq!(chan.vibrato_pos, 4);
    }
}
