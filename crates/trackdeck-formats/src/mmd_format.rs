//! OctaMED MMD2/MMD3 loader and player.
//!
//! Both formats share one on-disk layout (MMD3 only signals "advanced
//! mixing" elsewhere); the loader accepts either magic identically. Unlike
//! MOD, track count and pattern length both vary per song, so channel state
//! is a `Vec` sized to the song's `num_tracks` rather than a fixed array.

use alloc::vec::Vec;
use trackdeck_engine::{PatternSequencer, RegrooveController, SequencerCallbacks, SequencerMode};
use trackdeck_ir::{
    mix_stereo, mmd_pan_to_normalized, note_to_period, period_to_frequency, sine, Cell, Effect, LoadError,
    MixerVoice, OrderList, Pattern, Sample, SampleData,
};

use crate::bigendian::Reader;
use crate::effect_parser::parse_effect;

const MAX_SAMPLES: usize = 63;
const MAX_CHANNELS: u8 = 64;
const INSTR_FLAG_STEREO: u8 = 0x04;
const INSTR_FLAG_16BIT: u8 = 0x08;

fn is_supported_tag(tag: &[u8]) -> bool {
    tag == b"MMD2" || tag == b"MMD3"
}

/// A parsed MMD2/MMD3 song.
#[derive(Clone, Debug)]
pub struct MmdSong {
    pub samples: Vec<Sample>,
    pub patterns: Vec<Pattern>,
    pub order: OrderList,
    pub num_tracks: u8,
    pub initial_bpm: u16,
    pub initial_speed: u8,
}

pub fn load_mmd(data: &[u8]) -> Result<MmdSong, LoadError> {
    if data.len() < 52 || !is_supported_tag(&data[0..4]) {
        return Err(LoadError::FormatMismatch);
    }

    let mut header = Reader::new(data);
    header.seek(8);
    let song_offset = header.absolute_offset()?;
    header.seek(16);
    let blockarr_offset = header.absolute_offset()?;
    header.seek(24);
    let smplarr_offset = header.absolute_offset()?;

    // MMD0sample array: 63 entries * 8 bytes, immediately followed by the
    // song-info fields this loader cares about.
    let song_info_offset = song_offset + MAX_SAMPLES * 8;
    let mut r = Reader::at(data, song_info_offset);
    let num_blocks = r.u16()?;
    let songlen_deprecated = r.u16()?;
    let playseq_offset = r.absolute_offset()?;
    r.seek(song_info_offset + 16);
    let mut num_tracks = r.u16()?.min(MAX_CHANNELS as u16) as u8;
    let numpseqs = r.u16()?;

    let (song_length, play_seq) = if playseq_offset != 0 && numpseqs > 0 {
        let mut pr = Reader::at(data, playseq_offset);
        let first_seq_offset = pr.absolute_offset()?;
        if first_seq_offset != 0 {
            let mut sr = Reader::at(data, first_seq_offset + 40);
            let len = sr.u16()?;
            let mut entries = Vec::with_capacity(len as usize);
            let mut nr = Reader::at(data, first_seq_offset + 42);
            for _ in 0..len {
                entries.push(nr.u16()?);
            }
            (len, entries)
        } else {
            (0, Vec::new())
        }
    } else {
        (0, Vec::new())
    };
    let (song_length, play_seq) = if song_length == 0 {
        let len = if songlen_deprecated == 0 { 1 } else { songlen_deprecated };
        (len, (0..len).collect::<Vec<u16>>())
    } else {
        (song_length, play_seq)
    };
    let _ = song_length;

    if num_tracks == 0 {
        num_tracks = 4;
    }

    // Tempo fields, fixed offsets from the song structure's base.
    let mut tr = Reader::at(data, song_offset + 764);
    let deftempo = tr.u16()?;
    tr.seek(song_offset + 767);
    let flags = tr.u8()?;
    let flags2 = tr.u8()?;
    let tempo2 = tr.u8()?;

    let bpm_mode = flags2 & 0x20 != 0;
    let software_mixing = flags2 & 0x80 != 0;
    let is_8ch = flags & 0x40 != 0;
    let rows_per_beat = 1 + (flags2 & 0x1F) as u32;

    let initial_bpm = if bpm_mode && !is_8ch {
        (deftempo as u32 * rows_per_beat / 4).clamp(32, 255) as u16
    } else if software_mixing && deftempo < 8 {
        158
    } else {
        ((deftempo as f32 / 0.264) as u32).clamp(32, 255) as u16
    };
    let initial_speed = if tempo2 > 0 { tempo2 } else { 6 };

    // Blocks (patterns).
    let mut patterns = Vec::with_capacity(num_blocks as usize);
    for i in 0..num_blocks {
        let mut br = Reader::at(data, blockarr_offset + i as usize * 4);
        let block_offset = br.absolute_offset()?;
        if block_offset == 0 {
            patterns.push(Pattern::new(1, num_tracks));
            continue;
        }
        let mut hr = Reader::at(data, block_offset);
        let block_tracks = hr.u16()?.min(MAX_CHANNELS as u16) as u8;
        let lines = hr.u16()?.saturating_add(1);

        let mut pattern = Pattern::new(lines, block_tracks);
        let mut nr = Reader::at(data, block_offset + 8);
        for row in 0..lines {
            for ch in 0..block_tracks {
                let note = nr.u8()?;
                let instrument = nr.u8()?;
                let command = nr.u8()?;
                let param = nr.u8()?;
                *pattern.cell_mut(row, ch) =
                    Cell { period: mmd_note_to_period(note), sample: instrument, effect: parse_effect(command, param) };
            }
        }
        patterns.push(pattern);
    }

    // Instruments/samples.
    let mut samples = alloc::vec![Sample::default(); MAX_SAMPLES];
    for i in 0..MAX_SAMPLES {
        let mut ir = Reader::at(data, smplarr_offset + i * 4);
        let instr_offset = match ir.absolute_offset() {
            Ok(0) => continue,
            Ok(v) => v,
            Err(_) => continue,
        };
        let mut hr = Reader::at(data, instr_offset);
        let length = match hr.u32() {
            Ok(v) => v as usize,
            Err(_) => continue,
        };
        let type_and_flags = match hr.i16() {
            Ok(v) => v,
            Err(_) => continue,
        };

        if type_and_flags == -2 {
            let mut er = Reader::at(data, instr_offset + 6);
            let _hold = er.u8();
            let _decay = er.u8();
            let _suppress = er.u8();
            let finetune = er.i8().unwrap_or(0);
            let _default_pitch = er.u8();
            let instr_flags = er.u8().unwrap_or(0);
            er.seek(instr_offset + 6 + 10);
            let long_repeat = er.u32().unwrap_or(0);
            let long_replen = er.u32().unwrap_or(0);

            let is_16bit = instr_flags & INSTR_FLAG_16BIT != 0;
            let is_stereo = instr_flags & INSTR_FLAG_STEREO != 0;
            let data_offset = instr_offset + 6 + 18;
            if data_offset + length > data.len() {
                continue;
            }
            let raw = &data[data_offset..data_offset + length];
            let sample_data = decode_sample_data(raw, is_16bit, is_stereo);
            let frame_divisor = bytes_per_frame(is_16bit, is_stereo);

            samples[i] = Sample {
                data: sample_data,
                repeat_start: long_repeat / frame_divisor,
                repeat_length: long_replen / frame_divisor,
                default_volume: 64,
                finetune,
                c4_speed: 8363,
                ..Sample::new("")
            };
        } else if (0..=6).contains(&type_and_flags) {
            let is_16bit = type_and_flags & 0x10 != 0;
            let is_stereo = type_and_flags & 0x20 != 0;
            let data_offset = instr_offset + 6;
            if data_offset + length > data.len() {
                continue;
            }
            let raw = &data[data_offset..data_offset + length];
            let sample_data = decode_sample_data(raw, is_16bit, is_stereo);
            let frame_divisor = bytes_per_frame(is_16bit, is_stereo);

            let mut sr = Reader::at(data, song_offset + i * 8);
            let rep_words = sr.u16().unwrap_or(0);
            let replen_words = sr.u16().unwrap_or(0);
            sr.seek(song_offset + i * 8 + 6);
            let svol = sr.u8().unwrap_or(64);
            let strans = sr.i8().unwrap_or(0);
            let _ = strans;

            samples[i] = Sample {
                data: sample_data,
                repeat_start: (rep_words as u32 * 2) / frame_divisor,
                repeat_length: (replen_words as u32 * 2) / frame_divisor,
                default_volume: svol.min(64),
                finetune: 0,
                c4_speed: 8363,
                ..Sample::new("")
            };
        }
        // Other type codes (synth/hybrid instruments) carry no PCM data and
        // are left as silent default samples; MED synths are out of scope.
    }

    Ok(MmdSong { samples, patterns, order: OrderList::new(play_seq), num_tracks, initial_bpm, initial_speed })
}

fn bytes_per_frame(is_16bit: bool, is_stereo: bool) -> u32 {
    let mut n = if is_16bit { 2 } else { 1 };
    if is_stereo {
        n *= 2;
    }
    n
}

/// Decode a raw PCM blob per its 16-bit/stereo flags. Stereo samples are
/// stored as two back-to-back mono halves (planar, not interleaved); both
/// halves are averaged down to mono.
fn decode_sample_data(raw: &[u8], is_16bit: bool, is_stereo: bool) -> SampleData {
    if is_16bit {
        let frames_total = raw.len() / 2;
        let samples: Vec<i16> = (0..frames_total).map(|i| i16::from_be_bytes([raw[i * 2], raw[i * 2 + 1]])).collect();
        if is_stereo && frames_total >= 2 {
            let half = frames_total / 2;
            let mono: Vec<i16> =
                (0..half).map(|i| (((samples[i] as i32) + (samples[i + half] as i32)) / 2) as i16).collect();
            SampleData::Mono16(mono)
        } else {
            SampleData::Mono16(samples)
        }
    } else {
        let samples: Vec<i8> = raw.iter().map(|&b| b as i8).collect();
        if is_stereo && samples.len() >= 2 {
            let half = samples.len() / 2;
            let mono: Vec<i8> =
                (0..half).map(|i| (((samples[i] as i32) + (samples[i + half] as i32)) / 2) as i8).collect();
            SampleData::Mono8(mono)
        } else {
            SampleData::Mono8(samples)
        }
    }
}

/// OctaMED notes run a full octave above ProTracker's; subtract 12 before
/// reusing the shared (finetune-0) period table.
fn mmd_note_to_period(note: u8) -> u16 {
    if note < 13 {
        return 0;
    }
    note_to_period(note - 12, 0)
}

#[derive(Clone, Debug)]
struct MmdChannel {
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

    last_porta_up: u8,
    last_porta_down: u8,
    last_tone_porta: u8,
    last_volume_slide: i8,
}

impl MmdChannel {
    fn new() -> Self {
        Self {
            sample: 0,
            position: 0.0,
            period: 0,
            volume: 0,
            finetune: 0,
            pan: 0.0,
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
            last_porta_up: 0,
            last_porta_down: 0,
            last_tone_porta: 0,
            last_volume_slide: 0,
        }
    }
}

/// A loaded MMD song bound to its live voices and sequencer.
pub struct MmdPlayer {
    song: MmdSong,
    channels: Vec<MmdChannel>,
    sequencer: PatternSequencer,
    /// Reused every `render_frame` call so the variable track count doesn't
    /// force a heap allocation per rendered sample.
    mix_scratch: Vec<MixerVoice>,
}

impl MmdPlayer {
    pub fn new(song: MmdSong) -> Self {
        let mut sequencer = PatternSequencer::new();
        sequencer.set_mode(SequencerMode::TickBased);
        sequencer.set_song(song.order.entries.clone(), longest_pattern_rows(&song.patterns));
        sequencer.set_speed(song.initial_speed);
        sequencer.set_bpm(song.initial_bpm);

        let channels: Vec<MmdChannel> = (0..song.num_tracks).map(|_| MmdChannel::new()).collect();
        let mix_scratch = Vec::with_capacity(channels.len());
        Self { song, channels, sequencer, mix_scratch }
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

    pub fn num_channels(&self) -> u8 {
        self.song.num_tracks
    }

    pub fn set_channel_mute(&mut self, channel: u8, muted: bool) -> Result<(), LoadError> {
        self.channels.get_mut(channel as usize).map(|c| c.muted = muted).ok_or(LoadError::InvalidArgument)
    }

    pub fn channel_mute(&self, channel: u8) -> bool {
        self.channels.get(channel as usize).map(|c| c.muted).unwrap_or(false)
    }

    pub fn render_stereo(&mut self, left: &mut [f32], right: &mut [f32], frames: usize, sample_rate: u32) {
        let frames = frames.min(left.len()).min(right.len());
        for i in 0..frames {
            self.advance_one_frame(sample_rate);
            let (l, r) = self.render_frame(sample_rate);
            left[i] = l;
            right[i] = r;
        }
    }

    /// Fills up to 4 mono monitor buffers from the first `min(4,
    /// num_channels)` tracks. All tracks still advance and render every
    /// frame (matching `render_stereo`'s per-frame state update); channels
    /// beyond the first 4 simply have nowhere to go in this view.
    pub fn render_per_channel(&mut self, channel_outs: &mut [&mut [f32]; 4], frames: usize, sample_rate: u32) {
        let frames = frames.min(channel_outs.iter().map(|b| b.len()).min().unwrap_or(0));
        for i in 0..frames {
            self.advance_one_frame(sample_rate);
            for ch in 0..self.channels.len() {
                let sample = render_channel_sample(&mut self.channels[ch], &self.song.samples, sample_rate);
                if ch < 4 {
                    channel_outs[ch][i] = sample;
                }
            }
        }
    }

    /// See `ModPlayer::advance_via_regroove`.
    pub fn advance_via_regroove(&mut self, regroove: &RegrooveController, sample_rate: u32) {
        let MmdPlayer { song, channels, sequencer } = self;
        let mut shim = MmdCallbacks { song, channels };
        regroove.process(sequencer, 1, sample_rate, &mut shim);
    }

    pub fn render_frame_audio(&mut self, sample_rate: u32) -> (f32, f32) {
        self.render_frame(sample_rate)
    }

    fn advance_one_frame(&mut self, sample_rate: u32) {
        let MmdPlayer { song, channels, sequencer } = self;
        let mut shim = MmdCallbacks { song, channels };
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
        self.mix_scratch.clear();
        for chan in &mut self.channels {
            let sample = render_channel_sample(chan, &self.song.samples, sample_rate);
            self.mix_scratch.push(MixerVoice { sample, pan: chan.pan, enabled: !chan.muted });
        }
        mix_stereo(&self.mix_scratch, 0.5)
    }
}

fn longest_pattern_rows(patterns: &[Pattern]) -> u16 {
    patterns.iter().map(|p| p.rows).max().unwrap_or(1)
}

struct MmdCallbacks<'a> {
    song: &'a MmdSong,
    channels: &'a mut Vec<MmdChannel>,
}

impl<'a> SequencerCallbacks for MmdCallbacks<'a> {
    fn on_tick(&mut self, _seq: &PatternSequencer, tick: u8) {
        mmd_on_tick(self.channels, tick);
    }

    fn on_row(&mut self, seq: &PatternSequencer, order_index: u16, pattern_number: u16, row: u16) {
        mmd_on_row(self.song, self.channels, seq, order_index, pattern_number, row);
    }
}

/// Also drivable through a `RegrooveController` (see `MmdPlayer::advance_via_regroove`).
impl<'a> trackdeck_engine::RegrooveCallbacks for MmdCallbacks<'a> {
    fn on_tick(&mut self, _seq: &PatternSequencer, tick: u8) {
        mmd_on_tick(self.channels, tick);
    }

    fn on_row(&mut self, seq: &PatternSequencer, order_index: u16, pattern_number: u16, row: u16) {
        mmd_on_row(self.song, self.channels, seq, order_index, pattern_number, row);
    }
}

fn mmd_on_tick(channels: &mut [MmdChannel], tick: u8) {
    for chan in channels.iter_mut() {
        chan.current_tick = tick;
        process_tick_effects(chan, tick);
    }
}

fn mmd_on_row(
    song: &MmdSong,
    channels: &mut [MmdChannel],
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
    let tracks = pattern.channels.min(channels.len() as u8);
    for ch in 0..tracks as usize {
        let cell = *pattern.cell(row, ch as u8);
        process_note(&mut channels[ch], cell, song);
        process_row_effects(&mut channels[ch], cell, seq);
    }
}

fn process_note(chan: &mut MmdChannel, cell: Cell, song: &MmdSong) {
    let is_retrigger_effect = matches!(cell.effect, Effect::SampleOffset(_)) || cell.period > 0;

    if cell.sample > 0 {
        if let Some(sample) = song.samples.get(cell.sample as usize - 1) {
            chan.sample = cell.sample;
            chan.finetune = sample.finetune;
            if cell.period > 0 || is_retrigger_effect {
                match cell.effect {
                    Effect::SetVolume(v) => chan.volume = v.min(64),
                    _ if cell.period > 0 => chan.volume = sample.default_volume,
                    _ => {}
                }
            } else {
                chan.volume = sample.default_volume;
            }
        }
    }

    if cell.period > 0 {
        let tone_porta = matches!(cell.effect, Effect::TonePorta(_) | Effect::TonePortaVolSlide(_));
        if tone_porta && chan.period != 0 {
            chan.portamento_target = cell.period;
        } else {
            chan.period = cell.period;
            chan.position = 0.0;
        }

        if !matches!(cell.effect, Effect::Vibrato { .. } | Effect::VibratoVolSlide(_)) {
            chan.vibrato_pos = 0;
        }
        if !matches!(cell.effect, Effect::Tremolo { .. }) {
            chan.tremolo_pos = 0;
        }
    }
}

/// Row-level effect handling for the documented common subset. Unrecognized
/// commands fall through as silent no-ops (per-format spec: MMD effects
/// beyond this subset aren't verified against real files yet).
fn process_row_effects(chan: &mut MmdChannel, cell: Cell, seq: &PatternSequencer) {
    match cell.effect {
        Effect::SetVolume(v) => chan.volume = v.min(64),
        Effect::SetPan(raw) => chan.pan = mmd_pan_to_normalized(raw as i8),
        Effect::PositionJump(order) => seq.position_jump(order as u16),
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
        Effect::RetriggerNote(_) => chan.retrigger_count = 0,
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

fn process_tick_effects(chan: &mut MmdChannel, tick: u8) {
    match chan.last_effect {
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

fn slide_toward_target(chan: &mut MmdChannel, speed: u8) {
    if chan.period == chan.portamento_target || speed == 0 {
        return;
    }
    let speed = speed as i32;
    let current = chan.period as i32;
    let target = chan.portamento_target as i32;
    chan.period = if current < target { (current + speed).min(target) as u16 } else { (current - speed).max(target) as u16 };
}

fn apply_volume_slide(chan: &mut MmdChannel, param: i8) {
    if param > 0 {
        chan.volume = (chan.volume + param as u8).min(64);
    } else if param < 0 {
        chan.volume = chan.volume.saturating_sub((-param) as u8);
    }
}

fn render_channel_sample(chan: &mut MmdChannel, samples: &[Sample], sample_rate: u32) -> f32 {
    if chan.sample == 0 || chan.period == 0 || chan.muted {
        return 0.0;
    }
    let sample = match samples.get(chan.sample as usize - 1) {
        Some(s) if !s.is_empty() => s,
        _ => return 0.0,
    };

    let effective_period = if chan.vibrato_depth > 0 {
        let signed = sine(chan.vibrato_pos) as i32;
        let delta = signed * chan.vibrato_depth as i32 / 128;
        trackdeck_ir::clamp_period((chan.period as i32 + delta).clamp(0, u16::MAX as i32) as u16)
    } else {
        chan.period
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
