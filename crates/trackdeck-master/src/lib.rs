//! Headless Deck + Regroove controller for tracker playback.
//!
//! `Deck` is a type-tagged facade over MOD/MMD/AHX (plus a silent SID
//! stub): format auto-detect on `load`, one inner player per format kept
//! dormant until its format is actually seen, and a unified
//! `(order, pattern, row)` position shape regardless of which player is
//! live. `Controller` composes a `Deck` with a `RegrooveController` for
//! row-precise looping, a command queue, and pattern mode, and adds
//! offline rendering to a buffer or a WAV file.

mod wav;

use log::{debug, warn};
use trackdeck_engine::{Command, CommandKind, LoopState, PatternMode, RegrooveController};
use trackdeck_formats::{load_ahx, load_mmd, load_mod, AhxPlayer, LoadError, MmdPlayer, ModPlayer};

pub use wav::{frames_to_wav, write_wav};

const MAX_CHANNELS: usize = 4;

/// Which inner player, if any, a `Deck` is currently driving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeckType {
    None,
    Mod,
    Mmd,
    Ahx,
    /// No player implementation exists yet; the Deck accepts the variant
    /// tag but `load` never actually produces it (see spec's SID note).
    Sid,
}

impl DeckType {
    pub fn type_name(&self) -> &'static str {
        match self {
            DeckType::None => "none",
            DeckType::Mod => "mod",
            DeckType::Mmd => "mmd",
            DeckType::Ahx => "ahx",
            DeckType::Sid => "sid",
        }
    }
}

/// Unified playback position, regardless of which inner player produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct DeckPosition {
    pub order: u16,
    pub pattern: u16,
    pub row: u16,
}

/// Format auto-detecting facade over the three playable formats.
///
/// Each successful `load` allocates a fresh inner player for its detected
/// format (tracker files carry their own sample/pattern data, so there is
/// no stateless "empty" player to pre-allocate into); the other two
/// variants are left `None` and contribute nothing to the render path.
/// Channel-mute state is cached across loads so switching files doesn't
/// reset a DJ's mute setup.
pub struct Deck {
    active: DeckType,
    mod_player: Option<ModPlayer>,
    mmd_player: Option<MmdPlayer>,
    ahx_player: Option<AhxPlayer>,
    channel_mute_cache: [bool; MAX_CHANNELS],
    position_callback: Option<Box<dyn FnMut(DeckPosition)>>,
    last_notified_position: DeckPosition,
}

impl Deck {
    pub fn new() -> Self {
        Self {
            active: DeckType::None,
            mod_player: None,
            mmd_player: None,
            ahx_player: None,
            channel_mute_cache: [false; MAX_CHANNELS],
            position_callback: None,
            last_notified_position: DeckPosition::default(),
        }
    }

    /// Installs a callback fired whenever a render call advances the
    /// position. Unlike the per-row trampoline the format players invoke
    /// internally, this fires at most once per render call, with the
    /// position reached by the time that call returns — adequate for UI
    /// position display, not a substitute for row-accurate event timing.
    pub fn set_position_callback(&mut self, callback: impl FnMut(DeckPosition) + 'static) {
        self.position_callback = Some(Box::new(callback));
    }

    pub fn clear_position_callback(&mut self) {
        self.position_callback = None;
    }

    fn notify_position_if_changed(&mut self) {
        if self.position_callback.is_none() {
            return;
        }
        let current = self.position();
        if current != self.last_notified_position {
            self.last_notified_position = current;
            if let Some(cb) = self.position_callback.as_mut() {
                cb(current);
            }
        }
    }

    pub fn deck_type(&self) -> DeckType {
        self.active
    }

    pub fn type_name(&self) -> &'static str {
        self.active.type_name()
    }

    /// Tries MOD, then MMD, then AHX, in that fixed order. A signature
    /// mismatch falls through to the next format; any other error (the
    /// signature matched but the file is structurally broken) is reported
    /// immediately rather than silently guessing a different format.
    pub fn load(&mut self, data: &[u8]) -> Result<(), LoadError> {
        self.clear();

        match load_mod(data) {
            Ok(song) => {
                let mut player = ModPlayer::new(song);
                self.apply_mute_cache(|ch, muted| {
                    let _ = player.set_channel_mute(ch, muted);
                });
                self.mod_player = Some(player);
                self.active = DeckType::Mod;
                debug!("deck loaded a MOD file ({} bytes)", data.len());
                return Ok(());
            }
            Err(LoadError::FormatMismatch) => {}
            Err(e) => {
                warn!("MOD signature matched but load failed: {e}");
                return Err(e);
            }
        }

        match load_mmd(data) {
            Ok(song) => {
                let mut player = MmdPlayer::new(song);
                self.apply_mute_cache(|ch, muted| {
                    let _ = player.set_channel_mute(ch, muted);
                });
                self.mmd_player = Some(player);
                self.active = DeckType::Mmd;
                debug!("deck loaded an MMD file ({} bytes)", data.len());
                return Ok(());
            }
            Err(LoadError::FormatMismatch) => {}
            Err(e) => {
                warn!("MMD signature matched but load failed: {e}");
                return Err(e);
            }
        }

        match load_ahx(data) {
            Ok(song) => {
                let mut player = AhxPlayer::new(song);
                self.apply_mute_cache(|ch, muted| {
                    let _ = player.set_channel_mute(ch, muted);
                });
                self.ahx_player = Some(player);
                self.active = DeckType::Ahx;
                debug!("deck loaded an AHX file ({} bytes)", data.len());
                Ok(())
            }
            Err(e) => {
                warn!("no supported format matched ({} bytes)", data.len());
                Err(e)
            }
        }
    }

    fn apply_mute_cache(&self, mut set: impl FnMut(u8, bool)) {
        for (ch, &muted) in self.channel_mute_cache.iter().enumerate() {
            if muted {
                set(ch as u8, true);
            }
        }
    }

    fn clear(&mut self) {
        self.active = DeckType::None;
        self.mod_player = None;
        self.mmd_player = None;
        self.ahx_player = None;
    }

    pub fn start(&self) {
        match self.active {
            DeckType::Mod => self.mod_player.as_ref().unwrap().start(),
            DeckType::Mmd => self.mmd_player.as_ref().unwrap().start(),
            DeckType::Ahx => self.ahx_player.as_ref().unwrap().start(),
            DeckType::None | DeckType::Sid => {}
        }
    }

    pub fn stop(&self) {
        match self.active {
            DeckType::Mod => self.mod_player.as_ref().unwrap().stop(),
            DeckType::Mmd => self.mmd_player.as_ref().unwrap().stop(),
            DeckType::Ahx => self.ahx_player.as_ref().unwrap().stop(),
            DeckType::None | DeckType::Sid => {}
        }
    }

    pub fn is_playing(&self) -> bool {
        match self.active {
            DeckType::Mod => self.mod_player.as_ref().unwrap().is_playing(),
            DeckType::Mmd => self.mmd_player.as_ref().unwrap().is_playing(),
            DeckType::Ahx => self.ahx_player.as_ref().unwrap().is_playing(),
            DeckType::None | DeckType::Sid => false,
        }
    }

    /// Unified `(order, pattern, row)` position. AHX's position index is
    /// reported as both `order` and `pattern` is always 0 for it, matching
    /// the `(position, 0, row)` remap the Deck's contract names.
    pub fn position(&self) -> DeckPosition {
        let pos = match self.active {
            DeckType::Mod => self.mod_player.as_ref().map(|p| p.sequencer().position()),
            DeckType::Mmd => self.mmd_player.as_ref().map(|p| p.sequencer().position()),
            DeckType::Ahx => self.ahx_player.as_ref().map(|p| p.sequencer().position()),
            DeckType::None | DeckType::Sid => None,
        };
        match pos {
            Some(p) => DeckPosition { order: p.order_index, pattern: p.pattern_number, row: p.row },
            None => DeckPosition::default(),
        }
    }

    /// Immediate seek. `PatternSequencer::set_position` itself never fires
    /// `on_pattern_change` (it's an `&self` setter with no stored callback
    /// context), so this re-reads the post-seek position and fires the
    /// Deck's own position callback if it changed, mirroring the
    /// `RegrooveController` handler's re-read-after-`set_position` idiom.
    pub fn set_position(&mut self, order: u16, row: u16) {
        match self.active {
            DeckType::Mod => self.mod_player.as_ref().unwrap().sequencer().set_position(order, row),
            DeckType::Mmd => self.mmd_player.as_ref().unwrap().sequencer().set_position(order, row),
            DeckType::Ahx => self.ahx_player.as_ref().unwrap().sequencer().set_position(order, row),
            DeckType::None | DeckType::Sid => {}
        }
        self.notify_position_if_changed();
    }

    pub fn song_length(&self) -> u16 {
        match self.active {
            DeckType::Mod => self.mod_player.as_ref().unwrap().sequencer().order_length(),
            DeckType::Mmd => self.mmd_player.as_ref().unwrap().sequencer().order_length(),
            DeckType::Ahx => self.ahx_player.as_ref().unwrap().sequencer().order_length(),
            DeckType::None | DeckType::Sid => 0,
        }
    }

    pub fn num_channels(&self) -> u8 {
        match self.active {
            DeckType::Mod => self.mod_player.as_ref().unwrap().num_channels(),
            DeckType::Mmd => self.mmd_player.as_ref().unwrap().num_channels(),
            DeckType::Ahx => 4,
            DeckType::None | DeckType::Sid => 0,
        }
    }

    pub fn bpm(&self) -> u16 {
        match self.active {
            DeckType::Mod => self.mod_player.as_ref().unwrap().sequencer().bpm(),
            DeckType::Mmd => self.mmd_player.as_ref().unwrap().sequencer().bpm(),
            DeckType::Ahx => self.ahx_player.as_ref().unwrap().sequencer().bpm(),
            DeckType::None | DeckType::Sid => 0,
        }
    }

    pub fn set_bpm(&self, bpm: u16) {
        match self.active {
            DeckType::Mod => self.mod_player.as_ref().unwrap().sequencer().set_bpm(bpm),
            DeckType::Mmd => self.mmd_player.as_ref().unwrap().sequencer().set_bpm(bpm),
            DeckType::Ahx => self.ahx_player.as_ref().unwrap().sequencer().set_bpm(bpm),
            DeckType::None | DeckType::Sid => {}
        }
    }

    pub fn set_loop_range(&self, start_order: u16, end_order: u16) {
        match self.active {
            DeckType::Mod => self.mod_player.as_ref().unwrap().sequencer().set_loop_range(start_order, end_order),
            DeckType::Mmd => self.mmd_player.as_ref().unwrap().sequencer().set_loop_range(start_order, end_order),
            DeckType::Ahx => self.ahx_player.as_ref().unwrap().sequencer().set_loop_range(start_order, end_order),
            DeckType::None | DeckType::Sid => {}
        }
    }

    pub fn set_disable_looping(&self, disable: bool) {
        match self.active {
            DeckType::Mod => self.mod_player.as_ref().unwrap().sequencer().set_looping(!disable),
            DeckType::Mmd => self.mmd_player.as_ref().unwrap().sequencer().set_looping(!disable),
            DeckType::Ahx => self.ahx_player.as_ref().unwrap().sequencer().set_looping(!disable),
            DeckType::None | DeckType::Sid => {}
        }
    }

    pub fn set_channel_mute(&mut self, channel: u8, muted: bool) -> Result<(), LoadError> {
        if let Some(slot) = self.channel_mute_cache.get_mut(channel as usize) {
            *slot = muted;
        }
        match self.active {
            DeckType::Mod => self.mod_player.as_mut().unwrap().set_channel_mute(channel, muted),
            DeckType::Mmd => self.mmd_player.as_mut().unwrap().set_channel_mute(channel, muted),
            DeckType::Ahx => self.ahx_player.as_mut().unwrap().set_channel_mute(channel, muted),
            DeckType::None | DeckType::Sid => Ok(()),
        }
    }

    pub fn channel_mute(&self, channel: u8) -> bool {
        match self.active {
            DeckType::Mod => self.mod_player.as_ref().unwrap().channel_mute(channel),
            DeckType::Mmd => self.mmd_player.as_ref().unwrap().channel_mute(channel),
            DeckType::Ahx => self.ahx_player.as_ref().unwrap().channel_mute(channel),
            DeckType::None | DeckType::Sid => self.channel_mute_cache.get(channel as usize).copied().unwrap_or(false),
        }
    }

    pub fn render_stereo(&mut self, left: &mut [f32], right: &mut [f32], frames: usize, sample_rate: u32) {
        match self.active {
            DeckType::Mod => self.mod_player.as_mut().unwrap().render_stereo(left, right, frames, sample_rate),
            DeckType::Mmd => self.mmd_player.as_mut().unwrap().render_stereo(left, right, frames, sample_rate),
            DeckType::Ahx => self.ahx_player.as_mut().unwrap().render_stereo(left, right, frames, sample_rate),
            DeckType::None | DeckType::Sid => {
                left[..frames.min(left.len())].fill(0.0);
                right[..frames.min(right.len())].fill(0.0);
            }
        }
        self.notify_position_if_changed();
    }

    /// Fills up to 4 mono channel buffers, zero-filling any a format
    /// doesn't use (e.g. a future 3-voice SID source).
    pub fn render_per_channel(&mut self, channel_outs: &mut [&mut [f32]; 4], frames: usize, sample_rate: u32) {
        match self.active {
            DeckType::Mod => self.mod_player.as_mut().unwrap().render_per_channel(channel_outs, frames, sample_rate),
            DeckType::Mmd => self.mmd_player.as_mut().unwrap().render_per_channel(channel_outs, frames, sample_rate),
            DeckType::Ahx => self.ahx_player.as_mut().unwrap().render_per_channel(channel_outs, frames, sample_rate),
            DeckType::None | DeckType::Sid => {
                for buf in channel_outs.iter_mut() {
                    buf[..frames.min(buf.len())].fill(0.0);
                }
            }
        }
    }

    /// Advances exactly one frame through `regroove` instead of the
    /// player's own sequencer, so loop/command-queue/pattern-mode logic
    /// can intercept the row/pattern callbacks; used by `Controller`.
    fn advance_via_regroove(&mut self, regroove: &RegrooveController, sample_rate: u32) {
        match self.active {
            DeckType::Mod => self.mod_player.as_mut().unwrap().advance_via_regroove(regroove, sample_rate),
            DeckType::Mmd => self.mmd_player.as_mut().unwrap().advance_via_regroove(regroove, sample_rate),
            DeckType::Ahx => self.ahx_player.as_mut().unwrap().advance_via_regroove(regroove, sample_rate),
            DeckType::None | DeckType::Sid => {}
        }
        self.notify_position_if_changed();
    }

    fn render_frame_audio(&mut self, sample_rate: u32) -> (f32, f32) {
        match self.active {
            DeckType::Mod => self.mod_player.as_mut().unwrap().render_frame_audio(sample_rate),
            DeckType::Mmd => self.mmd_player.as_mut().unwrap().render_frame_audio(sample_rate),
            DeckType::Ahx => self.ahx_player.as_mut().unwrap().render_frame_audio(sample_rate),
            DeckType::None | DeckType::Sid => (0.0, 0.0),
        }
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}

/// Headless DJ/performance controller: a `Deck` wrapped with a
/// `RegrooveController` for row-precise looping, a command queue, and
/// pattern mode, plus offline render-to-buffer / render-to-WAV helpers.
pub struct Controller {
    deck: Deck,
    regroove: RegrooveController,
}

impl Controller {
    pub fn new() -> Self {
        Self { deck: Deck::new(), regroove: RegrooveController::new() }
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn deck_mut(&mut self) -> &mut Deck {
        &mut self.deck
    }

    pub fn load(&mut self, data: &[u8]) -> Result<(), LoadError> {
        self.deck.load(data)
    }

    pub fn set_position_callback(&mut self, callback: impl FnMut(DeckPosition) + 'static) {
        self.deck.set_position_callback(callback);
    }

    pub fn clear_position_callback(&mut self) {
        self.deck.clear_position_callback();
    }

    // --- Loop control ---------------------------------------------------

    pub fn arm_loop(&self) {
        self.regroove.arm_loop();
    }

    pub fn disarm_loop(&self) {
        self.regroove.disarm_loop();
    }

    pub fn loop_state(&self) -> LoopState {
        self.regroove.loop_state()
    }

    pub fn set_loop_range_rows(&self, start_order: u16, start_row: u16, end_order: u16, end_row: u16) {
        self.regroove.set_loop_range_rows(start_order, start_row, end_order, end_row);
    }

    // --- Pattern mode -----------------------------------------------------

    pub fn set_pattern_mode(&self, mode: PatternMode, locked_order: u16) {
        self.regroove.set_pattern_mode(mode, locked_order);
    }

    // --- Command queue ------------------------------------------------

    pub fn queue_command(&mut self, kind: CommandKind) {
        let Controller { deck, regroove } = self;
        let sequencer = match deck.active {
            DeckType::Mod => deck.mod_player.as_ref().map(|p| p.sequencer()),
            DeckType::Mmd => deck.mmd_player.as_ref().map(|p| p.sequencer()),
            DeckType::Ahx => deck.ahx_player.as_ref().map(|p| p.sequencer()),
            DeckType::None | DeckType::Sid => None,
        };
        if let Some(sequencer) = sequencer {
            let mut sink = NullRegrooveCallbacks;
            regroove.queue(sequencer, &mut sink, Command::new(kind));
        }
    }

    // --- Rendering --------------------------------------------------------

    pub fn render_stereo(&mut self, left: &mut [f32], right: &mut [f32], frames: usize, sample_rate: u32) {
        let frames = frames.min(left.len()).min(right.len());
        for i in 0..frames {
            self.deck.advance_via_regroove(&self.regroove, sample_rate);
            let (l, r) = self.deck.render_frame_audio(sample_rate);
            left[i] = l;
            right[i] = r;
        }
    }

    pub fn render_to_wav(&mut self, sample_rate: u32, max_seconds: u32) -> Vec<u8> {
        let max_frames = (sample_rate * max_seconds) as usize;
        let mut left = alloc_f32(max_frames);
        let mut right = alloc_f32(max_frames);
        self.render_stereo(&mut left, &mut right, max_frames, sample_rate);
        wav::frames_to_wav(&left, &right, sample_rate)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

fn alloc_f32(len: usize) -> Vec<f32> {
    std::vec![0.0f32; len]
}

/// A `RegrooveCallbacks` sink that does nothing; used when queuing a
/// command with no interest in the extended callback stream.
struct NullRegrooveCallbacks;

impl trackdeck_engine::RegrooveCallbacks for NullRegrooveCallbacks {
    fn on_tick(&mut self, _seq: &trackdeck_engine::PatternSequencer, _tick: u8) {}
    fn on_row(&mut self, _seq: &trackdeck_engine::PatternSequencer, _order_index: u16, _pattern_number: u16, _row: u16) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth_mod_bytes() -> Vec<u8> {
        let mut data = std::vec![0u8; 1084 + 64 * 4 * 4];
        data[1080..1084].copy_from_slice(b"M.K.");
        data[950] = 1;
        data[952] = 0;
        data
    }

    #[test]
    fn deck_auto_detects_mod() {
        let mut deck = Deck::new();
        deck.load(&synth_mod_bytes()).unwrap();
        assert_eq!(deck.deck_type(), DeckType::Mod);
        assert_eq!(deck.type_name(), "mod");
    }

    #[test]
    fn deck_rejects_unknown_signature() {
        let mut deck = Deck::new();
        let data = std::vec![0u8; 32];
        assert!(deck.load(&data).is_err());
        assert_eq!(deck.deck_type(), DeckType::None);
    }

    #[test]
    fn deck_channel_mute_cache_survives_reload() {
        let mut deck = Deck::new();
        deck.load(&synth_mod_bytes()).unwrap();
        deck.set_channel_mute(1, true).unwrap();
        assert!(deck.channel_mute(1));

        deck.load(&synth_mod_bytes()).unwrap();
        assert!(deck.channel_mute(1));
    }

    #[test]
    fn deck_render_stereo_on_empty_deck_is_silent() {
        let mut deck = Deck::new();
        let mut left = [1.0f32; 16];
        let mut right = [1.0f32; 16];
        deck.render_stereo(&mut left, &mut right, 16, 48000);
        assert!(left.iter().all(|&s| s == 0.0));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn controller_renders_wav_bytes() {
        let mut controller = Controller::new();
        controller.load(&synth_mod_bytes()).unwrap();
        controller.deck_mut().start();
        let wav = controller.render_to_wav(8000, 1);
        assert_eq!(&wav[0..4], b"RIFF");
    }

    #[test]
    fn deck_position_callback_fires_once_per_row_advance() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut deck = Deck::new();
        deck.load(&synth_mod_bytes()).unwrap();
        deck.start();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        deck.set_position_callback(move |pos| seen_clone.borrow_mut().push(pos));

        let mut left = std::vec![0.0f32; 48000];
        let mut right = std::vec![0.0f32; 48000];
        deck.render_stereo(&mut left, &mut right, 48000, 48000);

        assert!(!seen.borrow().is_empty());
    }

    #[test]
    fn controller_loop_arms_and_activates() {
        let mut controller = Controller::new();
        controller.load(&synth_mod_bytes()).unwrap();
        controller.deck_mut().start();
        controller.set_loop_range_rows(0, 0, 0, 4);
        controller.arm_loop();

        let mut left = std::vec![0.0f32; 8000];
        let mut right = std::vec![0.0f32; 8000];
        controller.render_stereo(&mut left, &mut right, 8000, 8000);

        assert_eq!(controller.loop_state(), LoopState::Active);
    }
}
