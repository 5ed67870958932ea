//! Stereo summing mixer shared by all players.
//!
//! One mono sample per active voice is summed to a stereo frame using
//! constant-gain (linear) panning. The mixer never clamps; callers own
//! clipping policy.

/// A single voice's contribution to one output frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct MixerVoice {
    pub sample: f32,
    /// Pan in `[-1, 1]`, `-1` = hard left, `1` = hard right.
    pub pan: f32,
    pub enabled: bool,
}

/// Convert a pan value in `[-1, 1]` into independent left/right gains.
pub fn pan_to_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let pan_01 = pan * 0.5 + 0.5;
    (1.0 - pan_01, pan_01)
}

/// Sum `voices` into one stereo frame, applying a final headroom `scaling`
/// factor (e.g. 0.5 for Amiga-style MOD/MMD output).
pub fn mix_stereo(voices: &[MixerVoice], scaling: f32) -> (f32, f32) {
    let mut left = 0.0f32;
    let mut right = 0.0f32;
    for voice in voices {
        if !voice.enabled {
            continue;
        }
        let (l, r) = pan_to_gains(voice.pan);
        left += voice.sample * l;
        right += voice.sample * r;
    }
    (left * scaling, right * scaling)
}

/// Normalize an MMD pan value (`-16..=16`) to the `[-1, 1]` range this
/// mixer expects.
pub fn mmd_pan_to_normalized(mmd_pan: i8) -> f32 {
    mmd_pan.clamp(-16, 16) as f32 / 16.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_pan_splits_evenly() {
        let (l, r) = pan_to_gains(0.0);
        assert!((l - 0.5).abs() < 1e-6);
        assert!((r - 0.5).abs() < 1e-6);
    }

    #[test]
    fn hard_left_is_full_left() {
        let (l, r) = pan_to_gains(-1.0);
        assert!((l - 1.0).abs() < 1e-6);
        assert!(r.abs() < 1e-6);
    }

    #[test]
    fn hard_right_is_full_right() {
        let (l, r) = pan_to_gains(1.0);
        assert!(l.abs() < 1e-6);
        assert!((r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pan_clamps_out_of_range() {
        let (l, r) = pan_to_gains(5.0);
        let (l2, r2) = pan_to_gains(1.0);
        assert_eq!((l, r), (l2, r2));
    }

    #[test]
    fn mix_stereo_applies_scaling() {
        let voices = [MixerVoice { sample: 1.0, pan: 0.0, enabled: true }];
        let (l, r) = mix_stereo(&voices, 0.5);
        assert!((l - 0.25).abs() < 1e-6);
        assert!((r - 0.25).abs() < 1e-6);
    }

    #[test]
    fn mix_stereo_skips_disabled_voices() {
        let voices = [
            MixerVoice { sample: 1.0, pan: 0.0, enabled: false },
            MixerVoice { sample: 0.5, pan: -1.0, enabled: true },
        ];
        let (l, r) = mix_stereo(&voices, 1.0);
        assert!((l - 0.5).abs() < 1e-6);
        assert!(r.abs() < 1e-6);
    }

    #[test]
    fn mmd_pan_normalizes() {
        assert!((mmd_pan_to_normalized(16) - 1.0).abs() < 1e-6);
        assert!((mmd_pan_to_normalized(-16) - -1.0).abs() < 1e-6);
        assert!((mmd_pan_to_normalized(0) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn mmd_pan_clamps() {
        assert!((mmd_pan_to_normalized(100) - 1.0).abs() < 1e-6);
    }
}
