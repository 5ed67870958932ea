//! Allocation-free render path test.
//!
//! Verifies that `Controller::render_stereo` does not allocate once a song
//! is loaded and playing. Just run `cargo test` — no feature flags needed.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use trackdeck_master::Controller;

const HEADER_SIZE: usize = 1084;
const PATTERN_SIZE: usize = 64 * 4 * 4;

fn synth_mod_with_note() -> Vec<u8> {
    let mut data = vec![0u8; HEADER_SIZE];
    data[1080..1084].copy_from_slice(b"M.K.");
    data[950] = 1;
    data[952] = 0;

    let length_words: u16 = 16;
    data[20 + 22..20 + 24].copy_from_slice(&length_words.to_be_bytes());
    data[20 + 25] = 64;

    let mut pattern = vec![0u8; PATTERN_SIZE];
    pattern[0] = 0x01; // sample nibble 0001, period high nibble 0
    pattern[1] = 0xAC; // period low byte (0x1AC = 428)
    pattern[2] = 0x10; // sample low nibble
    data.extend_from_slice(&pattern);

    for i in 0..32u8 {
        data.push(if i % 2 == 0 { 100 } else { (-100i8) as u8 });
    }
    data
}

#[test]
fn render_loop_is_alloc_free() {
    let mut ctrl = Controller::new();
    ctrl.load(&synth_mod_with_note()).unwrap();
    ctrl.deck_mut().start();

    let mut left = vec![0.0f32; 4096];
    let mut right = vec![0.0f32; 4096];

    assert_no_alloc(|| {
        for _ in 0..20 {
            ctrl.render_stereo(&mut left, &mut right, 4096, 48000);
        }
    });
}
