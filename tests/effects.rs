//! Effect chain integration tests

use charvoice::audio::{bytes_to_float, float_to_bytes};
use charvoice::effects::{ChainBuilder, DspCapabilities, Overrides, Preset, StageKind, build_chain};

mod common;
use common::sine;

const SAMPLE_RATE: u32 = 22_050;

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0, |m, s| m.max(s.abs()))
}

/// Run a whole signal through a chain in fixed blocks
fn process_in_blocks(preset: &str, overrides: &Overrides, input: &[f32], block: usize) -> Vec<f32> {
    let mut chain = build_chain(preset, overrides);
    let mut out = Vec::with_capacity(input.len());
    for chunk in input.chunks(block) {
        let mut block = chunk.to_vec();
        chain.process(&mut block, SAMPLE_RATE);
        out.extend(block);
    }
    out
}

#[test]
fn test_limiter_holds_for_every_preset() {
    let loud = sine(330.0, SAMPLE_RATE as usize, SAMPLE_RATE, 1.0);
    let hot: Overrides = [("gain_db".to_string(), 24.0), ("drive_db".to_string(), 60.0)]
        .into_iter()
        .collect();

    for preset in Preset::ALL {
        let out = process_in_blocks(preset.name(), &hot, &loud, 4096);
        assert!(
            peak(&out) <= 1.0,
            "{preset} peaked at {}",
            peak(&out)
        );
        assert!(out.iter().all(|s| s.is_finite()));
    }
}

#[test]
fn test_unknown_preset_is_a_no_op() {
    let input = sine(440.0, 5000, SAMPLE_RATE, 0.4);
    let out = process_in_blocks("not-a-preset", &Overrides::new(), &input, 1024);
    assert_eq!(out, input);
}

#[test]
fn test_block_size_does_not_change_output_shape() {
    // Stateful stages carry over between blocks, so the output stays continuous
    let input = sine(200.0, 8192, SAMPLE_RATE, 0.1);
    let small = process_in_blocks("wizard", &Overrides::new(), &input, 512);
    let large = process_in_blocks("wizard", &Overrides::new(), &input, 4096);

    assert_eq!(small.len(), large.len());
    let energy = |s: &[f32]| s.iter().map(|x| x * x).sum::<f32>();
    let ratio = energy(&small) / energy(&large);
    assert!((0.8..1.25).contains(&ratio), "energy ratio {ratio}");
}

#[test]
fn test_unrelated_override_keys_are_ignored() {
    let input = sine(300.0, 4096, SAMPLE_RATE, 0.5);
    let stray: Overrides = [("warp_factor".to_string(), 9.0)].into_iter().collect();

    let with_stray = process_in_blocks("robot", &stray, &input, 1024);
    let plain = process_in_blocks("robot", &Overrides::new(), &input, 1024);
    assert_eq!(with_stray, plain);
}

#[test]
fn test_chain_builder_respects_capabilities() {
    let caps = DspCapabilities::full().without([StageKind::Reverb]);
    let chain = ChainBuilder::new(caps)
        .build("wizard", &Overrides::new())
        .unwrap();
    assert_eq!(
        chain.stage_kinds().len(),
        Preset::Wizard.stages(&Overrides::new()).len()
    );

    let err = ChainBuilder::new(DspCapabilities::absent())
        .build("wizard", &Overrides::new())
        .unwrap_err();
    assert!(err.is_unavailable());

    // No preset needs no DSP
    let empty = ChainBuilder::new(DspCapabilities::absent())
        .build("", &Overrides::new())
        .unwrap();
    assert!(empty.is_empty());
}

#[test]
fn test_pcm_round_trip_through_empty_chain() {
    let pcm: Vec<u8> = (0..2000u16)
        .flat_map(|i| i.wrapping_mul(37).to_le_bytes())
        .collect();
    let mut samples = bytes_to_float(&pcm).unwrap();
    build_chain("", &Overrides::new()).process(&mut samples, SAMPLE_RATE);
    assert_eq!(float_to_bytes(&samples), pcm);
}
