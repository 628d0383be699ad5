//! Freeverb-style room reverb (mono)

use super::{EffectStage, StageKind};

/// Comb lengths at 44.1 kHz
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass lengths at 44.1 kHz
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];

const INPUT_GAIN: f32 = 0.015;
const WET_SCALE: f32 = 3.0;
const DRY_SCALE: f32 = 2.0;
const DAMP_SCALE: f32 = 0.4;
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;

#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f32>,
    index: usize,
    store: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
            store: 0.0,
        }
    }

    #[inline]
    fn tick(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let out = self.buffer[self.index];
        self.store = out * (1.0 - damp) + self.store * damp;
        self.buffer[self.index] = input + self.store * feedback;
        self.index = (self.index + 1) % self.buffer.len();
        out
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.store = 0.0;
    }
}

#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f32>,
    index: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn tick(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = input + buffered * 0.5;
        self.index = (self.index + 1) % self.buffer.len();
        buffered - input
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Room reverb: eight damped combs in parallel feeding four allpasses in series
#[derive(Debug, Clone)]
pub struct Reverb {
    room_size: f32,
    damping: f32,
    wet: f32,
    dry: f32,
    width: f32,
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
    configured_rate: u32,
}

impl Reverb {
    /// Create a reverb; every parameter is clamped to [0, 1]
    #[must_use]
    pub fn new(room_size: f32, damping: f32, wet: f32, dry: f32, width: f32) -> Self {
        Self {
            room_size: room_size.clamp(0.0, 1.0),
            damping: damping.clamp(0.0, 1.0),
            wet: wet.clamp(0.0, 1.0),
            dry: dry.clamp(0.0, 1.0),
            width: width.clamp(0.0, 1.0),
            combs: Vec::new(),
            allpasses: Vec::new(),
            configured_rate: 0,
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn configure(&mut self, sample_rate: u32) {
        let scale = sample_rate as f32 / 44_100.0;
        let scaled = |len: usize| (len as f32 * scale).round() as usize;

        self.combs = COMB_TUNINGS.iter().map(|&len| Comb::new(scaled(len))).collect();
        self.allpasses = ALLPASS_TUNINGS
            .iter()
            .map(|&len| Allpass::new(scaled(len)))
            .collect();
        self.configured_rate = sample_rate;
    }
}

impl EffectStage for Reverb {
    fn kind(&self) -> StageKind {
        StageKind::Reverb
    }

    fn process(&mut self, block: &mut [f32], sample_rate: u32) {
        if sample_rate == 0 {
            return;
        }
        if self.configured_rate != sample_rate {
            self.configure(sample_rate);
        }

        let feedback = self.room_size * ROOM_SCALE + ROOM_OFFSET;
        let damp = self.damping * DAMP_SCALE;
        let wet = self.wet * WET_SCALE * (self.width / 2.0 + 0.5);
        let dry = self.dry * DRY_SCALE;

        for s in block.iter_mut() {
            let input = *s * INPUT_GAIN;
            let mut out = self
                .combs
                .iter_mut()
                .map(|comb| comb.tick(input, feedback, damp))
                .sum::<f32>();
            for allpass in &mut self.allpasses {
                out = allpass.tick(out);
            }
            *s = *s * dry + out * wet;
        }
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(Comb::clear);
        self.allpasses.iter_mut().for_each(Allpass::clear);
    }
}
