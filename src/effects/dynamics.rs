//! Level and waveshaping stages

use std::f32::consts::PI;

use super::{EffectStage, StageKind, db_to_linear};

/// Static gain
#[derive(Debug, Clone)]
pub struct Gain {
    factor: f32,
}

impl Gain {
    /// Gain in decibels, clamped to [-60, 24]
    #[must_use]
    pub fn new(gain_db: f32) -> Self {
        Self {
            factor: db_to_linear(gain_db.clamp(-60.0, 24.0)),
        }
    }
}

impl EffectStage for Gain {
    fn kind(&self) -> StageKind {
        StageKind::Gain
    }

    fn process(&mut self, block: &mut [f32], _sample_rate: u32) {
        for s in block.iter_mut() {
            *s *= self.factor;
        }
    }

    fn reset(&mut self) {}
}

/// `tanh` waveshaper driven by a pre-gain
#[derive(Debug, Clone)]
pub struct Distortion {
    drive: f32,
}

impl Distortion {
    /// Drive in decibels, clamped to [0, 60]
    #[must_use]
    pub fn new(drive_db: f32) -> Self {
        Self {
            drive: db_to_linear(drive_db.clamp(0.0, 60.0)),
        }
    }
}

impl EffectStage for Distortion {
    fn kind(&self) -> StageKind {
        StageKind::Distortion
    }

    fn process(&mut self, block: &mut [f32], _sample_rate: u32) {
        for s in block.iter_mut() {
            *s = (*s * self.drive).tanh();
        }
    }

    fn reset(&mut self) {}
}

/// Downward compressor with a peak envelope follower
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold: f32,
    ratio: f32,
    attack_ms: f32,
    release_ms: f32,
    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
    configured_rate: u32,
}

impl Compressor {
    /// Create a compressor
    ///
    /// Threshold is clamped to [-80, 0] dB, ratio to [1, 50], times to
    /// [0, 5000] ms.
    #[must_use]
    pub fn new(threshold_db: f32, ratio: f32, attack_ms: f32, release_ms: f32) -> Self {
        Self {
            threshold: db_to_linear(threshold_db.clamp(-80.0, 0.0)),
            ratio: ratio.clamp(1.0, 50.0),
            attack_ms: attack_ms.clamp(0.0, 5000.0),
            release_ms: release_ms.clamp(0.0, 5000.0),
            envelope: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            configured_rate: 0,
        }
    }

    /// Current envelope level (linear)
    #[must_use]
    pub const fn envelope(&self) -> f32 {
        self.envelope
    }

    #[allow(clippy::cast_precision_loss)]
    fn time_constant(ms: f32, sample_rate: u32) -> f32 {
        if ms < 1.0e-3 {
            0.0
        } else {
            (-2.0 * PI * 1000.0 / (sample_rate as f32 * ms)).exp()
        }
    }

    fn configure(&mut self, sample_rate: u32) {
        self.attack_coeff = Self::time_constant(self.attack_ms, sample_rate);
        self.release_coeff = Self::time_constant(self.release_ms, sample_rate);
        self.configured_rate = sample_rate;
    }
}

impl EffectStage for Compressor {
    fn kind(&self) -> StageKind {
        StageKind::Compressor
    }

    fn process(&mut self, block: &mut [f32], sample_rate: u32) {
        if sample_rate == 0 {
            return;
        }
        if self.configured_rate != sample_rate {
            self.configure(sample_rate);
        }

        let exponent = 1.0 / self.ratio - 1.0;
        for s in block.iter_mut() {
            let level = s.abs();
            let coeff = if level > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = coeff * self.envelope + (1.0 - coeff) * level;

            if self.envelope > self.threshold {
                *s *= (self.envelope / self.threshold).powf(exponent);
            }
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// Pass-through standing in for an unavailable stage
#[derive(Debug, Clone)]
pub struct Bypass {
    kind: StageKind,
}

impl Bypass {
    #[must_use]
    pub const fn new(kind: StageKind) -> Self {
        Self { kind }
    }
}

impl EffectStage for Bypass {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn process(&mut self, _block: &mut [f32], _sample_rate: u32) {}

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_scales() {
        let mut gain = Gain::new(-6.0);
        let mut block = vec![1.0, -0.5];
        gain.process(&mut block, 16000);
        assert!((block[0] - 0.501).abs() < 1e-3);
        assert!((block[1] + 0.2506).abs() < 1e-3);
    }

    #[test]
    fn test_gain_clamps_absurd_values() {
        let mut gain = Gain::new(1000.0);
        let mut block = vec![0.01];
        gain.process(&mut block, 16000);
        assert!(block[0] <= 0.01 * db_to_linear(24.0) + 1e-6);
    }

    #[test]
    fn test_distortion_is_bounded() {
        let mut dist = Distortion::new(40.0);
        let mut block = vec![0.9, -0.9, 0.001, 0.0];
        dist.process(&mut block, 16000);
        assert!(block.iter().all(|s| s.abs() <= 1.0));
        assert!(block[0] > 0.99);
        assert!(block[3].abs() < f32::EPSILON);
    }

    #[test]
    fn test_compressor_reduces_loud_signal() {
        let mut comp = Compressor::new(-20.0, 4.0, 1.0, 100.0);
        let mut block = vec![0.8; 4000];
        comp.process(&mut block, 16000);
        // After the attack settles the output is well below the input
        assert!(block[3999] < 0.4);
        assert!(comp.envelope() > 0.7);
    }

    #[test]
    fn test_compressor_leaves_quiet_signal() {
        let mut comp = Compressor::new(-10.0, 4.0, 1.0, 100.0);
        let mut block = vec![0.05; 1000];
        comp.process(&mut block, 16000);
        assert!(block.iter().all(|s| (s - 0.05).abs() < 1e-6));
    }

    #[test]
    fn test_compressor_envelope_carries_over() {
        let mut comp = Compressor::new(-20.0, 4.0, 1.0, 500.0);
        let mut loud = vec![0.9; 2000];
        comp.process(&mut loud, 16000);
        let mut quiet = vec![0.2; 10];
        comp.process(&mut quiet, 16000);
        // Envelope still high from the previous block, so the quiet block is squashed too
        assert!(quiet[0] < 0.2);

        comp.reset();
        let mut quiet = vec![0.2; 1];
        comp.process(&mut quiet, 16000);
        assert!(comp.envelope() < 0.3);
    }

    #[test]
    fn test_bypass_is_identity() {
        let mut bypass = Bypass::new(StageKind::Reverb);
        let mut block = vec![0.1, 0.2, -0.3];
        bypass.process(&mut block, 16000);
        assert_eq!(block, vec![0.1, 0.2, -0.3]);
        assert_eq!(bypass.kind(), StageKind::Reverb);
    }
}
