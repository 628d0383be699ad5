//! Delay-line based stages: echo, chorus and pitch shifting

use std::f32::consts::TAU;

use super::{EffectStage, StageKind};

/// Circular buffer with fractional reads into the past
#[derive(Debug, Clone, Default)]
struct DelayLine {
    buffer: Vec<f32>,
    write: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(4)],
            write: 0,
        }
    }

    fn push(&mut self, sample: f32) {
        self.buffer[self.write] = sample;
        self.write = (self.write + 1) % self.buffer.len();
    }

    /// Sample `delay` positions back; 1.0 is the most recent push
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn tap(&self, delay: f32) -> f32 {
        let len = self.buffer.len();
        let delay = delay.clamp(1.0, (len - 2) as f32);
        let whole = delay.floor();
        let frac = delay - whole;
        let whole = whole as usize;

        let newer = self.buffer[(self.write + len - whole) % len];
        let older = self.buffer[(self.write + len - whole - 1) % len];
        newer + (older - newer) * frac
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write = 0;
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn samples_for(seconds: f32, sample_rate: u32) -> usize {
    (seconds * sample_rate as f32).round().max(1.0) as usize
}

/// Feedback echo
#[derive(Debug, Clone)]
pub struct Delay {
    seconds: f32,
    feedback: f32,
    mix: f32,
    line: DelayLine,
    configured_rate: u32,
}

impl Delay {
    /// Delay time clamped to [0, 2] s, feedback to [0, 0.95], mix to [0, 1]
    #[must_use]
    pub fn new(seconds: f32, feedback: f32, mix: f32) -> Self {
        Self {
            seconds: seconds.clamp(0.0, 2.0),
            feedback: feedback.clamp(0.0, 0.95),
            mix: mix.clamp(0.0, 1.0),
            line: DelayLine::default(),
            configured_rate: 0,
        }
    }

    /// Delay length in whole samples at a given rate
    #[must_use]
    pub fn delay_samples(&self, sample_rate: u32) -> usize {
        samples_for(self.seconds, sample_rate)
    }
}

impl EffectStage for Delay {
    fn kind(&self) -> StageKind {
        StageKind::Delay
    }

    #[allow(clippy::cast_precision_loss)]
    fn process(&mut self, block: &mut [f32], sample_rate: u32) {
        if sample_rate == 0 {
            return;
        }
        let delay = self.delay_samples(sample_rate);
        if self.configured_rate != sample_rate {
            self.line = DelayLine::new(delay + 3);
            self.configured_rate = sample_rate;
        }

        for s in block.iter_mut() {
            let echoed = self.line.tap(delay as f32);
            self.line.push(*s + echoed * self.feedback);
            *s = *s * (1.0 - self.mix) + echoed * self.mix;
        }
    }

    fn reset(&mut self) {
        self.line.clear();
    }
}

/// LFO-modulated short delay mixed with the dry signal
#[derive(Debug, Clone)]
pub struct Chorus {
    rate_hz: f32,
    depth: f32,
    centre_ms: f32,
    feedback: f32,
    mix: f32,
    phase: f32,
    line: DelayLine,
    configured_rate: u32,
}

impl Chorus {
    /// Create a chorus
    ///
    /// Rate is clamped to [0, 20] Hz, depth to [0, 1], centre delay to
    /// [0.5, 50] ms, feedback to [-0.95, 0.95], mix to [0, 1].
    #[must_use]
    pub fn new(rate_hz: f32, depth: f32, centre_ms: f32, feedback: f32, mix: f32) -> Self {
        Self {
            rate_hz: rate_hz.clamp(0.0, 20.0),
            depth: depth.clamp(0.0, 1.0),
            centre_ms: centre_ms.clamp(0.5, 50.0),
            feedback: feedback.clamp(-0.95, 0.95),
            mix: mix.clamp(0.0, 1.0),
            phase: 0.0,
            line: DelayLine::default(),
            configured_rate: 0,
        }
    }
}

impl EffectStage for Chorus {
    fn kind(&self) -> StageKind {
        StageKind::Chorus
    }

    #[allow(clippy::cast_precision_loss)]
    fn process(&mut self, block: &mut [f32], sample_rate: u32) {
        if sample_rate == 0 {
            return;
        }
        let centre = self.centre_ms * sample_rate as f32 / 1000.0;
        if self.configured_rate != sample_rate {
            // Swing reaches twice the centre at full depth
            self.line = DelayLine::new(samples_for(self.centre_ms * 2.0 / 1000.0, sample_rate) + 4);
            self.configured_rate = sample_rate;
        }
        let step = self.rate_hz / sample_rate as f32;

        for s in block.iter_mut() {
            let delay = centre * (1.0 + self.depth * (TAU * self.phase).sin());
            let wet = self.line.tap(delay.max(1.0));
            self.line.push(*s + wet * self.feedback);
            *s = *s * (1.0 - self.mix) + wet * self.mix;

            self.phase = (self.phase + step).fract();
        }
    }

    fn reset(&mut self) {
        self.line.clear();
        self.phase = 0.0;
    }
}

/// Length of the crossfade window in seconds
const PITCH_WINDOW_SECONDS: f32 = 0.05;

/// Dual-tap delay-line pitch shifter
///
/// Two read taps sweep through a short window half a period apart; each is
/// weighted by a triangular window so one is silent while it wraps.
#[derive(Debug, Clone)]
pub struct PitchShift {
    semitones: f32,
    phase: f32,
    window: f32,
    line: DelayLine,
    configured_rate: u32,
}

impl PitchShift {
    /// Shift in semitones, clamped to [-24, 24]
    #[must_use]
    pub fn new(semitones: f32) -> Self {
        Self {
            semitones: semitones.clamp(-24.0, 24.0),
            phase: 0.0,
            window: 0.0,
            line: DelayLine::default(),
            configured_rate: 0,
        }
    }

    /// Playback-rate ratio of the shifted signal
    #[must_use]
    pub fn ratio(&self) -> f32 {
        2f32.powf(self.semitones / 12.0)
    }

    fn triangle(phase: f32) -> f32 {
        1.0 - (2.0 * phase - 1.0).abs()
    }
}

impl EffectStage for PitchShift {
    fn kind(&self) -> StageKind {
        StageKind::PitchShift
    }

    #[allow(clippy::cast_precision_loss)]
    fn process(&mut self, block: &mut [f32], sample_rate: u32) {
        if sample_rate == 0 || self.semitones.abs() < f32::EPSILON {
            return;
        }
        if self.configured_rate != sample_rate {
            let window = samples_for(PITCH_WINDOW_SECONDS, sample_rate);
            self.window = window as f32;
            self.line = DelayLine::new(window + 4);
            self.configured_rate = sample_rate;
        }
        let step = (1.0 - self.ratio()) / self.window;

        for s in block.iter_mut() {
            self.line.push(*s);

            let other = (self.phase + 0.5).fract();
            let a = self.line.tap(1.0 + self.phase * self.window);
            let b = self.line.tap(1.0 + other * self.window);
            *s = a * Self::triangle(self.phase) + b * Self::triangle(other);

            self.phase = (self.phase + step).rem_euclid(1.0);
        }
    }

    fn reset(&mut self) {
        self.line.clear();
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(len: usize) -> Vec<f32> {
        let mut block = vec![0.0; len];
        block[0] = 1.0;
        block
    }

    #[test]
    fn test_delay_line_taps() {
        let mut line = DelayLine::new(8);
        for x in [1.0, 2.0, 3.0] {
            line.push(x);
        }
        assert!((line.tap(1.0) - 3.0).abs() < f32::EPSILON);
        assert!((line.tap(2.0) - 2.0).abs() < f32::EPSILON);
        assert!((line.tap(1.5) - 2.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_delay_echo_position() {
        let mut delay = Delay::new(0.01, 0.0, 1.0);
        let mut block = impulse(400);
        delay.process(&mut block, 16000);

        let n = delay.delay_samples(16000);
        assert_eq!(n, 160);
        assert!((block[n] - 1.0).abs() < 1e-6);
        assert!(block[0].abs() < 1e-6);
    }

    #[test]
    fn test_delay_feedback_decays() {
        let mut delay = Delay::new(0.001, 0.5, 1.0);
        let mut block = impulse(200);
        delay.process(&mut block, 16000);
        // 16-sample delay: echoes at 16, 32, 48 halve each round
        assert!((block[16] - 1.0).abs() < 1e-6);
        assert!((block[32] - 0.5).abs() < 1e-6);
        assert!((block[48] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_delay_tail_flushes_across_blocks() {
        let mut delay = Delay::new(0.01, 0.0, 0.5);
        let mut first = impulse(100);
        delay.process(&mut first, 16000);
        let mut silent = vec![0.0; 100];
        delay.process(&mut silent, 16000);
        // Echo of the impulse lands at 160, in the second block
        assert!((silent[60] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_chorus_dry_when_mix_zero() {
        let mut chorus = Chorus::new(1.6, 0.4, 7.0, 0.15, 0.0);
        let mut block: Vec<f32> = (0..512).map(|i| (i as f32 * 0.01).sin()).collect();
        let original = block.clone();
        chorus.process(&mut block, 22050);
        for (a, b) in block.iter().zip(&original) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_chorus_is_bounded() {
        let mut chorus = Chorus::new(20.0, 1.0, 50.0, 0.95, 1.0);
        let mut block = vec![0.5; 8192];
        chorus.process(&mut block, 16000);
        assert!(block.iter().all(|s| s.is_finite() && s.abs() < 20.0));
    }

    #[test]
    fn test_pitch_shift_zero_is_identity() {
        let mut shift = PitchShift::new(0.0);
        let mut block = vec![0.3, -0.2, 0.1];
        shift.process(&mut block, 22050);
        assert_eq!(block, vec![0.3, -0.2, 0.1]);
    }

    #[test]
    fn test_pitch_shift_preserves_dc_level() {
        // Complementary windows sum to one, so a steady signal stays steady
        let mut shift = PitchShift::new(4.0);
        let mut block = vec![0.5; 16000];
        shift.process(&mut block, 16000);
        for s in &block[2000..] {
            assert!((s - 0.5).abs() < 1e-3);
        }
    }

    #[test]
    fn test_pitch_ratio() {
        assert!((PitchShift::new(12.0).ratio() - 2.0).abs() < 1e-5);
        assert!((PitchShift::new(-12.0).ratio() - 0.5).abs() < 1e-5);
        assert!((PitchShift::new(100.0).ratio() - 4.0).abs() < 1e-4);
    }
}
