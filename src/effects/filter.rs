//! Second-order low/high-pass filters (RBJ cookbook, transposed direct form II)

use std::f32::consts::PI;

use super::{EffectStage, StageKind};

/// Butterworth quality factor
const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Filter response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Lowpass,
    Highpass,
}

/// Biquad filter stage
#[derive(Debug, Clone)]
pub struct Biquad {
    mode: FilterMode,
    cutoff_hz: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
    configured_rate: u32,
}

impl Biquad {
    /// Create a low-pass filter
    #[must_use]
    pub fn lowpass(cutoff_hz: f32) -> Self {
        Self::new(FilterMode::Lowpass, cutoff_hz)
    }

    /// Create a high-pass filter
    #[must_use]
    pub fn highpass(cutoff_hz: f32) -> Self {
        Self::new(FilterMode::Highpass, cutoff_hz)
    }

    fn new(mode: FilterMode, cutoff_hz: f32) -> Self {
        Self {
            mode,
            cutoff_hz,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            configured_rate: 0,
        }
    }

    /// Cutoff actually used at a given sample rate
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn effective_cutoff(&self, sample_rate: u32) -> f32 {
        let nyquist_guard = sample_rate as f32 * 0.45;
        let cutoff = if self.cutoff_hz.is_finite() {
            self.cutoff_hz
        } else {
            nyquist_guard
        };
        cutoff.clamp(10.0, nyquist_guard.max(10.0))
    }

    #[allow(clippy::cast_precision_loss)]
    fn configure(&mut self, sample_rate: u32) {
        let cutoff = self.effective_cutoff(sample_rate);
        let w0 = 2.0 * PI * cutoff / sample_rate as f32;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * BUTTERWORTH_Q);

        let (b0, b1, b2) = match self.mode {
            FilterMode::Lowpass => {
                let b = (1.0 - cos_w0) / 2.0;
                (b, 1.0 - cos_w0, b)
            }
            FilterMode::Highpass => {
                let b = (1.0 + cos_w0) / 2.0;
                (b, -(1.0 + cos_w0), b)
            }
        };
        let a0 = 1.0 + alpha;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = (-2.0 * cos_w0) / a0;
        self.a2 = (1.0 - alpha) / a0;
        self.configured_rate = sample_rate;
    }

    /// Filter one sample
    #[inline]
    pub fn tick(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

impl EffectStage for Biquad {
    fn kind(&self) -> StageKind {
        match self.mode {
            FilterMode::Lowpass => StageKind::Lowpass,
            FilterMode::Highpass => StageKind::Highpass,
        }
    }

    fn process(&mut self, block: &mut [f32], sample_rate: u32) {
        if sample_rate == 0 {
            return;
        }
        if self.configured_rate != sample_rate {
            self.configure(sample_rate);
        }
        for s in block.iter_mut() {
            *s = self.tick(*s);
        }
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}
