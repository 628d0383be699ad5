//! Per-block DSP effects
//!
//! A [`Chain`] is an ordered list of [`EffectStage`]s built from a named
//! [`Preset`] plus parameter overrides. Stages keep their own continuity
//! state (filter memory, delay lines, reverb tails, compressor envelope), so a
//! chain must be reused for every block of one stream and dropped afterwards.
//!
//! ```text
//!  block ──► stage 1 ──► stage 2 ──► … ──► stage N ──► limiter ──► block
//! ```

mod chain;
mod dynamics;
mod filter;
mod modulation;
mod preset;
mod reverb;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub use chain::{Chain, ChainBuilder, LIMITER_CEILING, apply_limiter, build_chain};
pub use dynamics::{Bypass, Compressor, Distortion, Gain};
pub use filter::{Biquad, FilterMode};
pub use modulation::{Chorus, Delay, PitchShift};
pub use preset::{PRESET_VERSION, Preset};
pub use reverb::Reverb;

/// Parameter overrides keyed by parameter name
pub type Overrides = HashMap<String, f32>;

/// A DSP operation with internal continuity state
pub trait EffectStage: Send {
    /// Which kind of stage this is
    fn kind(&self) -> StageKind;

    /// Process one block in place
    fn process(&mut self, block: &mut [f32], sample_rate: u32);

    /// Clear all continuity state
    fn reset(&mut self);
}

/// Stage types a chain can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Gain,
    PitchShift,
    Lowpass,
    Highpass,
    Reverb,
    Delay,
    Distortion,
    Chorus,
    Compressor,
}

impl StageKind {
    /// All stage kinds
    pub const ALL: [Self; 9] = [
        Self::Gain,
        Self::PitchShift,
        Self::Lowpass,
        Self::Highpass,
        Self::Reverb,
        Self::Delay,
        Self::Distortion,
        Self::Chorus,
        Self::Compressor,
    ];

    /// Stable lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gain => "gain",
            Self::PitchShift => "pitch_shift",
            Self::Lowpass => "lowpass",
            Self::Highpass => "highpass",
            Self::Reverb => "reverb",
            Self::Delay => "delay",
            Self::Distortion => "distortion",
            Self::Chorus => "chorus",
            Self::Compressor => "compressor",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown stage kind: {s}"))
    }
}

/// Which stage implementations are available at chain-build time
///
/// An unavailable stage becomes a [`Bypass`] so synthesis degrades to
/// unprocessed audio instead of failing.
#[derive(Debug, Clone)]
pub struct DspCapabilities {
    enabled: bool,
    unavailable: HashSet<StageKind>,
}

impl Default for DspCapabilities {
    fn default() -> Self {
        Self::full()
    }
}

impl DspCapabilities {
    /// Every stage available
    #[must_use]
    pub fn full() -> Self {
        Self {
            enabled: true,
            unavailable: HashSet::new(),
        }
    }

    /// No DSP backend at all
    #[must_use]
    pub fn absent() -> Self {
        Self {
            enabled: false,
            unavailable: StageKind::ALL.into_iter().collect(),
        }
    }

    /// Mark specific stage kinds as unavailable
    #[must_use]
    pub fn without(mut self, kinds: impl IntoIterator<Item = StageKind>) -> Self {
        self.unavailable.extend(kinds);
        self
    }

    /// Whether a DSP backend is present at all
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a given stage kind can be instantiated
    #[must_use]
    pub fn is_available(&self, kind: StageKind) -> bool {
        self.enabled && !self.unavailable.contains(&kind)
    }

    /// Replace the stage with a pass-through if its kind is unavailable
    #[must_use]
    pub fn admit(&self, stage: Box<dyn EffectStage>) -> Box<dyn EffectStage> {
        let kind = stage.kind();
        if self.is_available(kind) {
            stage
        } else {
            tracing::debug!(stage = %kind, "stage unavailable, using pass-through");
            Box::new(Bypass::new(kind))
        }
    }
}

/// Read a parameter from overrides, falling back when absent or non-finite
#[must_use]
pub fn param(overrides: &Overrides, name: &str, default: f32) -> f32 {
    overrides
        .get(name)
        .copied()
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

/// Convert decibels to a linear amplitude factor
#[must_use]
pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}
