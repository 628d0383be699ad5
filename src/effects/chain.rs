//! Stage chains and the block processor

use std::fmt;

use super::{DspCapabilities, EffectStage, Overrides, Preset, StageKind};
use crate::{Error, Result};

/// Peak a block is scaled down to when it clips
pub const LIMITER_CEILING: f32 = 0.98;

/// Scale a block so its peak never exceeds [`LIMITER_CEILING`] once it clips
///
/// Non-finite samples are zeroed first.
pub fn apply_limiter(block: &mut [f32]) {
    let mut peak = 0.0f32;
    for s in block.iter_mut() {
        if !s.is_finite() {
            *s = 0.0;
        }
        peak = peak.max(s.abs());
    }

    if peak > 1.0 {
        let scale = LIMITER_CEILING / peak;
        for s in block.iter_mut() {
            *s *= scale;
        }
    }
}

/// Ordered stages owned by a single stream
#[derive(Default)]
pub struct Chain {
    stages: Vec<Box<dyn EffectStage>>,
}

impl Chain {
    /// A chain with no stages; only the limiter runs
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_stages(stages: Vec<Box<dyn EffectStage>>) -> Self {
        Self { stages }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|stage| stage.kind()).collect()
    }

    /// Run every stage over the block in order, then the limiter
    pub fn process(&mut self, block: &mut [f32], sample_rate: u32) {
        for stage in &mut self.stages {
            stage.process(block, sample_rate);
        }
        apply_limiter(block);
    }

    /// Process a silent block of `len` samples to drain stage tails
    #[must_use]
    pub fn flush(&mut self, len: usize, sample_rate: u32) -> Vec<f32> {
        let mut block = vec![0.0; len];
        self.process(&mut block, sample_rate);
        block
    }

    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stage_kinds())
            .finish()
    }
}

/// Builds chains against the stages the running process can provide
#[derive(Debug, Clone, Default)]
pub struct ChainBuilder {
    capabilities: DspCapabilities,
}

impl ChainBuilder {
    #[must_use]
    pub const fn new(capabilities: DspCapabilities) -> Self {
        Self { capabilities }
    }

    #[must_use]
    pub const fn capabilities(&self) -> &DspCapabilities {
        &self.capabilities
    }

    /// Build the chain for a preset name
    ///
    /// Unknown presets yield an empty chain.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationMissing` for a known preset when no DSP backend
    /// is present
    pub fn build(&self, preset: &str, overrides: &Overrides) -> Result<Chain> {
        let Some(preset) = Preset::lookup(preset) else {
            tracing::debug!(preset = %preset, "unknown preset, streaming unprocessed");
            return Ok(Chain::empty());
        };

        if !self.capabilities.is_enabled() {
            return Err(Error::ConfigurationMissing(format!(
                "DSP backend unavailable for preset {preset}"
            )));
        }

        let stages = preset
            .stages(overrides)
            .into_iter()
            .map(|stage| self.capabilities.admit(stage))
            .collect();

        let chain = Chain::from_stages(stages);
        tracing::debug!(preset = %preset, stages = chain.len(), "built effect chain");
        Ok(chain)
    }
}

/// Build a chain with every stage available
#[must_use]
pub fn build_chain(preset: &str, overrides: &Overrides) -> Chain {
    Preset::lookup(preset).map_or_else(Chain::empty, |preset| {
        Chain::from_stages(preset.stages(overrides))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_scales_clipping_block() {
        let mut block = vec![2.0, -1.0, 0.5];
        apply_limiter(&mut block);
        assert!((block[0] - 0.98).abs() < 1e-6);
        assert!((block[1] + 0.49).abs() < 1e-6);
    }

    #[test]
    fn test_limiter_leaves_quiet_block() {
        let mut block = vec![1.0, -0.7];
        apply_limiter(&mut block);
        assert_eq!(block, vec![1.0, -0.7]);
    }

    #[test]
    fn test_limiter_zeroes_non_finite() {
        let mut block = vec![f32::NAN, f32::INFINITY, 3.0];
        apply_limiter(&mut block);
        assert_eq!(block[0], 0.0);
        assert_eq!(block[1], 0.0);
        assert!((block[2] - 0.98).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_preset_is_identity() {
        let mut chain = build_chain("dragon", &Overrides::new());
        assert!(chain.is_empty());

        let mut block = vec![0.1, -0.2, 0.3];
        chain.process(&mut block, 22050);
        assert_eq!(block, vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_builder_bypasses_unavailable_stages() {
        let builder = ChainBuilder::new(DspCapabilities::full().without([StageKind::Reverb]));
        let chain = builder.build("wizard", &Overrides::new()).unwrap();
        // Same shape, the reverb slot is now a pass-through
        assert_eq!(chain.len(), 5);
        assert!(chain.stage_kinds().contains(&StageKind::Reverb));
    }

    #[test]
    fn test_builder_without_backend() {
        let builder = ChainBuilder::new(DspCapabilities::absent());
        let err = builder.build("robot", &Overrides::new()).unwrap_err();
        assert!(matches!(err, Error::ConfigurationMissing(_)));

        let chain = builder.build("nobody", &Overrides::new()).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_flush_emits_tail() {
        let mut chain = build_chain("robot", &Overrides::new());
        let mut block = vec![0.0; 1024];
        block[1000] = 0.9;
        chain.process(&mut block, 16000);

        let tail = chain.flush(1024, 16000);
        assert_eq!(tail.len(), 1024);
        assert!(tail.iter().any(|s| s.abs() > 0.0));
    }
}
