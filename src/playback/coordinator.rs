//! Fallback across playback strategies

use std::sync::Arc;

use super::{
    AudioDecoder, ChunkSource, OutputDevice, PlaybackStrategy, PlayerKind, PlayerSettings,
    build_strategy,
};
use crate::{Error, Result};

/// Strategies tried, in order, when playback starts with `start`
#[must_use]
pub fn fallback_order(start: PlayerKind) -> Vec<PlayerKind> {
    match start {
        PlayerKind::Optimized | PlayerKind::StreamCollect | PlayerKind::Buffered => {
            vec![start, PlayerKind::Fallback, PlayerKind::Simple]
        }
        PlayerKind::Fallback => vec![PlayerKind::Fallback, PlayerKind::Simple],
        PlayerKind::Simple => vec![PlayerKind::Simple],
    }
}

/// Runs strategies until one plays the source
pub struct PlaybackCoordinator {
    strategies: Vec<Box<dyn PlaybackStrategy>>,
}

impl PlaybackCoordinator {
    #[must_use]
    pub const fn from_strategies(strategies: Vec<Box<dyn PlaybackStrategy>>) -> Self {
        Self { strategies }
    }

    /// The standard fallback order for a starting strategy
    #[must_use]
    pub fn for_kind(
        start: PlayerKind,
        device: &Arc<dyn OutputDevice>,
        decoder: &Arc<dyn AudioDecoder>,
        settings: &PlayerSettings,
    ) -> Self {
        let strategies = fallback_order(start)
            .into_iter()
            .map(|kind| build_strategy(kind, device, decoder, settings))
            .collect();
        Self::from_strategies(strategies)
    }

    #[must_use]
    pub fn order(&self) -> Vec<PlayerKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Play the source, returning the strategy that succeeded
    ///
    /// # Errors
    ///
    /// Returns `PlaybackExhausted` naming the last strategy tried, either
    /// because all of them failed or because the source cannot be replayed
    /// after a failure.
    pub fn play(&self, mut source: ChunkSource) -> Result<PlayerKind> {
        let mut last: Option<(PlayerKind, String)> = None;

        for (attempt, strategy) in self.strategies.iter().enumerate() {
            let kind = strategy.kind();
            if attempt > 0 && !source.is_replayable() {
                tracing::warn!(strategy = %kind, "source cannot be replayed, giving up");
                break;
            }

            let chunks = match source.attempt() {
                Ok(chunks) => chunks,
                Err(e) => {
                    last = Some((kind, e.to_string()));
                    break;
                }
            };

            match strategy.play(chunks) {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::info!(strategy = %kind, attempt = attempt + 1, "playback recovered");
                    } else {
                        tracing::debug!(strategy = %kind, "playback finished");
                    }
                    return Ok(kind);
                }
                Err(e) => {
                    tracing::warn!(strategy = %kind, error = %e, "playback strategy failed");
                    last = Some((kind, e.to_string()));
                }
            }
        }

        let (last, reason) = last.unwrap_or_else(|| {
            (
                PlayerKind::Simple,
                "no playback strategies configured".to_string(),
            )
        });
        Err(Error::PlaybackExhausted { last, reason })
    }
}
