//! Error types for charvoice

use thiserror::Error;

use crate::playback::PlayerKind;

/// Result type alias for charvoice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the synthesis and playback pipelines
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration or request input
    #[error("configuration error: {0}")]
    Config(String),

    /// A required resource is not available (voice model, DSP backend)
    #[error("not configured: {0}")]
    ConfigurationMissing(String),

    /// PCM or compressed audio that cannot be interpreted
    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    /// Incremental decode needs more buffered bytes
    #[error("decoder needs more data ({buffered} bytes buffered)")]
    NeedMoreData { buffered: usize },

    /// The voice resource failed while producing audio
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Voice resolution or loading error
    #[error("voice error: {0}")]
    Voice(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// A single playback strategy failed
    #[error("{strategy} playback failed: {reason}")]
    Playback { strategy: PlayerKind, reason: String },

    /// Every strategy in the fallback order failed
    #[error("all playback strategies failed (last: {last}): {reason}")]
    PlaybackExhausted { last: PlayerKind, reason: String },

    /// A single-use chunk source was already consumed
    #[error("audio source already consumed and cannot be replayed")]
    SourceConsumed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Wrap a failure as belonging to the given playback strategy
    pub fn playback(strategy: PlayerKind, reason: impl std::fmt::Display) -> Self {
        Self::Playback {
            strategy,
            reason: reason.to_string(),
        }
    }

    /// Whether the failure means a resource is missing rather than broken
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::ConfigurationMissing(_))
    }
}
