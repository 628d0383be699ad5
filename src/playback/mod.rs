//! Local playback of compressed (MP3) chunk streams
//!
//! Several strategies trade latency against robustness; the
//! [`PlaybackCoordinator`] walks a fixed fallback order until one succeeds.
//!
//! ```text
//!  ChunkSource ──► Optimized / StreamCollect / Buffered ──► OutputDevice
//!       │               │ failure
//!       │               ▼
//!       └─ replay ──► Fallback (system player) ──► Simple
//! ```

mod bucketed;
mod collect;
mod coordinator;
mod decode;
mod device;
mod external;
mod incremental;
mod source;
mod threaded;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use bucketed::BufferedPlayer;
pub use collect::OptimizedPlayer;
pub use coordinator::{PlaybackCoordinator, fallback_order};
pub use decode::{AudioDecoder, DecodedAudio, IncrementalDecoder, Mp3Decoder, PcmDecoder};
pub use device::{AudioSink, DefaultOutputDevice, MemoryDevice, OutputDevice, OutputFormat};
pub use external::{DEFAULT_EXTERNAL_PLAYERS, ExternalPlayer};
pub use incremental::SimplePlayer;
pub use source::{ChunkSource, SOURCE_CHUNK_BYTES};
pub use threaded::StreamCollectPlayer;

use crate::Result;

/// Lazy sequence of compressed audio chunks
pub type ChunkStream = Box<dyn Iterator<Item = Result<Vec<u8>>> + Send>;

/// Playback strategies, named as in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerKind {
    /// Collect everything, decode once, write fixed-size frames
    Optimized,
    /// Producer thread feeding ~32 KB batches to a decoding consumer
    StreamCollect,
    /// Incremental decode emitting 500 ms buckets
    Buffered,
    /// Temp file handed to a system player
    Fallback,
    /// Minimal incremental decode, written as it decodes
    Simple,
}

impl PlayerKind {
    pub const ALL: [Self; 5] = [
        Self::Optimized,
        Self::StreamCollect,
        Self::Buffered,
        Self::Fallback,
        Self::Simple,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Optimized => "optimized",
            Self::StreamCollect => "stream_collect",
            Self::Buffered => "buffered",
            Self::Fallback => "fallback",
            Self::Simple => "simple",
        }
    }
}

impl fmt::Display for PlayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown player: {s}"))
    }
}

/// One way of getting a chunk stream out of the speakers
pub trait PlaybackStrategy: Send + Sync {
    fn kind(&self) -> PlayerKind;

    /// Play the stream, blocking until playback completes or fails
    ///
    /// An empty stream is a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns error if decoding or the output device fails
    fn play(&self, chunks: ChunkStream) -> Result<()>;
}

/// Output settings shared by every strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSettings {
    pub format: OutputFormat,
    /// System players tried in order, program followed by its arguments
    pub external_players: Vec<String>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            external_players: DEFAULT_EXTERNAL_PLAYERS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Build the strategy for a kind
#[must_use]
pub fn build_strategy(
    kind: PlayerKind,
    device: &Arc<dyn OutputDevice>,
    decoder: &Arc<dyn AudioDecoder>,
    settings: &PlayerSettings,
) -> Box<dyn PlaybackStrategy> {
    let device = Arc::clone(device);
    let decoder = Arc::clone(decoder);
    match kind {
        PlayerKind::Optimized => Box::new(OptimizedPlayer::new(device, decoder)),
        PlayerKind::StreamCollect => Box::new(StreamCollectPlayer::new(device, decoder)),
        PlayerKind::Buffered => Box::new(BufferedPlayer::new(device, decoder)),
        PlayerKind::Fallback => Box::new(ExternalPlayer::new(
            settings.external_players.clone(),
            device,
            decoder,
        )),
        PlayerKind::Simple => Box::new(SimplePlayer::new(device, decoder)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_kind_parse() {
        assert_eq!("optimized".parse::<PlayerKind>().unwrap(), PlayerKind::Optimized);
        assert_eq!("Stream-Collect".parse::<PlayerKind>().unwrap(), PlayerKind::StreamCollect);
        assert_eq!(" simple ".parse::<PlayerKind>().unwrap(), PlayerKind::Simple);
        assert!("original".parse::<PlayerKind>().is_err());
    }

    #[test]
    fn test_player_kind_round_trips_names() {
        for kind in PlayerKind::ALL {
            assert_eq!(kind.to_string().parse::<PlayerKind>().unwrap(), kind);
        }
    }
}
