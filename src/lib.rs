//! charvoice - character voices for local TTS
//!
//! This library provides:
//! - Streaming Piper synthesis as WAV, with per-block DSP presets
//! - A bounded cache of loaded voice models
//! - Local MP3 playback with a fallback chain of strategies
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │        HTTP (/api/tts)      │        CLI             │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Synthesis session  │  Effect chain  │  Playback    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Voice cache ─► Piper models   │  cpal output       │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod config;
pub mod effects;
pub mod error;
pub mod playback;
pub mod synthesis;
pub mod voice;

pub use config::Config;
pub use effects::{Chain, ChainBuilder, DspCapabilities, Overrides, Preset};
pub use error::{Error, Result};
pub use playback::{ChunkSource, PlaybackCoordinator, PlayerKind};
pub use synthesis::{SynthesisRequest, SynthesisService, WavStream};
pub use voice::{LocalVoiceProvider, VoiceCache, VoiceProvider};
