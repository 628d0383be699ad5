//! Streaming text-to-speech with per-block effects
//!
//! ```text
//!  request ──► voice cache ──► chunks ──► session ──► mpsc(4) ──► WAV stream
//!                                            │
//!                                       effect chain
//! ```
//!
//! The session runs on a blocking thread and hands frames over a bounded
//! channel, so a slow client throttles synthesis and a dropped one stops it.

mod request;
mod session;

use std::path::Path;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

pub use request::{CONTROL_KEYS, SynthesisRequest, parse_overrides};
pub use session::{SessionState, SynthesisSession};

use crate::audio::{WAV_HEADER_SIZE, wav};
use crate::effects::ChainBuilder;
use crate::voice::{LocalVoiceProvider, VoiceCache};
use crate::{Config, Error, Result};

/// Frames buffered between the session thread and the client
pub const STREAM_BUFFER_FRAMES: usize = 4;

/// An open WAV stream
pub struct WavStream {
    sample_rate: u32,
    voice: String,
    frames: mpsc::Receiver<Vec<u8>>,
}

impl WavStream {
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Cache key of the voice producing this stream
    #[must_use]
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Frames as a fallible byte stream
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<u8>>> + Send + 'static {
        ReceiverStream::new(self.frames).map(Ok)
    }

    /// Wait for the whole stream
    pub async fn collect(mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(frame) = self.frames.recv().await {
            out.extend_from_slice(&frame);
        }
        out
    }
}

/// Summary of a rendered file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    pub sample_rate: u32,
    pub pcm_bytes: usize,
}

/// Opens synthesis streams against the shared voice cache
pub struct SynthesisService {
    voices: Arc<VoiceCache>,
    chains: ChainBuilder,
    default_voice: String,
}

impl SynthesisService {
    #[must_use]
    pub fn new(
        voices: Arc<VoiceCache>,
        chains: ChainBuilder,
        default_voice: impl Into<String>,
    ) -> Self {
        Self {
            voices,
            chains,
            default_voice: default_voice.into(),
        }
    }

    /// Service over the configured voices directory
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let provider = LocalVoiceProvider::new(&config.voice.voices_dir);
        let voices = VoiceCache::new(Arc::new(provider), config.voice.cache_capacity);
        Self::new(
            Arc::new(voices),
            ChainBuilder::new(config.capabilities()),
            config.voice.default_voice.clone(),
        )
    }

    #[must_use]
    pub const fn voices(&self) -> &Arc<VoiceCache> {
        &self.voices
    }

    #[must_use]
    pub const fn chains(&self) -> &ChainBuilder {
        &self.chains
    }

    #[must_use]
    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    /// Acquire the voice, build the chain and start synthesis
    ///
    /// Every failure that can be reported surfaces here, before any byte of
    /// the stream exists.
    async fn start(&self, request: SynthesisRequest) -> Result<SynthesisSession> {
        request.validate()?;

        let chain = self.chains.build(&request.preset, &request.overrides)?;

        let voice_id = if request.voice.trim().is_empty() {
            self.default_voice.as_str()
        } else {
            request.voice.as_str()
        };
        let voice = self.voices.acquire(voice_id).await?;

        let resource = Arc::clone(&voice.resource);
        let SynthesisRequest { text, prosody, .. } = request;
        let chunks = tokio::task::spawn_blocking(move || resource.synthesize(&text, &prosody))
            .await
            .map_err(|e| Error::Synthesis(format!("synthesis task failed: {e}")))??;

        tracing::info!(
            voice = %voice.key,
            sample_rate = voice.sample_rate,
            preset = %request.preset,
            stages = chain.len(),
            "synthesis started"
        );

        Ok(SynthesisSession::new(voice, chain, chunks))
    }

    /// Open a streaming WAV response
    ///
    /// # Errors
    ///
    /// Returns `Config` for empty text and `ConfigurationMissing` when the
    /// voice or DSP backend is unavailable
    pub async fn open_stream(&self, request: SynthesisRequest) -> Result<WavStream> {
        let mut session = self.start(request).await?;
        let sample_rate = session.sample_rate();
        let voice = session.voice_key().unwrap_or_default().to_string();

        let (tx, rx) = mpsc::channel(STREAM_BUFFER_FRAMES);
        tokio::task::spawn_blocking(move || {
            for frame in session.by_ref() {
                if tx.blocking_send(frame).is_err() {
                    tracing::debug!("client went away, stopping synthesis");
                    break;
                }
            }
            session.close();
        });

        Ok(WavStream {
            sample_rate,
            voice,
            frames: rx,
        })
    }

    /// Synthesize to a finalized WAV file
    ///
    /// # Errors
    ///
    /// Returns the start errors of [`Self::open_stream`], the upstream error
    /// if synthesis ended early, or the file write error
    pub async fn render_to_file(
        &self,
        request: SynthesisRequest,
        path: &Path,
    ) -> Result<RenderSummary> {
        let mut session = self.start(request).await?;
        let sample_rate = session.sample_rate();

        let pcm = tokio::task::spawn_blocking(move || {
            let mut pcm = Vec::new();
            for frame in session.by_ref().skip(1) {
                pcm.extend_from_slice(&frame);
            }
            session.failure().map_or(Ok(pcm), |e| Err(Error::Synthesis(e.to_string())))
        })
        .await
        .map_err(|e| Error::Synthesis(format!("synthesis task failed: {e}")))??;

        wav::write_wav_file(path, &pcm, sample_rate)?;
        tracing::info!(path = %path.display(), bytes = pcm.len(), sample_rate, "rendered WAV file");

        Ok(RenderSummary {
            sample_rate,
            pcm_bytes: pcm.len(),
        })
    }
}

/// Split a collected stream into its header and payload
///
/// # Errors
///
/// Returns `MalformedAudio` if the stream is shorter than a header
pub fn split_wav(bytes: &[u8]) -> Result<(wav::HeaderInfo, &[u8])> {
    let info = wav::parse_header(bytes)?;
    Ok((info, &bytes[WAV_HEADER_SIZE..]))
}
