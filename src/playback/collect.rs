//! Collect-then-decode playback

use std::sync::Arc;

use super::device::write_frames;
use super::{AudioDecoder, ChunkStream, OutputDevice, PlaybackStrategy, PlayerKind};
use crate::{Error, Result};

/// Interleaved samples per output write (8 KB of PCM16)
pub const FRAME_SAMPLES: usize = 4096;

/// Frames between short pauses that let the device drain
const PAUSE_EVERY: usize = 10;

/// Reads the whole stream, decodes it once and writes fixed-size frames
///
/// Highest latency, but a single decode means no frame-boundary artifacts.
pub struct OptimizedPlayer {
    device: Arc<dyn OutputDevice>,
    decoder: Arc<dyn AudioDecoder>,
}

impl OptimizedPlayer {
    #[must_use]
    pub fn new(device: Arc<dyn OutputDevice>, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { device, decoder }
    }
}

/// Gather every chunk, stopping at the first upstream error
pub(crate) fn collect_chunks(chunks: ChunkStream) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    for chunk in chunks {
        data.extend_from_slice(&chunk?);
    }
    Ok(data)
}

/// Decode a complete buffer and play it through the device
pub(crate) fn play_buffer(
    data: &[u8],
    device: &dyn OutputDevice,
    decoder: &dyn AudioDecoder,
) -> Result<usize> {
    let decoded = decoder.decode(data).map_err(|e| match e {
        Error::NeedMoreData { buffered } => {
            Error::MalformedAudio(format!("no decodable audio in {buffered} bytes"))
        }
        other => other,
    })?;

    let mut sink = device.open()?;
    let audio = decoded.reformat(sink.format())?;
    let frames = write_frames(sink.as_mut(), &audio.samples, FRAME_SAMPLES, PAUSE_EVERY)?;
    sink.finish()?;

    tracing::debug!(
        bytes = data.len(),
        frames,
        duration_ms = u64::try_from(audio.duration().as_millis()).unwrap_or(u64::MAX),
        "buffer played"
    );
    Ok(frames)
}

impl PlaybackStrategy for OptimizedPlayer {
    fn kind(&self) -> PlayerKind {
        PlayerKind::Optimized
    }

    fn play(&self, chunks: ChunkStream) -> Result<()> {
        let data = collect_chunks(chunks)?;
        if data.is_empty() {
            tracing::debug!("nothing to play");
            return Ok(());
        }
        play_buffer(&data, self.device.as_ref(), self.decoder.as_ref())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::i16_to_bytes;
    use crate::playback::{MemoryDevice, OutputFormat, PcmDecoder};

    fn player(device: &MemoryDevice) -> OptimizedPlayer {
        let format = OutputFormat::new(16000, 1);
        OptimizedPlayer::new(
            Arc::new(device.clone()),
            Arc::new(PcmDecoder::new(format)),
        )
    }

    #[test]
    fn test_plays_in_fixed_frames() {
        let device = MemoryDevice::new(OutputFormat::new(16000, 1));
        let pcm = i16_to_bytes(&vec![1000i16; 5000]);
        let pieces: Vec<Result<Vec<u8>>> = pcm.chunks(777).map(|c| Ok(c.to_vec())).collect();
        let chunks: ChunkStream = Box::new(pieces.into_iter());

        player(&device).play(chunks).unwrap();

        assert_eq!(device.write_sizes(), vec![FRAME_SAMPLES, FRAME_SAMPLES]);
        let samples = device.samples();
        assert!((samples[0] - 1000.0 / 32768.0).abs() < 1e-6);
        assert!(samples[5000..].iter().all(|s| s.abs() < f32::EPSILON));
    }

    #[test]
    fn test_empty_stream_is_ok() {
        let device = MemoryDevice::new(OutputFormat::new(16000, 1));
        player(&device).play(Box::new(std::iter::empty())).unwrap();
        assert!(device.write_sizes().is_empty());
    }

    #[test]
    fn test_undecodable_is_malformed() {
        let device = MemoryDevice::new(OutputFormat::new(16000, 1));
        let chunks: ChunkStream = Box::new(vec![Ok(vec![1u8, 2, 3])].into_iter());
        let err = player(&device).play(chunks).unwrap_err();
        assert!(matches!(err, Error::MalformedAudio(_)));
    }

    #[test]
    fn test_upstream_error_propagates() {
        let device = MemoryDevice::new(OutputFormat::new(16000, 1));
        let chunks: ChunkStream = Box::new(
            vec![Ok(vec![0u8, 0]), Err(Error::Audio("cut".to_string()))].into_iter(),
        );
        assert!(player(&device).play(chunks).is_err());
        assert!(device.write_sizes().is_empty());
    }
}
