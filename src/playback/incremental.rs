//! Minimal incremental playback

use std::sync::Arc;

use super::{
    AudioDecoder, AudioSink, ChunkStream, DecodedAudio, IncrementalDecoder, OutputDevice,
    PlaybackStrategy, PlayerKind,
};
use crate::Result;

/// Bytes buffered before each decode attempt
pub const DECODE_THRESHOLD: usize = 16 * 1024;

/// Decodes every 16 KB and writes the result straight away
///
/// The last resort: no threads, no temp files, few assumptions.
pub struct SimplePlayer {
    device: Arc<dyn OutputDevice>,
    decoder: Arc<dyn AudioDecoder>,
}

impl SimplePlayer {
    #[must_use]
    pub fn new(device: Arc<dyn OutputDevice>, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { device, decoder }
    }
}

impl PlaybackStrategy for SimplePlayer {
    fn kind(&self) -> PlayerKind {
        PlayerKind::Simple
    }

    fn play(&self, chunks: ChunkStream) -> Result<()> {
        let mut incremental = IncrementalDecoder::new(self.decoder.as_ref(), DECODE_THRESHOLD);
        let mut sink = None;

        for chunk in chunks {
            if let Some(decoded) = incremental.push(&chunk?)? {
                self.write(&mut sink, &decoded)?;
            }
        }
        if let Some(decoded) = incremental.finish()? {
            self.write(&mut sink, &decoded)?;
        }

        match sink {
            Some(mut sink) => sink.finish(),
            None => {
                tracing::debug!("nothing to play");
                Ok(())
            }
        }
    }
}

impl SimplePlayer {
    /// Write decoded audio, opening the device on first use
    fn write(&self, sink: &mut Option<Box<dyn AudioSink>>, decoded: &DecodedAudio) -> Result<()> {
        if sink.is_none() {
            *sink = Some(self.device.open()?);
        }
        if let Some(sink) = sink.as_mut() {
            let audio = decoded.reformat(sink.format())?;
            sink.write(&audio.samples)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::i16_to_bytes;
    use crate::playback::{MemoryDevice, OutputFormat, PcmDecoder};

    #[test]
    fn test_decodes_at_threshold_and_flushes_rest() {
        let device = MemoryDevice::new(OutputFormat::new(16000, 1));
        let player = SimplePlayer::new(
            Arc::new(device.clone()),
            Arc::new(PcmDecoder::new(OutputFormat::new(16000, 1))),
        );
        let pcm = i16_to_bytes(&vec![1i16; 10_000]);
        let pieces: Vec<Result<Vec<u8>>> = pcm.chunks(4096).map(|c| Ok(c.to_vec())).collect();

        player.play(Box::new(pieces.into_iter())).unwrap();

        // 20000 bytes: one decode at 16 KB, the rest on finish
        assert_eq!(device.write_sizes(), vec![8192, 10_000 - 8192]);
    }

    #[test]
    fn test_resamples_to_device_format() {
        let device = MemoryDevice::new(OutputFormat::new(32000, 2));
        let player = SimplePlayer::new(
            Arc::new(device.clone()),
            Arc::new(PcmDecoder::new(OutputFormat::new(16000, 1))),
        );
        let pcm = i16_to_bytes(&vec![1i16; 1600]);

        player.play(Box::new(vec![Ok(pcm)].into_iter())).unwrap();

        assert_eq!(device.samples().len(), 3200 * 2);
    }
}
