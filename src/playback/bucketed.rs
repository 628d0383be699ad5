//! Incremental decode with fixed-duration output buckets

use std::sync::Arc;

use super::{
    AudioDecoder, ChunkStream, DecodedAudio, IncrementalDecoder, OutputDevice, PlaybackStrategy,
    PlayerKind,
};
use crate::Result;

/// Length of each bucket handed to the device
pub const BUCKET_MS: u32 = 500;

/// Attempts a decode on every chunk and writes audio in 500 ms buckets
pub struct BufferedPlayer {
    device: Arc<dyn OutputDevice>,
    decoder: Arc<dyn AudioDecoder>,
}

impl BufferedPlayer {
    #[must_use]
    pub fn new(device: Arc<dyn OutputDevice>, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { device, decoder }
    }
}

impl PlaybackStrategy for BufferedPlayer {
    fn kind(&self) -> PlayerKind {
        PlayerKind::Buffered
    }

    fn play(&self, chunks: ChunkStream) -> Result<()> {
        let mut incremental = IncrementalDecoder::new(self.decoder.as_ref(), 0);
        let mut sink = None;
        let mut pending = DecodedAudio::default();
        let mut buckets = 0usize;

        for chunk in chunks {
            let Some(decoded) = incremental.push(&chunk?)? else {
                continue;
            };
            if sink.is_none() {
                sink = Some(self.device.open()?);
            }
            let Some(sink) = sink.as_mut() else {
                continue;
            };
            pending.append(decoded.reformat(sink.format())?);

            let bucket_frames = (sink.format().sample_rate * BUCKET_MS / 1000) as usize;
            while pending.frames() >= bucket_frames.max(1) {
                let bucket = pending.take_frames(bucket_frames);
                sink.write(&bucket.samples)?;
                buckets += 1;
            }
        }

        if let Some(decoded) = incremental.finish()? {
            if sink.is_none() {
                sink = Some(self.device.open()?);
            }
            if let Some(sink) = sink.as_mut() {
                pending.append(decoded.reformat(sink.format())?);
            }
        }

        let Some(mut sink) = sink else {
            tracing::debug!("nothing to play");
            return Ok(());
        };
        if !pending.is_empty() {
            sink.write(&pending.samples)?;
            buckets += 1;
        }
        sink.finish()?;

        tracing::debug!(buckets, decodes = incremental.decodes(), "buffered playback done");
        Ok(())
    }
}
