//! Producer/consumer playback: a reader thread batches chunks for a decoder

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use super::{
    AudioDecoder, AudioSink, ChunkStream, DecodedAudio, IncrementalDecoder, OutputDevice,
    PlaybackStrategy, PlayerKind,
};
use crate::{Error, Result};

/// Bytes accumulated before a batch is handed to the decoder
pub const BATCH_BYTES: usize = 32 * 1024;

/// How long the consumer waits for a batch before checking the producer
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

enum Batch {
    Data(Vec<u8>),
    /// Reader finished; total bytes read
    Complete(usize),
    Error(String),
}

/// Starts playing before the stream has ended
pub struct StreamCollectPlayer {
    device: Arc<dyn OutputDevice>,
    decoder: Arc<dyn AudioDecoder>,
}

impl StreamCollectPlayer {
    #[must_use]
    pub fn new(device: Arc<dyn OutputDevice>, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { device, decoder }
    }
}

fn produce(chunks: ChunkStream, tx: &mpsc::Sender<Batch>) {
    let mut batch = Vec::with_capacity(BATCH_BYTES);
    let mut total = 0;

    for chunk in chunks {
        match chunk {
            Ok(chunk) => {
                total += chunk.len();
                batch.extend_from_slice(&chunk);
                if batch.len() >= BATCH_BYTES {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_BYTES));
                    if tx.send(Batch::Data(full)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(Batch::Error(e.to_string()));
                return;
            }
        }
    }

    if !batch.is_empty() && tx.send(Batch::Data(batch)).is_err() {
        return;
    }
    let _ = tx.send(Batch::Complete(total));
}

impl StreamCollectPlayer {
    fn consume(&self, rx: &mpsc::Receiver<Batch>) -> Result<usize> {
        let mut incremental = IncrementalDecoder::new(self.decoder.as_ref(), 0);
        let mut sink: Option<Box<dyn AudioSink>> = None;
        let mut written = 0;

        loop {
            let batch = match rx.recv_timeout(RECV_TIMEOUT) {
                Ok(batch) => batch,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::trace!("waiting for audio batch");
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Audio("reader stopped without completing".to_string()));
                }
            };

            match batch {
                // A partial frame at the end of a batch stays in the decoder
                Batch::Data(data) => {
                    if let Some(decoded) = incremental.push(&data)? {
                        written += self.write(&mut sink, &decoded)?;
                    }
                }
                Batch::Complete(total) => {
                    if let Some(decoded) = incremental.finish()? {
                        written += self.write(&mut sink, &decoded)?;
                    }
                    if let Some(mut sink) = sink {
                        sink.finish()?;
                    }
                    tracing::debug!(bytes = total, samples = written, "stream played");
                    return Ok(written);
                }
                Batch::Error(reason) => return Err(Error::Audio(reason)),
            }
        }
    }

    /// Write decoded audio, opening the device on first use
    fn write(
        &self,
        sink: &mut Option<Box<dyn AudioSink>>,
        decoded: &DecodedAudio,
    ) -> Result<usize> {
        if sink.is_none() {
            *sink = Some(self.device.open()?);
        }
        let Some(sink) = sink.as_mut() else {
            return Ok(0);
        };
        let audio = decoded.reformat(sink.format())?;
        sink.write(&audio.samples)?;
        Ok(audio.samples.len())
    }
}

impl PlaybackStrategy for StreamCollectPlayer {
    fn kind(&self) -> PlayerKind {
        PlayerKind::StreamCollect
    }

    fn play(&self, chunks: ChunkStream) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let producer = thread::Builder::new()
            .name("charvoice-reader".to_string())
            .spawn(move || produce(chunks, &tx))?;

        let result = self.consume(&rx);
        // Unblocks the producer if the consumer bailed out early
        drop(rx);
        if producer.join().is_err() {
            tracing::warn!("audio reader thread panicked");
        }
        result.map(|_| ())
    }
}
