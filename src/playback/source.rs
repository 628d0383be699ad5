//! Where compressed chunks come from, and whether they can be replayed

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::ChunkStream;
use crate::{Error, Result};

/// Read size when chunking files and HTTP bodies
pub const SOURCE_CHUNK_BYTES: usize = 4096;

/// Chunks for the coordinator
///
/// A failed attempt can only be retried on a source that can hand out the
/// same bytes again.
pub enum ChunkSource {
    /// Already in memory
    Replayable(Arc<Vec<Vec<u8>>>),
    /// A live stream that can be read once
    Streaming(Option<ChunkStream>),
    /// A live stream whose chunks are remembered as they are read
    Recorded(Arc<Mutex<Recording>>),
}

#[doc(hidden)]
pub struct Recording {
    chunks: Vec<Vec<u8>>,
    live: Option<ChunkStream>,
    failed: Option<String>,
}

impl ChunkSource {
    #[must_use]
    pub fn replayable(chunks: Vec<Vec<u8>>) -> Self {
        Self::Replayable(Arc::new(chunks))
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::replayable(
            bytes
                .chunks(SOURCE_CHUNK_BYTES)
                .map(<[u8]>::to_vec)
                .collect(),
        )
    }

    /// Single-use stream
    #[must_use]
    pub fn streaming(chunks: ChunkStream) -> Self {
        Self::Streaming(Some(chunks))
    }

    /// Stream that records what it yields so later attempts can replay it
    #[must_use]
    pub fn recorded(chunks: ChunkStream) -> Self {
        Self::Recorded(Arc::new(Mutex::new(Recording {
            chunks: Vec::new(),
            live: Some(chunks),
            failed: None,
        })))
    }

    /// Read lazily in [`SOURCE_CHUNK_BYTES`] pieces
    #[must_use]
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self::recorded(Box::new(ReaderChunks {
            reader: Some(reader),
        }))
    }

    /// # Errors
    ///
    /// Returns `Io` if the file cannot be opened
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        tracing::debug!(path = %path.display(), "reading audio from file");
        Ok(Self::from_reader(file))
    }

    /// Fetch over HTTP, reading the body as it is played
    ///
    /// Blocks; call from a blocking context.
    ///
    /// # Errors
    ///
    /// Returns `Http` if the request fails or the status is not success
    pub fn from_url(url: &str) -> Result<Self> {
        let response = reqwest::blocking::get(url)?.error_for_status()?;
        tracing::debug!(url, status = %response.status(), "streaming audio from url");
        Ok(Self::from_reader(response))
    }

    #[must_use]
    pub const fn is_replayable(&self) -> bool {
        !matches!(self, Self::Streaming(_))
    }

    /// Chunks for one playback attempt
    ///
    /// # Errors
    ///
    /// Returns `SourceConsumed` on a second attempt at a single-use stream
    pub fn attempt(&mut self) -> Result<ChunkStream> {
        match self {
            Self::Replayable(chunks) => {
                let chunks = Arc::clone(chunks);
                Ok(Box::new(
                    (0..chunks.len()).map(move |i| Ok(chunks[i].clone())),
                ))
            }
            Self::Streaming(stream) => stream.take().ok_or(Error::SourceConsumed),
            Self::Recorded(recording) => Ok(Box::new(Replay {
                recording: Arc::clone(recording),
                cursor: 0,
            })),
        }
    }
}

impl std::fmt::Debug for ChunkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Replayable(chunks) => f
                .debug_tuple("Replayable")
                .field(&chunks.len())
                .finish(),
            Self::Streaming(stream) => f
                .debug_tuple("Streaming")
                .field(&stream.is_some())
                .finish(),
            Self::Recorded(_) => f.write_str("Recorded"),
        }
    }
}

/// Replays recorded chunks, then keeps pulling from the live stream
struct Replay {
    recording: Arc<Mutex<Recording>>,
    cursor: usize,
}

impl Iterator for Replay {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let Ok(mut recording) = self.recording.lock() else {
            return Some(Err(Error::Audio("source recording poisoned".to_string())));
        };

        if let Some(chunk) = recording.chunks.get(self.cursor) {
            self.cursor += 1;
            return Some(Ok(chunk.clone()));
        }
        if let Some(reason) = &recording.failed {
            return Some(Err(Error::Audio(reason.clone())));
        }

        let next = recording.live.as_mut()?.next();
        match next {
            Some(Ok(chunk)) => {
                recording.chunks.push(chunk.clone());
                self.cursor += 1;
                Some(Ok(chunk))
            }
            Some(Err(e)) => {
                recording.failed = Some(e.to_string());
                recording.live = None;
                Some(Err(e))
            }
            None => {
                recording.live = None;
                None
            }
        }
    }
}

struct ReaderChunks<R> {
    reader: Option<R>,
}

impl<R: Read> Iterator for ReaderChunks<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        let mut buf = vec![0u8; SOURCE_CHUNK_BYTES];
        let mut filled = 0;

        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.reader = None;
                    return Some(Err(e.into()));
                }
            }
        }

        if filled == 0 {
            self.reader = None;
            return None;
        }
        buf.truncate(filled);
        Some(Ok(buf))
    }
}
