//! One streaming synthesis run as a pull-driven state machine

use crate::audio::{bytes_to_float, float_to_bytes, streaming_header};
use crate::effects::Chain;
use crate::voice::{ChunkIter, LoadedVoice, PcmBlock};
use crate::{Error, Result};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    VoiceAcquired,
    Synthesizing,
    Draining,
    Closed,
}

/// Yields the WAV header, one processed frame per upstream block, then one
/// flush frame carrying the effect tails
///
/// Upstream failures end the session early; frames already yielded stay
/// valid and [`SynthesisSession::failure`] reports what went wrong.
pub struct SynthesisSession {
    state: SessionState,
    voice: Option<LoadedVoice>,
    sample_rate: u32,
    chain: Chain,
    chunks: Option<ChunkIter>,
    last_block_len: usize,
    frames: usize,
    bytes: usize,
    failure: Option<Error>,
}

impl SynthesisSession {
    /// A session with nothing attached yet
    #[must_use]
    pub fn idle(chain: Chain) -> Self {
        Self {
            state: SessionState::Idle,
            voice: None,
            sample_rate: 0,
            chain,
            chunks: None,
            last_block_len: 0,
            frames: 0,
            bytes: 0,
            failure: None,
        }
    }

    /// A session holding a voice and its started chunk sequence
    #[must_use]
    pub fn new(voice: LoadedVoice, chain: Chain, chunks: ChunkIter) -> Self {
        let mut session = Self::idle(chain);
        session.attach(voice, chunks);
        session
    }

    /// Attach the acquired voice and its chunk sequence
    pub fn attach(&mut self, voice: LoadedVoice, chunks: ChunkIter) {
        if self.state != SessionState::Idle {
            return;
        }
        self.sample_rate = voice.sample_rate;
        self.voice = Some(voice);
        self.chunks = Some(chunks);
        self.state = SessionState::VoiceAcquired;
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Cache key of the attached voice, until the session closes
    #[must_use]
    pub fn voice_key(&self) -> Option<&str> {
        self.voice.as_ref().map(|v| v.key.as_str())
    }

    /// Frames yielded so far, header included
    #[must_use]
    pub const fn frames(&self) -> usize {
        self.frames
    }

    /// Error that ended the session early, if any
    #[must_use]
    pub const fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// Stop pulling upstream and release the voice
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.chunks = None;
        let voice = self.voice.take();
        self.state = SessionState::Closed;
        tracing::debug!(
            voice = voice.as_ref().map_or("", |v| v.key.as_str()),
            frames = self.frames,
            bytes = self.bytes,
            truncated = self.failure.is_some(),
            "synthesis session closed"
        );
    }

    fn fail(&mut self, error: Error) {
        tracing::warn!(error = %error, frames = self.frames, "synthesis ended early");
        self.failure = Some(error);
        self.close();
    }

    fn emit(&mut self, frame: Vec<u8>) -> Vec<u8> {
        self.frames += 1;
        self.bytes += frame.len();
        frame
    }

    fn process_block(&mut self, block: PcmBlock) -> Result<Vec<u8>> {
        let mut samples = bytes_to_float(block.as_bytes())?;
        self.chain.process(&mut samples, self.sample_rate);
        self.last_block_len = samples.len();
        Ok(float_to_bytes(&samples))
    }

    fn next_block(&mut self) -> Option<Vec<u8>> {
        loop {
            let Some(chunks) = self.chunks.as_mut() else {
                return None;
            };
            match chunks.next() {
                Some(Ok(raw)) => {
                    let block = match PcmBlock::try_from(raw) {
                        Ok(block) => block,
                        Err(e) => {
                            self.fail(e);
                            return None;
                        }
                    };
                    if block.is_empty() {
                        continue;
                    }
                    match self.process_block(block) {
                        Ok(frame) => return Some(frame),
                        Err(e) => {
                            self.fail(e);
                            return None;
                        }
                    }
                }
                Some(Err(e)) => {
                    self.fail(e);
                    return None;
                }
                None => {
                    self.chunks = None;
                    self.state = SessionState::Draining;
                    return None;
                }
            }
        }
    }
}

impl Iterator for SynthesisSession {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            SessionState::Idle | SessionState::Closed => None,
            SessionState::VoiceAcquired => {
                self.state = SessionState::Synthesizing;
                let header = streaming_header(self.sample_rate).to_vec();
                Some(self.emit(header))
            }
            SessionState::Synthesizing => {
                if let Some(frame) = self.next_block() {
                    return Some(self.emit(frame));
                }
                if self.state == SessionState::Draining {
                    return self.next();
                }
                None
            }
            SessionState::Draining => {
                let len = self.last_block_len;
                let tail = (len > 0).then(|| self.chain.flush(len, self.sample_rate));
                self.close();
                tail.map(|samples| {
                    let frame = float_to_bytes(&samples);
                    self.emit(frame)
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::WAV_HEADER_SIZE;
    use crate::effects::{Overrides, build_chain};
    use crate::voice::{Prosody, RawChunk, VoiceResource};

    struct Null;

    impl VoiceResource for Null {
        fn sample_rate(&self) -> u32 {
            22050
        }

        fn synthesize(&self, _text: &str, _prosody: &Prosody) -> Result<ChunkIter> {
            Ok(Box::new(std::iter::empty()))
        }
    }

    fn voice() -> LoadedVoice {
        LoadedVoice {
            key: "test".to_string(),
            sample_rate: 22050,
            resource: Arc::new(Null),
        }
    }

    fn chunks(items: Vec<Result<RawChunk>>) -> ChunkIter {
        Box::new(items.into_iter())
    }

    #[test]
    fn test_three_blocks_make_header_and_four_frames() {
        let blocks = (0..3).map(|_| Ok(RawChunk::Pcm16(vec![0x10; 4096]))).collect();
        let session = SynthesisSession::new(voice(), Chain::empty(), chunks(blocks));

        let frames: Vec<Vec<u8>> = session.collect();
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0].len(), WAV_HEADER_SIZE);
        for frame in &frames[1..] {
            assert_eq!(frame.len(), 4096);
        }
        // Flush of an empty chain over silence is silence
        assert!(frames[4].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_states_progress_to_closed() {
        let blocks = vec![Ok(RawChunk::Int16(vec![100; 64]))];
        let chain = build_chain("robot", &Overrides::new());
        let mut session = SynthesisSession::new(voice(), chain, chunks(blocks));
        assert_eq!(session.state(), SessionState::VoiceAcquired);

        session.next().unwrap();
        assert_eq!(session.state(), SessionState::Synthesizing);
        session.next().unwrap();
        let flush = session.next().unwrap();
        assert_eq!(flush.len(), 128);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.next().is_none());
        assert_eq!(session.frames(), 3);
    }

    #[test]
    fn test_upstream_error_truncates() {
        let blocks = vec![
            Ok(RawChunk::Float(vec![0.1; 32])),
            Err(Error::Synthesis("model crashed".to_string())),
            Ok(RawChunk::Float(vec![0.1; 32])),
        ];
        let mut session = SynthesisSession::new(voice(), Chain::empty(), chunks(blocks));
        let frames: Vec<Vec<u8>> = session.by_ref().collect();

        // Header and first block only, no flush after a failure
        assert_eq!(frames.len(), 2);
        assert!(matches!(session.failure(), Some(Error::Synthesis(_))));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_malformed_chunk_closes() {
        let blocks = vec![Ok(RawChunk::Pcm16(vec![1, 2, 3]))];
        let mut session = SynthesisSession::new(voice(), Chain::empty(), chunks(blocks));
        assert_eq!(session.by_ref().count(), 1);
        assert!(matches!(session.failure(), Some(Error::MalformedAudio(_))));
    }

    #[test]
    fn test_no_audio_means_header_only() {
        let session = SynthesisSession::new(voice(), Chain::empty(), chunks(Vec::new()));
        assert_eq!(session.count(), 1);
    }

    #[test]
    fn test_idle_session_yields_nothing() {
        let mut session = SynthesisSession::idle(Chain::empty());
        assert!(session.next().is_none());
        assert_eq!(session.state(), SessionState::Idle);
    }
}
