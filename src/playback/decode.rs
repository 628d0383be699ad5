//! Compressed audio decoding and output-format conversion

use std::collections::VecDeque;
use std::time::Duration;

use rubato::{FftFixedIn, Resampler};

use super::OutputFormat;
use crate::{Error, Result};

/// Trailing bytes above this size are reported at warn when discarded
const DISCARD_WARN_BYTES: usize = 1024;

/// Resampler input block length
const RESAMPLE_CHUNK: usize = 1024;

/// Interleaved decoded samples
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample frames (one sample per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        OutputFormat::new(self.sample_rate, self.channels)
    }

    /// Append audio of the same format
    pub fn append(&mut self, other: Self) {
        if self.samples.is_empty() {
            *self = other;
        } else {
            self.samples.extend(other.samples);
        }
    }

    /// Remove and return the first `frames` frames
    pub fn take_frames(&mut self, frames: usize) -> Self {
        let split = (frames * usize::from(self.channels.max(1))).min(self.samples.len());
        let rest = self.samples.split_off(split);
        let head = std::mem::replace(&mut self.samples, rest);
        Self::new(head, self.sample_rate, self.channels)
    }

    /// Convert to the target channel count and sample rate
    ///
    /// # Errors
    ///
    /// Returns `Audio` if the resampler cannot be built for these rates
    pub fn reformat(&self, target: OutputFormat) -> Result<Self> {
        let channels = target.channels.max(1);
        let remixed = remix(&self.samples, self.channels.max(1), channels);

        if self.sample_rate == target.sample_rate || remixed.is_empty() {
            return Ok(Self::new(remixed, target.sample_rate, channels));
        }

        let resampled = resample(&remixed, channels, self.sample_rate, target.sample_rate)?;
        Ok(Self::new(resampled, target.sample_rate, channels))
    }
}

/// Map interleaved samples between channel counts
fn remix(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    if from == to {
        return samples.to_vec();
    }
    let (from, to) = (usize::from(from), usize::from(to));

    samples
        .chunks(from)
        .flat_map(|frame| {
            (0..to).map(move |ch| {
                if to == 1 {
                    #[allow(clippy::cast_precision_loss)]
                    let n = frame.len() as f32;
                    frame.iter().sum::<f32>() / n
                } else {
                    frame[ch % frame.len()]
                }
            })
        })
        .collect()
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn resample(samples: &[f32], channels: u16, from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    let channels = usize::from(channels);
    let frames = samples.len() / channels;
    let expected = (frames as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;

    let mut resampler = FftFixedIn::<f64>::new(
        from_rate as usize,
        to_rate as usize,
        RESAMPLE_CHUNK,
        2,
        channels,
    )
    .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    // Output starts `delay` frames late; those are skipped below
    let delay = resampler.output_delay();
    let needed = delay + expected;

    let mut planar: Vec<Vec<f64>> = (0..channels)
        .map(|ch| {
            samples
                .iter()
                .skip(ch)
                .step_by(channels)
                .map(|&s| f64::from(s))
                .collect()
        })
        .collect();
    let padded = frames.div_ceil(RESAMPLE_CHUNK) * RESAMPLE_CHUNK;
    for channel in &mut planar {
        channel.resize(padded, 0.0);
    }

    let silence = vec![0.0_f64; RESAMPLE_CHUNK];
    let mut out: Vec<Vec<f64>> = vec![Vec::with_capacity(needed); channels];
    let mut start = 0;
    while out[0].len() < needed {
        let block: Vec<&[f64]> = planar
            .iter()
            .map(|ch| ch.get(start..start + RESAMPLE_CHUNK).unwrap_or(silence.as_slice()))
            .collect();
        let processed = resampler
            .process(&block, None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        if processed[0].is_empty() {
            break;
        }
        for (dst, src) in out.iter_mut().zip(processed) {
            dst.extend(src);
        }
        start += RESAMPLE_CHUNK;
    }

    let end = needed.min(out[0].len());
    let mut interleaved = Vec::with_capacity(expected * channels);
    for i in delay.min(end)..end {
        for channel in &out {
            interleaved.push(channel[i] as f32);
        }
    }
    Ok(interleaved)
}

/// Decodes a complete or partial compressed buffer
pub trait AudioDecoder: Send + Sync {
    /// Decode every whole frame in `bytes`
    ///
    /// # Errors
    ///
    /// Returns `NeedMoreData` if no frame could be decoded yet and
    /// `MalformedAudio` if the data is broken
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio>;

    /// Start decoding a stream that arrives in pieces
    fn stream(&self) -> Box<dyn DecodeStream>;
}

/// Decoder state for one stream
///
/// A partial frame at the end of the fed bytes stays buffered until the
/// rest of it arrives.
pub trait DecodeStream: Send {
    fn feed(&mut self, bytes: &[u8]);

    /// Decode every whole frame fed so far
    ///
    /// # Errors
    ///
    /// Returns `MalformedAudio` if the data is broken
    fn drain(&mut self) -> Result<Option<DecodedAudio>>;

    /// Bytes fed but not yet returned as audio
    fn pending(&self) -> usize;
}

/// MP3 via `minimp3`
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp3Decoder;

impl AudioDecoder for Mp3Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio> {
        let mut stream = Mp3Stream::new();
        stream.feed(bytes);
        stream.drain()?.ok_or(Error::NeedMoreData {
            buffered: bytes.len(),
        })
    }

    fn stream(&self) -> Box<dyn DecodeStream> {
        Box::new(Mp3Stream::new())
    }
}

/// One `minimp3` decoder kept across chunks, so frame sync and the bit
/// reservoir survive chunk boundaries
struct Mp3Stream {
    decoder: minimp3::Decoder<VecDeque<u8>>,
    /// minimp3 hides its buffer, so this counts bytes fed since audio last came out
    since_audio: usize,
}

impl Mp3Stream {
    fn new() -> Self {
        Self {
            decoder: minimp3::Decoder::new(VecDeque::new()),
            since_audio: 0,
        }
    }
}

impl DecodeStream for Mp3Stream {
    fn feed(&mut self, bytes: &[u8]) {
        self.decoder.reader_mut().extend(bytes);
        self.since_audio += bytes.len();
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn drain(&mut self) -> Result<Option<DecodedAudio>> {
        let mut audio = DecodedAudio::default();

        loop {
            match self.decoder.next_frame() {
                Ok(frame) => {
                    let channels = frame.channels.max(1) as u16;
                    if audio.is_empty() {
                        audio.sample_rate = frame.sample_rate.max(0) as u32;
                        audio.channels = channels;
                    }
                    let samples: Vec<f32> =
                        frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                    audio
                        .samples
                        .extend(remix(&samples, channels, audio.channels));
                }
                // Eof here only means the fed bytes ran out
                Err(minimp3::Error::Eof | minimp3::Error::InsufficientData) => break,
                Err(minimp3::Error::SkippedData) => {}
                Err(minimp3::Error::Io(e)) => {
                    return Err(Error::MalformedAudio(format!("MP3 read error: {e}")));
                }
            }
        }

        if audio.is_empty() {
            return Ok(None);
        }
        self.since_audio = 0;
        Ok(Some(audio))
    }

    fn pending(&self) -> usize {
        self.since_audio
    }
}

/// Raw little-endian PCM16 in a fixed format
#[derive(Debug, Clone, Copy)]
pub struct PcmDecoder {
    format: OutputFormat,
}

impl PcmDecoder {
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl AudioDecoder for PcmDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio> {
        if bytes.is_empty() || bytes.len() % 2 != 0 {
            return Err(Error::NeedMoreData {
                buffered: bytes.len(),
            });
        }
        let samples = crate::audio::bytes_to_float(bytes)?;
        Ok(DecodedAudio::new(
            samples,
            self.format.sample_rate,
            self.format.channels.max(1),
        ))
    }

    fn stream(&self) -> Box<dyn DecodeStream> {
        Box::new(PcmStream {
            decoder: *self,
            buffer: Vec::new(),
        })
    }
}

struct PcmStream {
    decoder: PcmDecoder,
    buffer: Vec<u8>,
}

impl DecodeStream for PcmStream {
    fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn drain(&mut self) -> Result<Option<DecodedAudio>> {
        // Whole frames only; an odd trailing byte waits for its partner
        let frame_bytes = 2 * usize::from(self.decoder.format.channels.max(1));
        let whole = self.buffer.len() - self.buffer.len() % frame_bytes;
        if whole == 0 {
            return Ok(None);
        }
        let rest = self.buffer.split_off(whole);
        let bytes = std::mem::replace(&mut self.buffer, rest);
        self.decoder.decode(&bytes).map(Some)
    }

    fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Feeds chunks to a [`DecodeStream`] and drains it once enough bytes are
/// buffered
pub struct IncrementalDecoder {
    stream: Box<dyn DecodeStream>,
    min_bytes: usize,
    fed: usize,
    decodes: usize,
}

impl IncrementalDecoder {
    #[must_use]
    pub fn new(decoder: &dyn AudioDecoder, min_bytes: usize) -> Self {
        Self {
            stream: decoder.stream(),
            min_bytes,
            fed: 0,
            decodes: 0,
        }
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.stream.pending()
    }

    #[must_use]
    pub const fn decodes(&self) -> usize {
        self.decodes
    }

    /// Add a chunk, returning audio when a decode succeeds
    ///
    /// # Errors
    ///
    /// Returns decoder errors other than under-buffering
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<DecodedAudio>> {
        self.stream.feed(chunk);
        self.fed += chunk.len();
        let pending = self.stream.pending();
        if pending == 0 || pending < self.min_bytes {
            return Ok(None);
        }

        match self.stream.drain() {
            Ok(Some(audio)) => {
                self.decodes += 1;
                tracing::trace!(
                    frames = audio.frames(),
                    decode = self.decodes,
                    "decoded buffered audio"
                );
                Ok(Some(audio))
            }
            Ok(None) | Err(Error::MalformedAudio(_)) => {
                tracing::trace!(bytes = pending, "decode needs more data");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Final decode of whatever is left
    ///
    /// Trailing bytes that still fail to decode after earlier successes are
    /// dropped and logged.
    ///
    /// # Errors
    ///
    /// Returns `MalformedAudio` if the stream carried bytes but nothing in it
    /// ever decoded
    pub fn finish(&mut self) -> Result<Option<DecodedAudio>> {
        if self.fed == 0 {
            return Ok(None);
        }
        let decoded = match self.stream.drain() {
            Ok(decoded) => decoded,
            Err(e) if self.decodes == 0 => return Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "final decode failed");
                None
            }
        };
        if decoded.is_some() {
            self.decodes += 1;
        }

        let discarded = self.stream.pending();
        if self.decodes == 0 {
            return Err(Error::MalformedAudio(format!(
                "no decodable audio in {} bytes",
                self.fed
            )));
        }
        if discarded > DISCARD_WARN_BYTES {
            tracing::warn!(bytes = discarded, "discarded undecodable trailing audio");
        } else if discarded > 0 {
            tracing::debug!(bytes = discarded, "dropped trailing audio bytes");
        }
        self.fed = 0;
        Ok(decoded)
    }
}
