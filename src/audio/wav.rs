//! WAV container helpers
//!
//! The streaming header leaves both length fields at `0xFFFF_FFFF` so players
//! treat the body as an open-ended, growing stream.

use std::path::Path;

use crate::{Error, Result};

/// Size of the canonical PCM WAV header
pub const WAV_HEADER_SIZE: usize = 44;

/// Placeholder written in the RIFF and data length fields of a live stream
pub const STREAMING_LENGTH: u32 = u32::MAX;

/// Bits per sample of every stream this crate emits
pub const BITS_PER_SAMPLE: u16 = 16;

/// Build the 44-byte header for a mono 16-bit streamed WAV
#[must_use]
pub fn streaming_header(sample_rate: u32) -> [u8; WAV_HEADER_SIZE] {
    let channels: u16 = 1;
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = sample_rate * u32::from(block_align);

    let mut header = [0u8; WAV_HEADER_SIZE];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&STREAMING_LENGTH.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&STREAMING_LENGTH.to_le_bytes());
    header
}

/// Fields read back from a streaming header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

/// Parse a 44-byte PCM WAV header
///
/// # Errors
///
/// Returns `MalformedAudio` if the buffer is not a RIFF/WAVE PCM header
pub fn parse_header(bytes: &[u8]) -> Result<HeaderInfo> {
    if bytes.len() < WAV_HEADER_SIZE {
        return Err(Error::MalformedAudio(format!(
            "WAV header needs {WAV_HEADER_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" || &bytes[36..40] != b"data" {
        return Err(Error::MalformedAudio("not a canonical WAV header".to_string()));
    }

    Ok(HeaderInfo {
        channels: u16::from_le_bytes([bytes[22], bytes[23]]),
        sample_rate: u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
        bits_per_sample: u16::from_le_bytes([bytes[34], bytes[35]]),
    })
}

/// Write PCM16 bytes to a finalized mono WAV file
///
/// # Errors
///
/// Returns error if the file cannot be written or the PCM is malformed
pub fn write_wav_file(path: &Path, pcm16: &[u8], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    if pcm16.len() % 2 != 0 {
        return Err(Error::MalformedAudio("odd PCM16 byte count".to_string()));
    }

    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| Error::Audio(e.to_string()))?;
    for pair in pcm16.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
            .map_err(|e| Error::Audio(e.to_string()))?;
    }
    writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(())
}
