//! Conversion between 16-bit PCM bytes and normalized float samples

use crate::{Error, Result};

/// Full-scale magnitude of a 16-bit sample; power of two so the float form is exact
const I16_SCALE: f32 = 32768.0;

/// Convert little-endian signed 16-bit PCM into float samples
///
/// # Errors
///
/// Returns `MalformedAudio` if the buffer has a trailing odd byte
pub fn bytes_to_float(pcm16: &[u8]) -> Result<Vec<f32>> {
    if pcm16.len() % 2 != 0 {
        return Err(Error::MalformedAudio(format!(
            "PCM16 buffer length {} is not a whole number of samples",
            pcm16.len()
        )));
    }

    Ok(pcm16
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / I16_SCALE)
        .collect())
}

/// Convert float samples into little-endian signed 16-bit PCM
///
/// Out-of-range samples are clamped to full scale; NaN becomes silence.
#[must_use]
pub fn float_to_bytes(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.extend_from_slice(&float_to_i16(s).to_le_bytes());
    }
    out
}

/// Quantize one float sample with clamping
///
/// +1.0 lands on `i16::MAX` rather than wrapping to `i16::MIN`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn float_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let scaled = (sample.clamp(-1.0, 1.0) * I16_SCALE).round();
    scaled.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// Convert `i16` samples into little-endian bytes
#[must_use]
pub fn i16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
