//! Normalization of the chunk shapes voice backends hand back

use crate::audio::{float_to_bytes, i16_to_bytes};
use crate::{Error, Result};

/// A chunk exactly as a backend produced it
#[derive(Debug, Clone, PartialEq)]
pub enum RawChunk {
    /// Little-endian PCM16 bytes
    Pcm16(Vec<u8>),
    /// Signed 16-bit samples
    Int16(Vec<i16>),
    /// Float samples in `[-1.0, 1.0]`
    Float(Vec<f32>),
}

/// Canonical block of little-endian PCM16 bytes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PcmBlock(Vec<u8>);

impl PcmBlock {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<RawChunk> for PcmBlock {
    type Error = Error;

    fn try_from(chunk: RawChunk) -> Result<Self> {
        match chunk {
            RawChunk::Pcm16(bytes) => {
                if bytes.len() % 2 != 0 {
                    return Err(Error::MalformedAudio(format!(
                        "PCM16 chunk has odd length {}",
                        bytes.len()
                    )));
                }
                Ok(Self(bytes))
            }
            RawChunk::Int16(samples) => Ok(Self(i16_to_bytes(&samples))),
            RawChunk::Float(samples) => Ok(Self(float_to_bytes(&samples))),
        }
    }
}
