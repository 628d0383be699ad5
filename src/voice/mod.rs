//! Voice models
//!
//! A [`VoiceProvider`] turns a voice id into a loaded [`VoiceResource`];
//! the [`VoiceCache`] keeps a bounded number of them resident.

mod cache;
mod chunk;
mod local;
#[cfg(feature = "piper")]
mod piper;
mod prosody;

use std::fmt;
use std::sync::Arc;

pub use cache::VoiceCache;
pub use chunk::{PcmBlock, RawChunk};
pub use local::{
    DEFAULT_SAMPLE_RATE, LocalVoiceProvider, MissingBackend, ModelLoader, VoiceFiles,
    default_loader, read_sidecar, sidecar_path, sidecar_sample_rate,
};
#[cfg(feature = "piper")]
pub use piper::PiperLoader;
pub use prosody::{PROSODY_KEYS, Prosody, lenient_f32, lenient_i64};

use crate::Result;

/// Lazy sequence of chunks produced by one synthesis call
pub type ChunkIter = Box<dyn Iterator<Item = Result<RawChunk>> + Send>;

/// A loaded voice model
pub trait VoiceResource: Send + Sync {
    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Start synthesizing text; chunks are produced as they are pulled
    ///
    /// # Errors
    ///
    /// Returns error if synthesis cannot start
    fn synthesize(&self, text: &str, prosody: &Prosody) -> Result<ChunkIter>;
}

/// A voice resource with its resolved metadata
#[derive(Clone)]
pub struct LoadedVoice {
    pub key: String,
    pub sample_rate: u32,
    pub resource: Arc<dyn VoiceResource>,
}

impl fmt::Debug for LoadedVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedVoice")
            .field("key", &self.key)
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

/// Resolves and loads voices; blocking, called off the async runtime
pub trait VoiceProvider: Send + Sync {
    /// Key the cache stores a voice under
    fn cache_key(&self, id: &str) -> String;

    /// Load a voice
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationMissing` if the voice is not installed or no
    /// backend can load it
    fn load(&self, id: &str) -> Result<LoadedVoice>;

    /// Voices this provider can load
    fn list_voice_ids(&self) -> Vec<String> {
        Vec::new()
    }
}
