//! Shared test utilities

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use charvoice::effects::{ChainBuilder, DspCapabilities};
use charvoice::voice::{
    ChunkIter, LocalVoiceProvider, ModelLoader, Prosody, RawChunk, VoiceFiles, VoiceResource,
};
use charvoice::{Error, Result, SynthesisService, VoiceCache};

/// Samples per synthesized chunk
pub const BLOCK: usize = 2048;

/// Chunks per synthesis call
pub const BLOCKS: usize = 3;

/// Generate sine wave samples
pub fn sine(frequency: f32, len: usize, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Voice that speaks a fixed number of sine blocks for any text
pub struct SineVoice {
    pub sample_rate: u32,
    /// Fail with a synthesis error after this many blocks
    pub fail_after: Option<usize>,
}

impl VoiceResource for SineVoice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(&self, _text: &str, _prosody: &Prosody) -> Result<ChunkIter> {
        let sample_rate = self.sample_rate;
        let fail_after = self.fail_after;
        Ok(Box::new((0..BLOCKS).map(move |i| {
            if fail_after.is_some_and(|n| i >= n) {
                return Err(Error::Synthesis("model crashed".to_string()));
            }
            let block: Vec<i16> = sine(220.0, BLOCK, sample_rate, 0.5)
                .into_iter()
                .map(charvoice::audio::float_to_i16)
                .collect();
            Ok(RawChunk::Int16(block))
        })))
    }
}

/// Loads [`SineVoice`]s and counts how often it was asked to
#[derive(Default)]
pub struct SineLoader {
    pub loads: AtomicUsize,
    pub fail_after: Option<usize>,
    /// Refuse to load any model
    pub fail_load: bool,
}

impl SineLoader {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for SineLoader {
    fn load(&self, _files: &VoiceFiles, sample_rate: u32) -> Result<Arc<dyn VoiceResource>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err(Error::Voice("onnx session init failed".to_string()));
        }
        Ok(Arc::new(SineVoice {
            sample_rate,
            fail_after: self.fail_after,
        }))
    }
}

/// Voice that never stops speaking and counts the blocks pulled from it
pub struct EndlessVoice {
    pulls: Arc<AtomicUsize>,
}

impl VoiceResource for EndlessVoice {
    fn sample_rate(&self) -> u32 {
        22_050
    }

    fn synthesize(&self, _text: &str, _prosody: &Prosody) -> Result<ChunkIter> {
        let pulls = Arc::clone(&self.pulls);
        Ok(Box::new(std::iter::repeat_with(move || {
            pulls.fetch_add(1, Ordering::SeqCst);
            Ok(RawChunk::Float(vec![0.1; BLOCK]))
        })))
    }
}

/// Loads [`EndlessVoice`]s and keeps a weak handle on the last one
#[derive(Default)]
pub struct EndlessLoader {
    pub pulls: Arc<AtomicUsize>,
    pub last: Mutex<Weak<EndlessVoice>>,
}

impl EndlessLoader {
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    /// Strong references held on the last loaded voice
    pub fn holders(&self) -> usize {
        self.last.lock().unwrap().strong_count()
    }
}

impl ModelLoader for EndlessLoader {
    fn load(&self, _files: &VoiceFiles, _sample_rate: u32) -> Result<Arc<dyn VoiceResource>> {
        let voice = Arc::new(EndlessVoice {
            pulls: Arc::clone(&self.pulls),
        });
        *self.last.lock().unwrap() = Arc::downgrade(&voice);
        Ok(voice)
    }
}

/// Install a fake model with a sidecar naming `sample_rate`
pub fn install_voice(dir: &Path, id: &str, sample_rate: u32) {
    std::fs::write(dir.join(format!("{id}.onnx")), b"").unwrap();
    let sidecar = serde_json::json!({ "audio": { "sample_rate": sample_rate } });
    std::fs::write(dir.join(format!("{id}.onnx.json")), sidecar.to_string()).unwrap();
}

/// Voices directory with `en-test` (22050 Hz) and `de-low` (16000 Hz)
pub fn voices_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    install_voice(dir.path(), "en-test", 22_050);
    install_voice(dir.path(), "de-low", 16_000);
    dir
}

/// Service over a voices directory with the sine backend
pub fn service(
    dir: &Path,
    loader: Arc<dyn ModelLoader>,
    capabilities: DspCapabilities,
    capacity: usize,
) -> SynthesisService {
    let provider = LocalVoiceProvider::with_loader(dir, loader);
    let cache = VoiceCache::new(Arc::new(provider), capacity);
    SynthesisService::new(Arc::new(cache), ChainBuilder::new(capabilities), "en-test")
}
