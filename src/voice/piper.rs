//! Piper ONNX voices via `piper-rs`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use piper_rs::PiperModel;
use piper_rs::synth::PiperSpeechSynthesizer;

use super::{ChunkIter, ModelLoader, Prosody, RawChunk, VoiceFiles, VoiceResource};
use crate::{Error, Result};

/// Speaker id piper uses when none is selected
const DEFAULT_SPEAKER: i64 = 0;

/// Loads Piper models from their JSON config
#[derive(Debug, Default)]
pub struct PiperLoader;

impl ModelLoader for PiperLoader {
    fn load(&self, files: &VoiceFiles, sample_rate: u32) -> Result<Arc<dyn VoiceResource>> {
        let model = piper_rs::from_config_path(&files.config)
            .map_err(|e| Error::ConfigurationMissing(format!("piper load error: {e}")))?;
        let synth = PiperSpeechSynthesizer::new(Arc::clone(&model))
            .map_err(|e| Error::ConfigurationMissing(format!("piper init error: {e}")))?;

        Ok(Arc::new(PiperVoice {
            model,
            synth,
            sample_rate,
            speaker_changed: AtomicBool::new(false),
        }))
    }
}

struct PiperVoice {
    model: Arc<dyn PiperModel + Send + Sync>,
    synth: PiperSpeechSynthesizer,
    sample_rate: u32,
    /// Speaker is model state; set when a request picked a non-default one
    speaker_changed: AtomicBool,
}

impl PiperVoice {
    fn select_speaker(&self, speaker: Option<i64>) -> Result<()> {
        let sid = match speaker {
            Some(sid) => sid,
            None if self.speaker_changed.swap(false, Ordering::AcqRel) => DEFAULT_SPEAKER,
            None => return Ok(()),
        };
        if let Some(e) = self.model.set_speaker(sid) {
            return Err(Error::Config(format!("speaker {sid}: {e}")));
        }
        if sid != DEFAULT_SPEAKER {
            self.speaker_changed.store(true, Ordering::Release);
        }
        Ok(())
    }
}

impl VoiceResource for PiperVoice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(&self, text: &str, prosody: &Prosody) -> Result<ChunkIter> {
        self.select_speaker(prosody.speaker)?;
        if prosody.length_scale.is_some() || prosody.noise_scale.is_some() || prosody.noise_w.is_some()
        {
            tracing::debug!(?prosody, "piper backend uses model scale defaults");
        }

        // One sentence is synthesized per pull, so a dropped stream stops here
        let sentences = self
            .synth
            .synthesize_lazy(text.to_string(), None)
            .map_err(|e| Error::Synthesis(format!("piper synth error: {e}")))?;

        Ok(Box::new(sentences.map(|part| {
            part.map(|audio| RawChunk::Float(audio.into_vec()))
                .map_err(|e| Error::Synthesis(format!("piper chunk error: {e}")))
        })))
    }
}
