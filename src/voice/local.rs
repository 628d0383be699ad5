//! Voices resolved from a local directory of `.onnx` models with JSON sidecars

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{LoadedVoice, VoiceProvider, VoiceResource};
use crate::{Error, Result};

/// Extension every voice model carries
pub const MODEL_EXTENSION: &str = "onnx";

/// Sample rate when a sidecar names none
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;

/// Sample rate guessed for `low` quality models without a usable sidecar
pub const LOW_QUALITY_SAMPLE_RATE: u32 = 16_000;

/// Files backing one voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceFiles {
    /// Cache key (the model file stem for direct paths)
    pub key: String,
    pub model: PathBuf,
    pub config: PathBuf,
}

/// Turns resolved voice files into a synthesis resource
pub trait ModelLoader: Send + Sync {
    /// Load the model
    ///
    /// # Errors
    ///
    /// Returns error if the model cannot be loaded
    fn load(&self, files: &VoiceFiles, sample_rate: u32) -> Result<Arc<dyn VoiceResource>>;
}

/// Loader used when no synthesis backend is compiled in
#[derive(Debug, Default)]
pub struct MissingBackend;

impl ModelLoader for MissingBackend {
    fn load(&self, _files: &VoiceFiles, _sample_rate: u32) -> Result<Arc<dyn VoiceResource>> {
        Err(Error::ConfigurationMissing(
            "piper support not compiled in".to_string(),
        ))
    }
}

/// The loader for the backend this build was compiled with
#[must_use]
pub fn default_loader() -> Arc<dyn ModelLoader> {
    #[cfg(feature = "piper")]
    {
        Arc::new(super::piper::PiperLoader)
    }
    #[cfg(not(feature = "piper"))]
    {
        Arc::new(MissingBackend)
    }
}

/// Provider over a voices directory
pub struct LocalVoiceProvider {
    voices_dir: PathBuf,
    loader: Arc<dyn ModelLoader>,
}

impl LocalVoiceProvider {
    /// Create a provider using the compiled-in backend
    #[must_use]
    pub fn new(voices_dir: impl Into<PathBuf>) -> Self {
        Self::with_loader(voices_dir, default_loader())
    }

    #[must_use]
    pub fn with_loader(voices_dir: impl Into<PathBuf>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            voices_dir: voices_dir.into(),
            loader,
        }
    }

    #[must_use]
    pub fn voices_dir(&self) -> &Path {
        &self.voices_dir
    }

    /// Resolve a voice id to its files
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationMissing` if the model or its sidecar is absent,
    /// `Voice` if the id is not a plain name
    pub fn resolve(&self, id: &str) -> Result<VoiceFiles> {
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::Voice("empty voice id".to_string()));
        }

        if has_model_extension(id) {
            let direct = PathBuf::from(id);
            let model = if direct.is_file() {
                direct
            } else {
                self.voices_dir.join(id)
            };
            if !model.is_file() {
                return Err(Error::ConfigurationMissing(format!(
                    "voice model not found: {}",
                    model.display()
                )));
            }
            let key = model
                .file_stem()
                .map_or_else(|| id.to_string(), |s| s.to_string_lossy().into_owned());
            let config = sidecar_path(&model);
            return Ok(VoiceFiles { key, model, config });
        }

        if id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(Error::Voice(format!("invalid voice id: {id}")));
        }

        let model = self.voices_dir.join(format!("{id}.{MODEL_EXTENSION}"));
        let config = sidecar_path(&model);
        if !model.is_file() || !config.is_file() {
            return Err(Error::ConfigurationMissing(format!(
                "voice {id} is not installed in {}",
                self.voices_dir.display()
            )));
        }

        Ok(VoiceFiles {
            key: id.to_string(),
            model,
            config,
        })
    }

    /// Sorted ids of the models in the voices directory
    #[must_use]
    pub fn list_voice_ids(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.voices_dir) else {
            return Vec::new();
        };

        let mut ids: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_model_extension(&path.to_string_lossy()))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        ids.sort();
        ids
    }
}

impl VoiceProvider for LocalVoiceProvider {
    fn cache_key(&self, id: &str) -> String {
        let id = id.trim();
        if has_model_extension(id) {
            Path::new(id)
                .file_stem()
                .map_or_else(|| id.to_string(), |s| s.to_string_lossy().into_owned())
        } else {
            id.to_string()
        }
    }

    fn load(&self, id: &str) -> Result<LoadedVoice> {
        let files = self.resolve(id)?;
        let sample_rate = sidecar_sample_rate(&files.model, &files.config);
        tracing::debug!(
            voice = %files.key,
            model = %files.model.display(),
            sample_rate,
            "loading voice model"
        );

        // A model that is present but cannot be brought up leaves the voice unavailable
        let resource = self.loader.load(&files, sample_rate).map_err(|e| match e {
            Error::ConfigurationMissing(_) => e,
            other => Error::ConfigurationMissing(format!(
                "voice {} failed to load: {other}",
                files.key
            )),
        })?;
        Ok(LoadedVoice {
            key: files.key,
            sample_rate,
            resource,
        })
    }

    fn list_voice_ids(&self) -> Vec<String> {
        Self::list_voice_ids(self)
    }
}

fn has_model_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MODEL_EXTENSION))
}

/// `<model>.onnx` -> `<model>.onnx.json`
#[must_use]
pub fn sidecar_path(model: &Path) -> PathBuf {
    let mut name = model.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// Sample rate declared by a voice's sidecar
///
/// Reads `audio.sample_rate`, then a top-level `sample_rate`. Without a
/// readable sidecar the model name decides: `low` models run at 16 kHz.
#[must_use]
pub fn sidecar_sample_rate(model: &Path, config: &Path) -> u32 {
    let meta = match read_sidecar(config) {
        Ok(meta) => Some(meta),
        Err(e) => {
            tracing::debug!(config = %config.display(), error = %e, "unusable voice sidecar");
            None
        }
    };

    if let Some(meta) = meta {
        let declared = meta
            .get("audio")
            .and_then(|audio| audio.get("sample_rate"))
            .or_else(|| meta.get("sample_rate"))
            .and_then(serde_json::Value::as_u64)
            .and_then(|rate| u32::try_from(rate).ok())
            .filter(|rate| *rate > 0);
        return declared.unwrap_or(DEFAULT_SAMPLE_RATE);
    }

    let name = model
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.contains("low") {
        LOW_QUALITY_SAMPLE_RATE
    } else {
        DEFAULT_SAMPLE_RATE
    }
}

/// Parse a voice's JSON sidecar
///
/// # Errors
///
/// Returns `Io` if the file cannot be read and `Serialization` if it is not JSON
pub fn read_sidecar(config: &Path) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(config)?;
    Ok(serde_json::from_str(&text)?)
}
