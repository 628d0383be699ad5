//! TOML configuration file loading
//!
//! Supports `~/.config/charvoice/config.toml` as a persistent config source.
//! Every field is optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub voice: VoiceFileConfig,

    #[serde(default)]
    pub dsp: DspFileConfig,

    #[serde(default)]
    pub playback: PlaybackFileConfig,
}

/// HTTP server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,

    /// Address to bind (e.g. "0.0.0.0")
    pub bind: Option<String>,
}

/// Voice model configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Directory holding `<id>.onnx` + `<id>.onnx.json` pairs
    pub voices_dir: Option<PathBuf>,

    /// Loaded voices kept resident
    pub cache_capacity: Option<usize>,

    /// Voice used when a request names none
    pub default_voice: Option<String>,
}

/// Effects configuration
#[derive(Debug, Default, Deserialize)]
pub struct DspFileConfig {
    pub enabled: Option<bool>,

    /// Stage kinds replaced by pass-through (e.g. `["reverb"]`)
    pub disabled_stages: Option<Vec<String>>,
}

/// Local playback configuration
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackFileConfig {
    /// Starting strategy (e.g. "optimized")
    pub player: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,

    /// System players, program followed by arguments
    pub external_players: Option<Vec<String>>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    config_file_path().map_or_else(ConfigFile::default, |path| load_from(&path))
}

/// Load a specific config file with the same fallback rules
pub fn load_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match parse_file(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ConfigFile::default()
        }
    }
}

/// Read and parse a config file
///
/// # Errors
///
/// Returns `Io` if the file cannot be read and `Toml` if it does not parse
pub fn parse_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/charvoice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("charvoice").join("config.toml"))
}
