//! Configuration management for charvoice
//!
//! Precedence is env > `config.toml` > defaults. Env values that fail to
//! parse are ignored so the next layer applies.

pub mod file;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::effects::{DspCapabilities, StageKind};
use crate::playback::{DEFAULT_EXTERNAL_PLAYERS, OutputFormat, PlayerKind, PlayerSettings};
use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 8765;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_VOICE: &str = "en_US-lessac-medium";
pub const DEFAULT_CACHE_CAPACITY: usize = 2;

/// charvoice configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub voice: VoiceConfig,
    pub dsp: DspConfig,
    pub playback: PlaybackConfig,

    /// Path to data directory (voices live under it by default)
    pub data_dir: PathBuf,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: IpAddr,
}

/// Voice model configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub voices_dir: PathBuf,

    /// Resident voices before the least recently used is evicted
    pub cache_capacity: usize,

    pub default_voice: String,
}

/// Effects configuration
#[derive(Debug, Clone)]
pub struct DspConfig {
    /// When false, only unprocessed streams can be served
    pub enabled: bool,

    /// Stages replaced by pass-through
    pub disabled_stages: Vec<StageKind>,
}

/// Local playback configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Strategy the fallback order starts from
    pub player: PlayerKind,
    pub format: OutputFormat,
    pub external_players: Vec<String>,
}

/// Parse an env value, logging and ignoring values that don't parse
fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    let value = raw.trim().parse().ok();
    if value.is_none() {
        tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
    }
    value
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("charvoice"))
}

impl Config {
    /// Load configuration from the environment and the TOML file
    ///
    /// # Errors
    ///
    /// Returns `Config` if the bind address is invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns `Config` if the bind address is invalid
    pub fn from_sources(fc: file::ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = default_data_dir();

        // Server config (env > toml > default)
        let bind_raw = env("CHARVOICE_BIND")
            .or(fc.server.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid bind address: {bind_raw}")))?;
        let server = ServerConfig {
            port: parsed(&env, "CHARVOICE_PORT")
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            bind,
        };

        let voice = VoiceConfig {
            voices_dir: env("CHARVOICE_VOICES_DIR")
                .map(PathBuf::from)
                .or(fc.voice.voices_dir)
                .unwrap_or_else(|| data_dir.join("voices")),
            cache_capacity: parsed(&env, "CHARVOICE_VOICE_CACHE")
                .or(fc.voice.cache_capacity)
                .unwrap_or(DEFAULT_CACHE_CAPACITY),
            default_voice: env("CHARVOICE_DEFAULT_VOICE")
                .filter(|v| !v.trim().is_empty())
                .or(fc.voice.default_voice)
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
        };

        let dsp_env = env("CHARVOICE_DSP_ENABLED").and_then(|raw| {
            let value = parse_bool(&raw);
            if value.is_none() {
                tracing::warn!(key = "CHARVOICE_DSP_ENABLED", value = %raw, "ignoring unparsable environment value");
            }
            value
        });
        let disabled_stages = fc
            .dsp
            .disabled_stages
            .unwrap_or_default()
            .iter()
            .filter_map(|name| match name.parse::<StageKind>() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring disabled stage");
                    None
                }
            })
            .collect();
        let dsp = DspConfig {
            enabled: dsp_env.or(fc.dsp.enabled).unwrap_or(true),
            disabled_stages,
        };

        let toml_player = fc.playback.player.and_then(|name| match name.parse() {
            Ok(kind) => Some(kind),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring configured player");
                None
            }
        });
        let defaults = OutputFormat::default();
        let playback = PlaybackConfig {
            player: parsed(&env, "CHARVOICE_PLAYER")
                .or(toml_player)
                .unwrap_or(PlayerKind::Optimized),
            format: OutputFormat::new(
                fc.playback.sample_rate.unwrap_or(defaults.sample_rate),
                fc.playback.channels.unwrap_or(defaults.channels).max(1),
            ),
            external_players: fc.playback.external_players.unwrap_or_else(|| {
                DEFAULT_EXTERNAL_PLAYERS
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            }),
        };

        Ok(Self {
            server,
            voice,
            dsp,
            playback,
            data_dir,
        })
    }

    /// Address the API server listens on
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind, self.server.port)
    }

    /// Stage availability derived from the DSP settings
    #[must_use]
    pub fn capabilities(&self) -> DspCapabilities {
        if self.dsp.enabled {
            DspCapabilities::full().without(self.dsp.disabled_stages.iter().copied())
        } else {
            DspCapabilities::absent()
        }
    }

    #[must_use]
    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            format: self.playback.format,
            external_players: self.playback.external_players.clone(),
        }
    }
}
