//! Hand the audio to a system player via a temp file

use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, Mutex};

use super::collect::{collect_chunks, play_buffer};
use super::{AudioDecoder, ChunkStream, OutputDevice, PlaybackStrategy, PlayerKind};
use crate::{Error, Result};

/// Players tried in order when none are configured
///
/// `aplay` reads the file as raw PCM and exits cleanly on MP3 input, so it
/// only runs when nothing that decodes is installed.
pub const DEFAULT_EXTERNAL_PLAYERS: [&str; 5] = [
    "ffplay -nodisp -autoexit",
    "mpv",
    "mplayer",
    "paplay",
    "aplay",
];

/// Writes the whole stream to a temp file and runs the first available player
///
/// Falls back to in-process playback when no player is installed. The temp
/// file is removed however playback ends.
pub struct ExternalPlayer {
    players: Vec<String>,
    device: Arc<dyn OutputDevice>,
    decoder: Arc<dyn AudioDecoder>,
    last_temp: Mutex<Option<PathBuf>>,
}

impl ExternalPlayer {
    #[must_use]
    pub fn new(
        players: Vec<String>,
        device: Arc<dyn OutputDevice>,
        decoder: Arc<dyn AudioDecoder>,
    ) -> Self {
        Self {
            players,
            device,
            decoder,
            last_temp: Mutex::new(None),
        }
    }

    /// Path of the temp file used by the most recent attempt
    #[must_use]
    pub fn last_temp_file(&self) -> Option<PathBuf> {
        self.last_temp.lock().ok().and_then(|p| p.clone())
    }

    /// Run the first player found on `PATH`
    ///
    /// Returns `Ok(None)` if none could be found.
    fn run_player(&self, file: &std::path::Path) -> Result<Option<String>> {
        let mut last_failure = None;

        for command in &self.players {
            let mut parts = command.split_whitespace();
            let Some(program) = parts.next() else {
                continue;
            };
            let Ok(path) = which::which(program) else {
                tracing::trace!(player = program, "player not installed");
                continue;
            };

            tracing::debug!(player = %path.display(), file = %file.display(), "running system player");
            let output = Command::new(&path).args(parts).arg(file).output()?;
            if output.status.success() {
                return Ok(Some(program.to_string()));
            }

            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(player = program, status = %output.status, stderr = %stderr.trim(), "system player failed");
            last_failure = Some(format!("{program} exited with {}", output.status));
        }

        match last_failure {
            Some(reason) => Err(Error::Audio(reason)),
            None => Ok(None),
        }
    }
}

impl PlaybackStrategy for ExternalPlayer {
    fn kind(&self) -> PlayerKind {
        PlayerKind::Fallback
    }

    fn play(&self, chunks: ChunkStream) -> Result<()> {
        let data = collect_chunks(chunks)?;
        if data.is_empty() {
            tracing::debug!("nothing to play");
            return Ok(());
        }

        let temp = tempfile::Builder::new()
            .prefix("charvoice-")
            .suffix(".mp3")
            .tempfile()?;
        std::fs::write(temp.path(), &data)?;
        if let Ok(mut last) = self.last_temp.lock() {
            *last = Some(temp.path().to_path_buf());
        }

        if let Some(player) = self.run_player(temp.path())? {
            tracing::debug!(player, bytes = data.len(), "played with system player");
            return Ok(());
        }

        tracing::info!("no system player available, decoding in-process");
        play_buffer(&data, self.device.as_ref(), self.decoder.as_ref())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::i16_to_bytes;
    use crate::playback::{MemoryDevice, OutputFormat, PcmDecoder};

    fn player(players: &[&str], device: &MemoryDevice) -> ExternalPlayer {
        ExternalPlayer::new(
            players.iter().map(ToString::to_string).collect(),
            Arc::new(device.clone()),
            Arc::new(PcmDecoder::new(OutputFormat::new(16000, 1))),
        )
    }

    fn chunks() -> ChunkStream {
        Box::new(vec![Ok(i16_to_bytes(&[1000i16; 64]))].into_iter())
    }

    #[test]
    fn test_decoding_players_come_before_aplay() {
        let programs: Vec<&str> = DEFAULT_EXTERNAL_PLAYERS
            .iter()
            .filter_map(|command| command.split_whitespace().next())
            .collect();
        let aplay = programs.iter().position(|p| *p == "aplay").unwrap();
        for decoder in ["ffplay", "mpv", "mplayer"] {
            let at = programs.iter().position(|p| *p == decoder).unwrap();
            assert!(at < aplay, "{decoder} should be tried before aplay");
        }
        assert_eq!(aplay, programs.len() - 1);
    }

    #[test]
    fn test_system_player_runs_and_temp_file_is_removed() {
        let device = MemoryDevice::new(OutputFormat::new(16000, 1));
        let player = player(&["true"], &device);

        player.play(chunks()).unwrap();

        let temp = player.last_temp_file().unwrap();
        assert!(temp.file_name().unwrap().to_string_lossy().starts_with("charvoice-"));
        assert!(!temp.exists());
        assert!(device.samples().is_empty());
    }

    #[test]
    fn test_failing_player_is_an_error() {
        let device = MemoryDevice::new(OutputFormat::new(16000, 1));
        let player = player(&["false"], &device);
        assert!(player.play(chunks()).is_err());
        assert!(!player.last_temp_file().unwrap().exists());
    }

    #[test]
    fn test_missing_players_fall_back_in_process() {
        let device = MemoryDevice::new(OutputFormat::new(16000, 1));
        let player = player(&["charvoice-no-such-player --flag", ""], &device);

        player.play(chunks()).unwrap();

        assert_eq!(device.samples().len(), 4096);
    }

    #[test]
    fn test_empty_stream_is_ok() {
        let device = MemoryDevice::new(OutputFormat::new(16000, 1));
        let player = player(&["true"], &device);
        player.play(Box::new(std::iter::empty())).unwrap();
        assert!(player.last_temp_file().is_none());
    }
}
