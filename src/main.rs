use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use charvoice::api::ApiServer;
use charvoice::playback::{
    AudioDecoder, DefaultOutputDevice, MemoryDevice, Mp3Decoder, OutputDevice,
};
use charvoice::{
    ChunkSource, Config, Overrides, PlaybackCoordinator, PlayerKind, Preset, SynthesisRequest,
    SynthesisService,
};

/// charvoice - character voices for local text-to-speech
#[derive(Parser)]
#[command(name = "charvoice", version, about)]
struct Cli {
    /// Port to listen on (overrides configuration)
    #[arg(long, env = "CHARVOICE_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// List installed voices
    Voices,
    /// List presets and their parameter defaults
    Presets,
    /// Synthesize text to a WAV file
    Render {
        /// Voice id (defaults to the configured voice)
        #[arg(long, default_value = "")]
        voice: String,
        /// Effect preset
        #[arg(long, default_value = "")]
        preset: String,
        /// Parameter override, repeatable (e.g. --set drive_db=12)
        #[arg(long = "set", value_parser = parse_override)]
        overrides: Vec<(String, f32)>,
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
        /// Text to speak
        text: String,
    },
    /// Play an MP3 file or URL
    Play {
        /// Strategy to start the fallback order from
        #[arg(long)]
        player: Option<PlayerKind>,
        /// Decode into memory instead of the speakers
        #[arg(long)]
        dry_run: bool,
        /// Path or http(s) URL
        source: String,
    },
    /// Test speaker output
    TestSpeaker,
}

fn parse_override(raw: &str) -> Result<(String, f32), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw}"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|_| format!("not a number: {value}"))?;
    Ok((key.trim().to_string(), value))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,charvoice=info",
        1 => "info,charvoice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::Voices => voices(&config).await,
        Command::Presets => {
            presets();
            Ok(())
        }
        Command::Render {
            voice,
            preset,
            overrides,
            out,
            text,
        } => {
            let overrides: Overrides = overrides.into_iter().collect();
            let request = SynthesisRequest::new(text, voice)
                .with_preset(preset)
                .with_overrides(overrides);
            render(&config, request, &out).await
        }
        Command::Play {
            player,
            dry_run,
            source,
        } => play(&config, player, dry_run, source).await,
        Command::TestSpeaker => test_speaker(&config).await,
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        voices_dir = %config.voice.voices_dir.display(),
        default_voice = %config.voice.default_voice,
        dsp = config.dsp.enabled,
        "starting charvoice"
    );

    let service = Arc::new(SynthesisService::from_config(config));
    ApiServer::new(service, config.socket_addr()).run().await?;
    Ok(())
}

async fn voices(config: &Config) -> anyhow::Result<()> {
    let service = SynthesisService::from_config(config);
    let provider = Arc::clone(service.voices().provider());
    let ids = tokio::task::spawn_blocking(move || provider.list_voice_ids()).await?;

    if ids.is_empty() {
        println!("No voices in {}", config.voice.voices_dir.display());
        return Ok(());
    }
    for id in ids {
        let marker = if id == config.voice.default_voice { " (default)" } else { "" };
        println!("{id}{marker}");
    }
    Ok(())
}

fn presets() {
    for preset in Preset::ALL {
        println!("{preset}");
        for (name, value) in preset.defaults() {
            println!("  {name} = {value}");
        }
    }
}

async fn render(
    config: &Config,
    request: SynthesisRequest,
    out: &std::path::Path,
) -> anyhow::Result<()> {
    let service = SynthesisService::from_config(config);
    let summary = service.render_to_file(request, out).await?;
    println!(
        "Wrote {} ({} bytes of PCM at {} Hz)",
        out.display(),
        summary.pcm_bytes,
        summary.sample_rate
    );
    Ok(())
}

async fn play(
    config: &Config,
    player: Option<PlayerKind>,
    dry_run: bool,
    source: String,
) -> anyhow::Result<()> {
    let start = player.unwrap_or(config.playback.player);
    let settings = config.player_settings();
    let memory = MemoryDevice::new(settings.format);
    let device: Arc<dyn OutputDevice> = if dry_run {
        Arc::new(memory.clone())
    } else {
        Arc::new(DefaultOutputDevice::new(settings.format))
    };
    let decoder: Arc<dyn AudioDecoder> = Arc::new(Mp3Decoder);
    let coordinator = PlaybackCoordinator::for_kind(start, &device, &decoder, &settings);

    let used = tokio::task::spawn_blocking(move || {
        let source = if source.starts_with("http://") || source.starts_with("https://") {
            ChunkSource::from_url(&source)?
        } else {
            ChunkSource::from_file(std::path::Path::new(&source))?
        };
        coordinator.play(source)
    })
    .await??;

    if dry_run {
        #[allow(clippy::cast_precision_loss)]
        let seconds =
            memory.samples().len() as f64 / settings.format.samples_per_second().max(1) as f64;
        println!("Decoded {seconds:.2}s of audio with {used}");
    } else {
        tracing::info!(strategy = %used, "playback complete");
    }
    Ok(())
}

async fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let format = config.playback.format;
    tokio::task::spawn_blocking(move || -> charvoice::Result<()> {
        let mut sink = DefaultOutputDevice::new(format).open()?;
        let format = sink.format();
        let channels = usize::from(format.channels.max(1));
        let frequency = 440.0_f32;

        #[allow(clippy::cast_precision_loss)]
        let samples: Vec<f32> = (0..format.sample_rate as usize * 2)
            .flat_map(|i| {
                let t = i as f32 / format.sample_rate as f32;
                let s = (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3; // 30% volume
                std::iter::repeat_n(s, channels)
            })
            .collect();

        println!("Playing {} samples at {} Hz...", samples.len(), format.sample_rate);
        sink.write(&samples)?;
        sink.finish()
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
