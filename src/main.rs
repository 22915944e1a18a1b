use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mic_recorder::audio::device;
use mic_recorder::config::DEFAULT_CONFIG_PATH;
use mic_recorder::{AudioFile, AudioHost, Config, CpalHost, Recorder, StopFlag};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

/// Continuously record the microphone to one WAV file per run
#[derive(Debug, Parser)]
#[command(name = "mic-recorder", version)]
struct Cli {
    /// Configuration file (TOML); missing file means defaults
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory recordings are written to
    #[arg(long)]
    output_dir: Option<String>,

    /// Sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Channel count (1 or 2)
    #[arg(long)]
    channels: Option<u16>,

    /// Append log lines to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record until SIGINT/SIGTERM (default)
    Record,
    /// List input devices and mark the one that would be used
    Devices,
    /// Print the format and length of a recording
    Inspect {
        path: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut cfg = Config::load(&self.config)?;

        if let Some(dir) = &self.output_dir {
            cfg.storage.output_dir = dir.clone();
        }
        if let Some(rate) = self.sample_rate {
            cfg.audio.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            cfg.audio.channels = channels;
        }
        if let Some(file) = &self.log_file {
            cfg.logging.file = Some(file.clone());
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{:#}", err);
            eprintln!("mic-recorder: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let cfg = cli.load_config()?;
    mic_recorder::logging::init(&cfg.logging)?;

    match cli.command.unwrap_or(Command::Record) {
        Command::Record => record(cfg).await,
        Command::Devices => list_devices(&cfg),
        Command::Inspect { path, json } => inspect(&path, json),
    }
}

async fn record(cfg: Config) -> Result<u8> {
    info!("Mic Recorder v{} started", env!("CARGO_PKG_VERSION"));

    let settings = cfg.recorder_settings()?;
    let stop = StopFlag::new();
    tokio::spawn(watch_signals(stop.clone()));

    // cpal streams are not Send, so the whole session lives on one blocking
    // thread from device open to file close.
    let outcome = tokio::task::spawn_blocking(move || {
        let mut recorder = Recorder::new(CpalHost::new(), settings, stop);
        recorder.run()
    })
    .await
    .context("Capture thread panicked")?;

    let code = outcome.exit_code();
    match &outcome.error {
        Some(err) => error!(
            kind = err.kind(),
            "Mic Recorder stopped in state {} (exit {}): {}", outcome.state, code, err
        ),
        None => info!("Mic Recorder stopped in state {}", outcome.state),
    }

    Ok(code)
}

/// Raise the stop flag on SIGINT or SIGTERM
async fn watch_signals(stop: StopFlag) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, finishing recording...");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        error!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, finishing recording...");
        }
    }

    stop.raise();
}

fn list_devices(cfg: &Config) -> Result<u8> {
    let host = CpalHost::new();
    let devices = host.input_devices()?;

    if devices.is_empty() {
        println!("No input devices found");
        return Ok(1);
    }

    let chosen = device::choose(&devices, cfg.audio.preferred_device.as_deref());
    for dev in &devices {
        let marker = if Some(dev) == chosen { "*" } else { " " };
        println!("{} {:>2}: {}", marker, dev.index, dev.name);
    }

    Ok(0)
}

fn inspect(path: &Path, json: bool) -> Result<u8> {
    let audio = AudioFile::open(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&audio)?);
    } else {
        println!("File:        {}", audio.path);
        println!("Sample rate: {} Hz", audio.sample_rate);
        println!("Channels:    {}", audio.channels);
        println!("Bit depth:   {}", audio.bits_per_sample);
        println!("Frames:      {}", audio.frames);
        println!("Data bytes:  {}", audio.data_bytes);
        println!("Duration:    {:.2}s", audio.duration_seconds);
    }

    Ok(0)
}
