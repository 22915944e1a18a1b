use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::{CaptureParams, FlushPolicy, MAX_DATA_BYTES};
use crate::recording::RecorderSettings;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/mic-recorder/config.toml";
pub const ENV_PREFIX: &str = "MIC_RECORDER";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub storage: StorageConfig,
    pub startup: StartupConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per block handed to the writer
    pub block_frames: usize,
    /// Case-insensitive substring of the device to prefer
    pub preferred_device: Option<String>,
    /// Blocks worth of samples the device callback may queue ahead of the
    /// writer
    pub queue_blocks: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            block_frames: 4410,
            preferred_device: None,
            queue_blocks: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: String,
    pub flush_every_blocks: u32,
    pub flush_interval_ms: u64,
    /// Refuse to start below this much free space (0 disables the check)
    pub min_free_mb: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: "/var/lib/mic_recorder".to_string(),
            flush_every_blocks: 10,
            flush_interval_ms: 1000,
            min_free_mb: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    pub attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append-only log file; stderr when unset
    pub file: Option<PathBuf>,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load defaults, then the TOML file at `path` (if it exists), then
    /// `MIC_RECORDER__SECTION__KEY` environment variables
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        let cfg: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            bail!("audio.sample_rate must be positive");
        }
        if !matches!(self.audio.channels, 1 | 2) {
            bail!("audio.channels must be 1 or 2, got {}", self.audio.channels);
        }
        if self.audio.block_frames == 0 {
            bail!("audio.block_frames must be positive");
        }
        if self.audio.queue_blocks == 0 {
            bail!("audio.queue_blocks must be positive");
        }
        if self.storage.flush_every_blocks == 0 {
            bail!("storage.flush_every_blocks must be positive");
        }
        if self.storage.output_dir.trim().is_empty() {
            bail!("storage.output_dir must not be empty");
        }
        if self.startup.attempts == 0 {
            bail!("startup.attempts must be positive");
        }
        Ok(())
    }

    /// Output directory with `~` and environment variables expanded
    pub fn output_dir(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.storage.output_dir)
            .with_context(|| format!("Failed to expand output dir '{}'", self.storage.output_dir))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }

    pub fn recorder_settings(&self) -> Result<RecorderSettings> {
        Ok(RecorderSettings {
            capture: CaptureParams {
                sample_rate: self.audio.sample_rate,
                channels: self.audio.channels,
                block_frames: self.audio.block_frames,
                queue_blocks: self.audio.queue_blocks,
            },
            output_dir: self.output_dir()?,
            flush: FlushPolicy {
                every_blocks: self.storage.flush_every_blocks,
                interval: Duration::from_millis(self.storage.flush_interval_ms),
            },
            min_free_mb: self.storage.min_free_mb,
            max_data_bytes: MAX_DATA_BYTES,
            preferred_device: self.audio.preferred_device.clone(),
            startup_attempts: self.startup.attempts,
            retry_delay: Duration::from_millis(self.startup.retry_delay_ms),
        })
    }
}
