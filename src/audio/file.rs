use anyhow::{Context, Result};
use hound::{WavReader, WavSpec};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// A finished (or abandoned) recording, read back with a standard WAV reader
///
/// Only the header is read; recordings run for hours, so samples are
/// loaded on request through [`AudioFile::read_samples`].
#[derive(Debug, Serialize)]
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Sample frames (one sample per channel) the header declares
    pub frames: u64,
    /// Size of the data chunk as the header declares it
    pub data_bytes: u64,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = open_reader(path)?;
        let spec = reader.spec();

        let frames = reader.duration() as u64;
        let data_bytes = reader.len() as u64 * (spec.bits_per_sample as u64 / 8);
        let duration_seconds = frames as f64 / spec.sample_rate as f64;

        info!(
            "Audio file opened: {:.1}s, {}Hz, {} channels, {} frames",
            duration_seconds, spec.sample_rate, spec.channels, frames
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            frames,
            data_bytes,
        })
    }

    /// Load every sample of the data chunk (i16 PCM, interleaved)
    pub fn read_samples(&self) -> Result<Vec<i16>> {
        let path = PathBuf::from(&self.path);
        open_reader(&path)?
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read audio samples from {}", path.display()))
    }
}

fn open_reader(path: &Path) -> Result<WavReader<std::io::BufReader<std::fs::File>>> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
    check_format(reader.spec())?;
    Ok(reader)
}

fn check_format(spec: WavSpec) -> Result<()> {
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        anyhow::bail!(
            "Unsupported WAV format: {:?} {}-bit (expected 16-bit PCM)",
            spec.sample_format,
            spec.bits_per_sample
        );
    }
    Ok(())
}
