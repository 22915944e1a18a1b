// Crash-tolerant WAV writer
//
// The file starts with a 44-byte PCM header whose length fields say zero.
// Sample bytes are appended behind it. At every checkpoint the samples are
// made durable first and only then are the header length fields rewritten,
// so the header never claims more audio than the disk holds. A process
// killed between checkpoints leaves a shorter but valid file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::backend::{FrameBlock, BITS_PER_SAMPLE};
use crate::error::{RecorderError, Result};

/// Size of the canonical PCM WAV header in bytes
pub const WAV_HEADER_SIZE: usize = 44;

const RIFF_SIZE_OFFSET: u64 = 4;
const DATA_SIZE_OFFSET: u64 = 40;

/// Largest data chunk a RIFF file can describe
pub const MAX_DATA_BYTES: u64 = u32::MAX as u64 - (WAV_HEADER_SIZE as u64 - 8);

/// Build a 44-byte PCM WAV header
///
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16
/// [20-21]  1 (PCM)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate
/// [32-33]  block_align
/// [34-35]  bits_per_sample
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub(crate) fn wav_header(sample_rate: u32, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = sample_rate * block_align as u32;

    let mut header = [0u8; WAV_HEADER_SIZE];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff_size(data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

fn riff_size(data_size: u32) -> u32 {
    data_size.saturating_add(WAV_HEADER_SIZE as u32 - 8)
}

/// When to make appended audio durable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Checkpoint after this many appended blocks
    pub every_blocks: u32,
    /// Checkpoint at least this often while blocks keep arriving
    pub interval: Duration,
}

impl FlushPolicy {
    /// Checkpoint after every single block
    pub fn every_block() -> Self {
        Self {
            every_blocks: 1,
            interval: Duration::ZERO,
        }
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            every_blocks: 10,
            interval: Duration::from_secs(1),
        }
    }
}

/// Owns one recording file from creation to finalization
pub struct WavFileWriter {
    path: PathBuf,
    file: BufWriter<File>,
    sample_rate: u32,
    channels: u16,
    policy: FlushPolicy,
    /// Largest data chunk this file may grow to
    max_data_bytes: u64,
    /// Sample bytes handed to `append`
    data_bytes: u64,
    /// Sample bytes the on-disk header currently declares
    declared_bytes: u64,
    blocks_since_checkpoint: u32,
    last_checkpoint: Instant,
}

impl WavFileWriter {
    /// Create a new recording, refusing to touch an existing file
    pub fn create(
        path: impl AsRef<Path>,
        sample_rate: u32,
        channels: u16,
        policy: FlushPolicy,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => RecorderError::NamingCollision { path: path.clone() },
                _ => RecorderError::io(&path, e),
            })?;

        let mut writer = Self {
            path,
            file: BufWriter::new(file),
            sample_rate,
            channels,
            policy,
            max_data_bytes: MAX_DATA_BYTES,
            data_bytes: 0,
            declared_bytes: 0,
            blocks_since_checkpoint: 0,
            last_checkpoint: Instant::now(),
        };

        writer.write_initial_header()?;

        info!(
            "Created recording {} ({}Hz, {} channel(s), {}-bit)",
            writer.path.display(),
            sample_rate,
            channels,
            BITS_PER_SAMPLE
        );

        Ok(writer)
    }

    /// Cap the data chunk below the RIFF limit
    ///
    /// Appends past the cap fail with `ContainerFull`, as they would at the
    /// RIFF limit itself.
    pub fn with_size_limit(mut self, max_data_bytes: u64) -> Self {
        self.max_data_bytes = max_data_bytes.min(MAX_DATA_BYTES);
        self
    }

    fn write_initial_header(&mut self) -> Result<()> {
        let header = wav_header(self.sample_rate, self.channels, 0);
        let path = self.path.clone();
        (|| {
            self.file.write_all(&header)?;
            self.file.flush()?;
            self.file.get_ref().sync_all()
        })()
        .map_err(|e| RecorderError::io(path, e))
    }

    /// Append one block of samples
    ///
    /// Checkpoints when the flush policy says so. Fails with `ContainerFull`
    /// without writing anything if the block would overflow the RIFF size
    /// fields or the configured size limit.
    pub fn append(&mut self, block: &FrameBlock) -> Result<()> {
        if block.channels() != self.channels {
            return Err(RecorderError::io(
                &self.path,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "block has {} channel(s), file has {}",
                        block.channels(),
                        self.channels
                    ),
                ),
            ));
        }

        let new_len = self.data_bytes + block.byte_len() as u64;
        if new_len > self.max_data_bytes {
            return Err(RecorderError::ContainerFull {
                path: self.path.clone(),
            });
        }

        self.file
            .write_all(&block.to_le_bytes())
            .map_err(|e| RecorderError::io(&self.path, e))?;
        self.data_bytes = new_len;
        self.blocks_since_checkpoint += 1;

        if self.checkpoint_due() {
            self.checkpoint()?;
        }

        Ok(())
    }

    fn checkpoint_due(&self) -> bool {
        self.blocks_since_checkpoint >= self.policy.every_blocks
            || self.last_checkpoint.elapsed() >= self.policy.interval
    }

    /// Make appended samples durable, then declare them in the header
    pub fn checkpoint(&mut self) -> Result<()> {
        let data_bytes = self.data_bytes;
        let path = self.path.clone();

        // MAX_DATA_BYTES keeps both length fields within u32
        let data_size = data_bytes as u32;

        (|| {
            self.file.flush()?;
            self.file.get_ref().sync_data()?;

            let file = self.file.get_mut();
            file.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
            file.write_all(&riff_size(data_size).to_le_bytes())?;
            file.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
            file.write_all(&data_size.to_le_bytes())?;
            file.seek(SeekFrom::End(0))?;
            file.sync_data()
        })()
        .map_err(|e| RecorderError::io(path, e))?;

        debug!(
            "Checkpoint {}: {} data bytes declared",
            self.path.display(),
            data_bytes
        );

        self.declared_bytes = data_bytes;
        self.blocks_since_checkpoint = 0;
        self.last_checkpoint = Instant::now();

        Ok(())
    }

    /// Write the exact final length into the header and close the file
    ///
    /// Returns the number of sample bytes in the data chunk.
    pub fn finalize(mut self) -> Result<u64> {
        self.checkpoint()?;
        self.file
            .get_ref()
            .sync_all()
            .map_err(|e| RecorderError::io(&self.path, e))?;

        info!(
            "Finalized recording {} ({} data bytes)",
            self.path.display(),
            self.data_bytes
        );

        Ok(self.data_bytes)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample bytes appended so far
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    /// Sample bytes the on-disk header declares
    pub fn declared_bytes(&self) -> u64 {
        self.declared_bytes
    }

    /// Sample frames appended so far
    pub fn frames_written(&self) -> u64 {
        self.data_bytes / (self.channels as u64 * (BITS_PER_SAMPLE as u64 / 8))
    }
}
