use crate::error::{CaptureError, RecorderError, Result};
use crate::recording::StopFlag;

/// Bits per sample of every block and every file this crate writes
pub const BITS_PER_SAMPLE: u16 = 16;

/// Immutable block of interleaved 16-bit PCM captured in one go
///
/// Produced by a [`FrameSource`], handed straight to the WAV writer and then
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBlock {
    samples: Vec<i16>,
    channels: u16,
}

impl FrameBlock {
    pub fn new(samples: Vec<i16>, channels: u16) -> Self {
        Self { samples, channels }
    }

    /// Raw samples (i16 PCM, interleaved)
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Size of the block once serialized into a WAV data chunk
    pub fn byte_len(&self) -> usize {
        self.samples.len() * (BITS_PER_SAMPLE as usize / 8)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Little-endian bytes as they appear on disk
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Capture parameters for opening a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureParams {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Frames per block handed to the writer
    pub block_frames: usize,
    /// Capacity of the queue between the device callback and the capture loop
    pub queue_blocks: usize,
}

impl CaptureParams {
    /// Samples in one full block
    pub fn block_len(&self) -> usize {
        self.block_frames * self.channels as usize
    }

    /// Reject parameters no stream or WAV file can be built from
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(RecorderError::InvalidSettings(
                "sample rate must be positive".to_string(),
            ));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(RecorderError::InvalidSettings(format!(
                "channels must be 1 or 2, got {}",
                self.channels
            )));
        }
        if self.block_frames == 0 || self.queue_blocks == 0 {
            return Err(RecorderError::InvalidSettings(
                "block_frames and queue_blocks must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CaptureParams {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            block_frames: 4410, // 100ms at 44.1kHz
            queue_blocks: 64,
        }
    }
}

/// An input device as reported by the host, in enumeration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    pub index: usize,
    pub name: String,
}

/// Audio host: enumerates input devices and opens capture streams
///
/// Implementations:
/// - [`crate::audio::CpalHost`]: the platform audio subsystem via cpal
/// - [`crate::audio::MockHost`]: scripted devices and audio for tests
pub trait AudioHost {
    /// Input-capable devices in host enumeration order
    ///
    /// Fails with `NoDeviceFound` when the audio subsystem cannot be reached.
    fn input_devices(&self) -> Result<Vec<DeviceRef>>;

    /// Open a capture stream on `device`
    ///
    /// The returned source owns the device handle until it is closed or
    /// dropped. It ends its stream once `stop` is raised.
    fn open(
        &self,
        device: &DeviceRef,
        params: &CaptureParams,
        stop: &StopFlag,
    ) -> Result<Box<dyn FrameSource>>;

    /// Host name for logging
    fn name(&self) -> &str;
}

/// Lazy, non-restartable sequence of frame blocks
pub trait FrameSource {
    /// Next block of audio, blocking until one is available
    ///
    /// Returns `Ok(None)` at end of stream. Once stopped, only audio that
    /// was already captured is returned before the end.
    fn next_block(&mut self) -> std::result::Result<Option<FrameBlock>, CaptureError>;

    /// Stop capturing; buffered audio remains readable through `next_block`
    fn stop(&mut self);

    /// Release the device handle
    fn close(&mut self);
}
