// Error taxonomy for the capture pipeline
//
// Startup errors abort the run. Mid-session errors are either recoverable
// (logged, capture continues) or fatal (best-effort finalize, then exit).

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a frame source while a session is capturing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The device produced audio faster than the capture loop drained it
    #[error("input overrun: {dropped_blocks} buffer(s) could not be delivered")]
    Overrun { dropped_blocks: u64 },

    /// Transient backend-specific stream error
    #[error("stream error: {0}")]
    Stream(String),

    /// The input device went away mid-session
    #[error("input device lost: {0}")]
    DeviceLost(String),
}

impl CaptureError {
    /// Whether capture may continue after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CaptureError::DeviceLost(_))
    }
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("no audio input device found")]
    NoDeviceFound,

    #[error("failed to open input device '{device}': {reason}")]
    DeviceOpen { device: String, reason: String },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("recording already exists, refusing to overwrite: {}", path.display())]
    NamingCollision { path: PathBuf },

    #[error("WAV size limit reached for {}", path.display())]
    ContainerFull { path: PathBuf },

    #[error(
        "not enough free space in {}: {available_mb} MB available, {required_mb} MB required",
        path.display()
    )]
    LowDiskSpace {
        path: PathBuf,
        available_mb: u64,
        required_mb: u64,
    },

    #[error("invalid capture settings: {0}")]
    InvalidSettings(String),
}

impl RecorderError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecorderError::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly label used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            RecorderError::NoDeviceFound => "NoDeviceFound",
            RecorderError::DeviceOpen { .. } => "DeviceOpenError",
            RecorderError::Capture(_) => "CaptureError",
            RecorderError::Io { .. } => "IOError",
            RecorderError::NamingCollision { .. } => "NamingCollisionError",
            RecorderError::ContainerFull { .. } => "ContainerFull",
            RecorderError::LowDiskSpace { .. } => "LowDiskSpace",
            RecorderError::InvalidSettings(_) => "InvalidSettings",
        }
    }
}

pub type Result<T, E = RecorderError> = std::result::Result<T, E>;
