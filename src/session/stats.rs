use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::recording::LifecycleState;

/// Statistics about a finished recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,

    /// Recording file
    pub path: PathBuf,

    /// When the recording started
    pub started_at: DateTime<Local>,

    pub sample_rate: u32,
    pub channels: u16,

    /// Sample frames accepted by the writer
    pub frames_written: u64,

    /// Size of the data chunk in bytes
    pub data_bytes: u64,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Whether the header was corrected to the exact length
    pub finalized: bool,

    /// State the session ended in
    pub state: LifecycleState,

    /// Overruns and transient stream errors seen while capturing
    pub recoverable_errors: u64,
}
