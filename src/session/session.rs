use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::stats::SessionSummary;
use crate::audio::BITS_PER_SAMPLE;
use crate::recording::LifecycleState;

/// One process run's recording
///
/// Created when the capture loop begins. The frame count follows what the
/// WAV writer has accepted; the finalized flag is set by the lifecycle
/// controller once the header has been corrected.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    /// Unique session identifier, used to correlate log lines
    pub id: Uuid,

    /// When the session started
    pub started_at: DateTime<Local>,

    /// Recording file for this session
    pub path: PathBuf,

    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,

    frames_written: u64,
    finalized: bool,
}

impl RecordingSession {
    pub fn new(started_at: DateTime<Local>, path: PathBuf, sample_rate: u32, channels: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            path,
            sample_rate,
            channels,
            bits_per_sample: BITS_PER_SAMPLE,
            frames_written: 0,
            finalized: false,
        }
    }

    pub fn set_frames_written(&mut self, frames: u64) {
        self.frames_written = frames;
    }

    pub fn mark_finalized(&mut self) {
        self.finalized = true;
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample bytes covered by the frames written so far
    pub fn data_bytes(&self) -> u64 {
        self.frames_written * self.channels as u64 * (self.bits_per_sample as u64 / 8)
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames_written as f64 / self.sample_rate as f64
    }

    pub fn summary(&self, state: LifecycleState, recoverable_errors: u64) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            path: self.path.clone(),
            started_at: self.started_at,
            sample_rate: self.sample_rate,
            channels: self.channels,
            frames_written: self.frames_written,
            data_bytes: self.data_bytes(),
            duration_secs: self.duration_secs(),
            finalized: self.finalized,
            state,
            recoverable_errors,
        }
    }
}
