// Lifecycle controller: device -> stream -> file -> capture loop -> finalize
//
// Runs on a single thread. `next_block` is the only place it waits; the stop
// flag is checked after every block, and the source itself ends its stream
// once the flag is raised so an idle device cannot hold up shutdown.

use chrono::Local;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{error, info, info_span, warn};

use super::state::LifecycleState;
use super::stop::StopFlag;
use crate::audio::{
    derive_path, prepare_output_dir, select_input_device, AudioHost, CaptureParams, DeviceRef,
    FlushPolicy, FrameSource, WavFileWriter, MAX_DATA_BYTES,
};
use crate::error::{RecorderError, Result};
use crate::session::{RecordingSession, SessionSummary};

/// Exit status when the run ended cleanly
pub const EXIT_OK: u8 = 0;
/// Exit status for startup failures and failed finalization
pub const EXIT_FAILURE: u8 = 1;
/// Exit status for a fatal mid-session error after the file was finalized
pub const EXIT_SESSION_ABORTED: u8 = 2;
/// Exit status when the WAV size limit ended the session (EX_TEMPFAIL)
pub const EXIT_CONTAINER_FULL: u8 = 75;

/// Everything the controller needs to run one session
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub capture: CaptureParams,
    pub output_dir: PathBuf,
    pub flush: FlushPolicy,
    /// Refuse to start with less free space than this in the output
    /// directory (0 disables the check)
    pub min_free_mb: u64,
    /// Data bytes after which the file is full; capped at the RIFF limit
    pub max_data_bytes: u64,
    /// Case-insensitive device name substring to prefer
    pub preferred_device: Option<String>,
    /// Attempts at selecting and opening the device before giving up
    pub startup_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            capture: CaptureParams::default(),
            output_dir: PathBuf::from("/var/lib/mic_recorder"),
            flush: FlushPolicy::default(),
            min_free_mb: 200,
            max_data_bytes: MAX_DATA_BYTES,
            preferred_device: None,
            startup_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// How a run ended
#[derive(Debug)]
pub struct SessionOutcome {
    pub state: LifecycleState,
    /// Present once a recording file was created
    pub summary: Option<SessionSummary>,
    /// First fatal error, if any
    pub error: Option<RecorderError>,
}

impl SessionOutcome {
    /// Process exit status for this outcome
    ///
    /// Follows the error, not the lifecycle state: a session that ended
    /// `Stopped` after device loss or a failed append exits
    /// [`EXIT_SESSION_ABORTED`], and one that filled its file exits
    /// [`EXIT_CONTAINER_FULL`]. Only a run with no error exits [`EXIT_OK`].
    pub fn exit_code(&self) -> u8 {
        match (&self.error, &self.summary) {
            (None, _) => EXIT_OK,
            (Some(RecorderError::ContainerFull { .. }), Some(s)) if s.finalized => {
                EXIT_CONTAINER_FULL
            }
            (Some(_), Some(s)) if s.finalized => EXIT_SESSION_ABORTED,
            (Some(_), _) => EXIT_FAILURE,
        }
    }
}

/// Drives one recording session from device selection to a closed file
pub struct Recorder<H: AudioHost> {
    host: H,
    settings: RecorderSettings,
    stop: StopFlag,
    state: LifecycleState,
}

impl<H: AudioHost> Recorder<H> {
    pub fn new(host: H, settings: RecorderSettings, stop: StopFlag) -> Self {
        Self {
            host,
            settings,
            stop,
            state: LifecycleState::Starting,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn transition(&mut self, next: LifecycleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        info!("Lifecycle: {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: RecorderError) -> SessionOutcome {
        error!(kind = err.kind(), "Startup failed: {}", err);
        self.transition(LifecycleState::Failed);
        SessionOutcome {
            state: self.state,
            summary: None,
            error: Some(err),
        }
    }

    /// Run the session to completion
    pub fn run(&mut self) -> SessionOutcome {
        info!(
            "Starting recorder: {}Hz, {} channel(s), output {}",
            self.settings.capture.sample_rate,
            self.settings.capture.channels,
            self.settings.output_dir.display()
        );

        if let Err(err) = self.settings.capture.validate() {
            return self.fail(err);
        }

        if let Err(err) = prepare_output_dir(&self.settings.output_dir, self.settings.min_free_mb) {
            return self.fail(err);
        }

        let (device, mut source) = match self.open_with_retries() {
            Ok(Some(opened)) => opened,
            Ok(None) => {
                info!("Stop requested before capture started");
                self.transition(LifecycleState::Stopped);
                return SessionOutcome {
                    state: self.state,
                    summary: None,
                    error: None,
                };
            }
            Err(err) => return self.fail(err),
        };

        let started_at = Local::now();
        let path = derive_path(&self.settings.output_dir, &started_at);
        let writer = match WavFileWriter::create(
            &path,
            self.settings.capture.sample_rate,
            self.settings.capture.channels,
            self.settings.flush,
        ) {
            Ok(writer) => writer.with_size_limit(self.settings.max_data_bytes),
            Err(err) => {
                source.close();
                return self.fail(err);
            }
        };

        let session = RecordingSession::new(
            started_at,
            path,
            self.settings.capture.sample_rate,
            self.settings.capture.channels,
        );

        let span = info_span!("session", id = %session.id);
        let _entered = span.enter();
        info!(
            "Recording from '{}' to {}",
            device.name,
            session.path().display()
        );

        self.capture(session, source, writer)
    }

    /// Select and open the input device, retrying a bounded number of times
    ///
    /// Returns `Ok(None)` when a stop request arrives while retrying.
    fn open_with_retries(&self) -> Result<Option<(DeviceRef, Box<dyn FrameSource>)>> {
        let attempts = self.settings.startup_attempts.max(1);
        let mut attempt = 1;

        loop {
            if self.stop.is_raised() {
                return Ok(None);
            }

            let opened = select_input_device(&self.host, self.settings.preferred_device.as_deref())
                .and_then(|device| {
                    let source = self.host.open(&device, &self.settings.capture, &self.stop)?;
                    Ok((device, source))
                });

            match opened {
                Ok(opened) => return Ok(Some(opened)),
                Err(err) if attempt < attempts => {
                    warn!(
                        kind = err.kind(),
                        "Startup attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt,
                        attempts,
                        err,
                        self.settings.retry_delay
                    );
                    thread::sleep(self.settings.retry_delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn capture(
        &mut self,
        mut session: RecordingSession,
        mut source: Box<dyn FrameSource>,
        mut writer: WavFileWriter,
    ) -> SessionOutcome {
        self.transition(LifecycleState::Capturing);

        let mut fatal: Option<RecorderError> = None;
        let mut recoverable_errors = 0u64;
        let mut stopping = false;

        loop {
            match source.next_block() {
                Ok(Some(block)) => {
                    if let Err(err) = writer.append(&block) {
                        error!(
                            kind = err.kind(),
                            "Failed to append to {}: {}",
                            writer.path().display(),
                            err
                        );
                        fatal = Some(err);
                        break;
                    }
                    session.set_frames_written(writer.frames_written());
                }
                Ok(None) => break,
                Err(err) if err.is_recoverable() => {
                    recoverable_errors += 1;
                    warn!("Recoverable capture error, continuing: {}", err);
                }
                Err(err) => {
                    error!("Capture aborted: {}", err);
                    fatal = Some(err.into());
                    break;
                }
            }

            if !stopping && self.stop.is_raised() {
                info!("Stop requested, draining buffered audio");
                stopping = true;
                source.stop();
            }
        }

        source.close();
        self.transition(LifecycleState::Finalizing);

        match writer.finalize() {
            Ok(data_bytes) => {
                session.mark_finalized();
                info!(
                    "Recording complete: {} ({} bytes, {:.1}s)",
                    session.path().display(),
                    data_bytes,
                    session.duration_secs()
                );
            }
            Err(err) => {
                error!(
                    kind = err.kind(),
                    "Failed to finalize {}: {}",
                    session.path().display(),
                    err
                );
                fatal.get_or_insert(err);
            }
        }

        // A fatal capture error still ends in Stopped when the header could be
        // corrected; the error is carried in the outcome and the exit code.
        let next = if session.is_finalized() {
            LifecycleState::Stopped
        } else {
            LifecycleState::Failed
        };
        self.transition(next);

        let summary = session.summary(self.state, recoverable_errors);
        match serde_json::to_string(&summary) {
            Ok(line) => info!("Session summary: {}", line),
            Err(e) => warn!("Failed to serialize session summary: {}", e),
        }

        SessionOutcome {
            state: self.state,
            summary: Some(summary),
            error: fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use uuid::Uuid;

    fn summary(finalized: bool) -> SessionSummary {
        SessionSummary {
            session_id: Uuid::new_v4(),
            path: PathBuf::from("/tmp/recording.wav"),
            started_at: Local::now(),
            sample_rate: 44100,
            channels: 1,
            frames_written: 0,
            data_bytes: 0,
            duration_secs: 0.0,
            finalized,
            state: LifecycleState::Stopped,
            recoverable_errors: 0,
        }
    }

    fn outcome(error: Option<RecorderError>, summary: Option<SessionSummary>) -> SessionOutcome {
        SessionOutcome {
            state: LifecycleState::Stopped,
            summary,
            error,
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(outcome(None, Some(summary(true))).exit_code(), EXIT_OK);
        assert_eq!(
            outcome(Some(RecorderError::NoDeviceFound), None).exit_code(),
            EXIT_FAILURE
        );
        assert_eq!(
            outcome(
                Some(CaptureError::DeviceLost("gone".into()).into()),
                Some(summary(true))
            )
            .exit_code(),
            EXIT_SESSION_ABORTED
        );
        assert_eq!(
            outcome(
                Some(RecorderError::ContainerFull {
                    path: PathBuf::from("/tmp/recording.wav")
                }),
                Some(summary(true))
            )
            .exit_code(),
            EXIT_CONTAINER_FULL
        );
    }

    #[test]
    fn test_failed_finalize_exits_with_failure() {
        let err = RecorderError::io("/tmp/recording.wav", std::io::Error::other("disk gone"));
        assert_eq!(outcome(Some(err), Some(summary(false))).exit_code(), EXIT_FAILURE);
    }
}
