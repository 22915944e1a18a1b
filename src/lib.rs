pub mod audio;
pub mod config;
pub mod error;
pub mod logging;
pub mod recording;
pub mod session;

pub use audio::{
    AudioFile, AudioHost, CaptureParams, CpalHost, DeviceRef, FlushPolicy, FrameBlock,
    FrameSource, MockHost, WavFileWriter,
};
pub use config::Config;
pub use error::{CaptureError, RecorderError};
pub use recording::{LifecycleState, Recorder, RecorderSettings, SessionOutcome, StopFlag};
pub use session::{RecordingSession, SessionSummary};
