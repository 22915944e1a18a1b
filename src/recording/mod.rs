//! Session lifecycle
//!
//! `Recorder` wires the device selector, frame source and WAV writer
//! together and drives `Starting -> Capturing -> Finalizing -> Stopped`,
//! with `Failed` reachable from any live state.

mod controller;
mod state;
mod stop;

pub use controller::{
    Recorder, RecorderSettings, SessionOutcome, EXIT_CONTAINER_FULL, EXIT_FAILURE, EXIT_OK,
    EXIT_SESSION_ABORTED,
};
pub use state::LifecycleState;
pub use stop::StopFlag;
