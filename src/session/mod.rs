//! Recording session data model
//!
//! Exactly one `RecordingSession` is live per process. A restarted process
//! starts a new session with a new file; sessions never share state.

mod session;
mod stats;

pub use session::RecordingSession;
pub use stats::SessionSummary;
