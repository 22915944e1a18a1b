use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Starting,
    Capturing,
    Finalizing,
    Stopped,
    Failed,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        match (self, next) {
            (Starting, Capturing) | (Capturing, Finalizing) => true,
            (Finalizing, Stopped) => true,
            // A stop request that arrives before the device is open ends the run
            // without a file.
            (Starting, Stopped) => true,
            (Stopped, _) | (Failed, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "Starting",
            LifecycleState::Capturing => "Capturing",
            LifecycleState::Finalizing => "Finalizing",
            LifecycleState::Stopped => "Stopped",
            LifecycleState::Failed => "Failed",
        };
        f.write_str(name)
    }
}
