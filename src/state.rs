//! Capture lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the capture pipeline.
///
/// `Stopped` and `Errored` are passed through on the way back to `Idle`;
/// teardown has already finished when either is reported. `Acquiring` goes
/// straight back to `Idle` when a start is abandoned before it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Idle,
    Acquiring,
    Listening,
    Stopped,
    Errored,
}

impl LifecycleState {
    pub fn is_listening(self) -> bool {
        self == LifecycleState::Listening
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, Acquiring)
                | (Acquiring, Listening)
                | (Acquiring, Errored)
                | (Acquiring, Idle)
                | (Listening, Stopped)
                | (Stopped, Idle)
                | (Errored, Idle)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Acquiring => "acquiring",
            LifecycleState::Listening => "listening",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Errored => "errored",
        };
        f.write_str(name)
    }
}
