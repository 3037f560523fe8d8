//! Task state machine states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a `GenerationTask`.
///
/// State transitions:
/// - Idle -> Submitting
/// - Submitting -> Completed (result embedded in the response)
/// - Submitting -> Pending (response carries only a task handle)
/// - Submitting -> Failed
/// - Pending/InProgress -> InProgress (progress report)
/// - Pending/InProgress -> Completed | Failed
/// - Submitting/Pending/InProgress -> Cancelled
///
/// Completed, Failed and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created locally, nothing sent yet.
    Idle,

    /// Request dispatched, waiting for the response.
    Submitting,

    /// Accepted by the service, no progress observed yet.
    Pending,

    /// Service reported that work is running.
    InProgress,

    Completed,
    Failed,

    /// Consumer lost interest. Not a failure.
    Cancelled,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Work continues on the server; the poller keeps going while this holds.
    pub fn is_active(self) -> bool {
        matches!(self, TaskState::Pending | TaskState::InProgress)
    }

    /// Can the consumer still cancel this task?
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            TaskState::Submitting | TaskState::Pending | TaskState::InProgress
        )
    }

    /// Can a retry be issued for the slot holding this task?
    pub fn is_retryable(self) -> bool {
        matches!(self, TaskState::Failed | TaskState::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Idle => "idle",
            TaskState::Submitting => "submitting",
            TaskState::Pending => "pending",
            TaskState::InProgress => "in_progress",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Determines the shape of the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// One comic or one video.
    SingleArtifact,

    /// A batch run producing one comic per topic.
    BatchArtifacts,
}
