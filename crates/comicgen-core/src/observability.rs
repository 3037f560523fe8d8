use serde::{Deserialize, Serialize};

use crate::domain::TaskState;

/// Number of tracked tasks per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub idle: usize,
    pub submitting: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl TaskCounts {
    pub fn record(&mut self, state: TaskState) {
        let slot = match state {
            TaskState::Idle => &mut self.idle,
            TaskState::Submitting => &mut self.submitting,
            TaskState::Pending => &mut self.pending,
            TaskState::InProgress => &mut self.in_progress,
            TaskState::Completed => &mut self.completed,
            TaskState::Failed => &mut self.failed,
            TaskState::Cancelled => &mut self.cancelled,
        };
        *slot += 1;
    }

    /// Submitting, Pending or InProgress.
    pub fn running(&self) -> usize {
        self.submitting + self.pending + self.in_progress
    }

    pub fn total(&self) -> usize {
        self.idle + self.running() + self.completed + self.failed + self.cancelled
    }
}

impl FromIterator<TaskState> for TaskCounts {
    fn from_iter<I: IntoIterator<Item = TaskState>>(iter: I) -> Self {
        let mut counts = Self::default();
        for state in iter {
            counts.record(state);
        }
        counts
    }
}
