//! GenerationTask: one request for generated content, and the only place its
//! state changes.
//!
//! Fields are private. Every mutation is a transition method that checks the
//! current state first, which keeps these invariants:
//! - `result` is set iff the state is Completed
//! - `error` is set iff the state is Failed
//! - the remote id is assigned at most once
//! - nothing leaves a terminal state

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::errors::TaskFailure;
use super::ids::{RemoteId, TaskId};
use super::outcome::{Progress, TaskResult};
use super::state::{TaskKind, TaskState};

/// Event fed into the state machine. Only used to describe rejected
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    Submit,
    Accept,
    Progress,
    Complete,
    Fail,
    Cancel,
    AssignId,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot apply {event:?} to a task in state {from}")]
    InvalidTransition { from: TaskState, event: TaskEvent },

    #[error("task already has remote id {existing}")]
    IdAlreadyAssigned { existing: RemoteId },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationTask {
    local_id: TaskId,
    id: Option<RemoteId>,
    kind: TaskKind,
    state: TaskState,
    progress: Option<Progress>,
    result: Option<TaskResult>,
    error: Option<TaskFailure>,
    last_poll_error: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
}

impl GenerationTask {
    pub fn new(local_id: TaskId, kind: TaskKind) -> Self {
        Self {
            local_id,
            id: None,
            kind,
            state: TaskState::Idle,
            progress: None,
            result: None,
            error: None,
            last_poll_error: None,
            submitted_at: None,
            resolved_at: None,
        }
    }

    pub fn local_id(&self) -> TaskId {
        self.local_id
    }

    pub fn id(&self) -> Option<&RemoteId> {
        self.id.as_ref()
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn progress(&self) -> Option<Progress> {
        self.progress
    }

    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&TaskFailure> {
        self.error.as_ref()
    }

    /// Most recent transient status-query error, while still active.
    pub fn last_poll_error(&self) -> Option<&str> {
        self.last_poll_error.as_deref()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn reject(&self, event: TaskEvent) -> TransitionError {
        TransitionError::InvalidTransition {
            from: self.state,
            event,
        }
    }

    /// Idle -> Submitting.
    pub fn begin_submit(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.state != TaskState::Idle {
            return Err(self.reject(TaskEvent::Submit));
        }
        self.state = TaskState::Submitting;
        self.submitted_at = Some(now);
        Ok(())
    }

    /// Record the id the service gave this task.
    ///
    /// Assigning the same id twice is a no-op; a different one is an error.
    pub fn assign_id(&mut self, id: RemoteId) -> Result<(), TransitionError> {
        if self.state.is_terminal() || self.state == TaskState::Idle {
            return Err(self.reject(TaskEvent::AssignId));
        }
        match &self.id {
            Some(existing) if *existing == id => Ok(()),
            Some(existing) => Err(TransitionError::IdAlreadyAssigned {
                existing: existing.clone(),
            }),
            None => {
                self.id = Some(id);
                Ok(())
            }
        }
    }

    /// Submitting -> Pending: the service accepted the work and handed back
    /// a handle.
    pub fn accept(&mut self, id: RemoteId) -> Result<(), TransitionError> {
        if self.state != TaskState::Submitting {
            return Err(self.reject(TaskEvent::Accept));
        }
        self.assign_id(id)?;
        self.state = TaskState::Pending;
        Ok(())
    }

    /// Pending/InProgress -> InProgress.
    ///
    /// Returns whether anything observable changed.
    pub fn report_progress(&mut self, progress: Progress) -> Result<bool, TransitionError> {
        if !self.state.is_active() {
            return Err(self.reject(TaskEvent::Progress));
        }
        let changed = self.state != TaskState::InProgress
            || self.progress != Some(progress)
            || self.last_poll_error.is_some();
        self.state = TaskState::InProgress;
        self.progress = Some(progress);
        self.last_poll_error = None;
        Ok(changed)
    }

    /// Remember a transient poll error without failing the task.
    pub fn note_poll_error(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        if !self.state.is_active() {
            return Err(self.reject(TaskEvent::Progress));
        }
        self.last_poll_error = Some(message.into());
        Ok(())
    }

    /// Submitting/Pending/InProgress -> Completed.
    pub fn complete(
        &mut self,
        result: TaskResult,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !(self.state == TaskState::Submitting || self.state.is_active()) {
            return Err(self.reject(TaskEvent::Complete));
        }
        self.resolve(TaskState::Completed, now);
        self.result = Some(result);
        Ok(())
    }

    /// Submitting/Pending/InProgress -> Failed.
    pub fn fail(&mut self, failure: TaskFailure, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !(self.state == TaskState::Submitting || self.state.is_active()) {
            return Err(self.reject(TaskEvent::Fail));
        }
        self.resolve(TaskState::Failed, now);
        self.error = Some(failure);
        Ok(())
    }

    /// Submitting/Pending/InProgress -> Cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.state.is_cancellable() {
            return Err(self.reject(TaskEvent::Cancel));
        }
        self.resolve(TaskState::Cancelled, now);
        Ok(())
    }

    fn resolve(&mut self, state: TaskState, now: DateTime<Utc>) {
        self.state = state;
        self.progress = None;
        self.last_poll_error = None;
        self.resolved_at = Some(now);
    }
}
