//! Poller - ハンドルを受け取り、終端状態までステータスを問い合わせる
//!
//! # ループ
//! 1. CancellationToken を確認（キャンセル済みなら何も送らない）
//! 2. batch_status を 1 回問い合わせ（キャンセルと競合させる）
//! 3. 応答をタスクへ反映（反映直前にもう一度キャンセルを確認）
//! 4. 終端なら抜ける。そうでなければ interval（失敗時は backoff）待つ
//!
//! 一時的な失敗ではタスクを落とさない。連続失敗が上限に達したとき、
//! または全体の期限を超えたときだけ Failed にする。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::retry::RetryPolicy;
use crate::domain::{
    FailureCode, GenerationTask, Progress, RemoteId, TaskFailure, TaskResult, TaskState,
    TransitionError,
};
use crate::ports::{ApiError, BatchStatus, BatchStatusKind, Clock, GenerationApi};

/// Tunable parameters for status polling.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Delay between successful status queries.
    pub interval: Duration,

    /// Consecutive failed queries tolerated before the task is marked
    /// Failed. `0` is treated as `1`.
    pub max_consecutive_failures: u32,

    /// Delay schedule after failed queries.
    pub backoff: RetryPolicy,

    /// Hard limit on how long a task may stay active. `None` polls until a
    /// terminal status or cancellation.
    pub max_duration: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_consecutive_failures: 5,
            backoff: RetryPolicy::default(),
            max_duration: Some(Duration::from_secs(30 * 60)),
        }
    }
}

/// Why a poll loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// The task reached this terminal state.
    Finished(TaskState),

    /// The token was cancelled; the task was not touched afterwards.
    Cancelled,

    /// The task was not Pending/InProgress or had no remote id. Nothing was
    /// sent.
    NotPollable,
}

pub struct Poller {
    api: Arc<dyn GenerationApi>,
    clock: Arc<dyn Clock>,
    config: PollConfig,
}

impl Poller {
    pub fn new(api: Arc<dyn GenerationApi>, clock: Arc<dyn Clock>, config: PollConfig) -> Self {
        Self { api, clock, config }
    }

    /// Poll the task published through `task` until it is terminal or
    /// `cancel` fires.
    pub async fn run(
        &self,
        task: &watch::Sender<GenerationTask>,
        cancel: &CancellationToken,
    ) -> PollExit {
        let (local_id, remote_id) = {
            let t = task.borrow();
            match (t.state().is_active(), t.id()) {
                (true, Some(id)) => (t.local_id(), id.clone()),
                _ => return PollExit::NotPollable,
            }
        };
        let max_failures = self.config.max_consecutive_failures.max(1);
        // the deadline also bounds an in-flight query and a backoff wait
        let deadline = self.config.max_duration.map(|max| Instant::now() + max);
        let mut failures = 0u32;
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return PollExit::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return self.time_out(task, cancel, &remote_id);
            }

            attempt += 1;
            tracing::debug!(task = %local_id, remote_id = %remote_id, attempt, "Polling batch status");

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollExit::Cancelled,
                _ = until(deadline) => return self.time_out(task, cancel, &remote_id),
                r = self.api.batch_status(&remote_id) => r,
            };

            let delay = match check(response) {
                Ok(status) => {
                    failures = 0;
                    self.apply_status(task, cancel, status);
                    self.config.interval
                }
                Err(e) => {
                    failures += 1;
                    let reason = e.reason();
                    if failures >= max_failures {
                        tracing::warn!(
                            task = %local_id,
                            remote_id = %remote_id,
                            failures,
                            error = %e,
                            "Giving up on batch status",
                        );
                        let failure = TaskFailure::new(
                            format!("Lost contact with the generation service after {failures} failed status checks: {reason}"),
                            FailureCode::Unreachable,
                        );
                        self.update(task, cancel, |t, now| t.fail(failure, now).map(|_| true));
                        Duration::ZERO
                    } else {
                        let delay = self.config.backoff.next_delay(failures);
                        tracing::warn!(
                            task = %local_id,
                            remote_id = %remote_id,
                            failures,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Batch status query failed, will retry",
                        );
                        self.update(task, cancel, |t, _| t.note_poll_error(reason).map(|_| true));
                        delay
                    }
                }
            };

            if cancel.is_cancelled() || task.borrow().is_terminal() {
                return self.exit(task, cancel);
            }

            let delay = match deadline {
                Some(d) => delay.min(d.saturating_duration_since(Instant::now())),
                None => delay,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollExit::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn time_out(
        &self,
        task: &watch::Sender<GenerationTask>,
        cancel: &CancellationToken,
        remote_id: &RemoteId,
    ) -> PollExit {
        let secs = self.config.max_duration.unwrap_or_default().as_secs();
        tracing::warn!(task = %task.borrow().local_id(), remote_id = %remote_id, secs, "Polling deadline exceeded");
        let failure = TaskFailure::new(
            format!("Generation did not finish within {secs}s"),
            FailureCode::Timeout,
        );
        self.update(task, cancel, |t, now| t.fail(failure, now).map(|_| true));
        self.exit(task, cancel)
    }

    fn apply_status(
        &self,
        task: &watch::Sender<GenerationTask>,
        cancel: &CancellationToken,
        status: BatchStatus,
    ) {
        match status.status {
            BatchStatusKind::Started | BatchStatusKind::InProgress => {
                let progress = Progress::new(status.completed, status.total);
                let changed =
                    self.update(task, cancel, |t, _| t.report_progress(progress));
                if changed {
                    tracing::info!(
                        task = %task.borrow().local_id(),
                        completed = progress.completed,
                        total = progress.total,
                        "Batch progress",
                    );
                }
            }
            BatchStatusKind::Completed => {
                let count = status.comics.len();
                let result = TaskResult::batch(status.comics);
                if self.update(task, cancel, |t, now| t.complete(result, now).map(|_| true)) {
                    tracing::info!(task = %task.borrow().local_id(), count, "Batch completed");
                }
            }
            BatchStatusKind::Failed => {
                let message = status
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "Batch generation failed".to_string());
                tracing::warn!(task = %task.borrow().local_id(), error = %message, "Batch failed");
                self.update(task, cancel, |t, now| {
                    t.fail(TaskFailure::server(message), now).map(|_| true)
                });
            }
            // filtered out by `check`
            BatchStatusKind::Unknown => {}
        }
    }

    /// Apply `f` unless the token is cancelled. The check and the mutation
    /// happen under the channel's write lock, so a response that lands after
    /// cancellation is dropped. Observers are notified only when `f` reports
    /// a change.
    fn update<F>(
        &self,
        task: &watch::Sender<GenerationTask>,
        cancel: &CancellationToken,
        f: F,
    ) -> bool
    where
        F: FnOnce(&mut GenerationTask, DateTime<Utc>) -> Result<bool, TransitionError>,
    {
        let now = self.clock.now();
        task.send_if_modified(|t| {
            if cancel.is_cancelled() {
                return false;
            }
            match f(t, now) {
                Ok(changed) => changed,
                Err(e) => {
                    tracing::debug!(task = %t.local_id(), error = %e, "Dropped stale poll result");
                    false
                }
            }
        })
    }

    fn exit(&self, task: &watch::Sender<GenerationTask>, cancel: &CancellationToken) -> PollExit {
        let state = task.borrow().state();
        if state.is_terminal() {
            PollExit::Finished(state)
        } else if cancel.is_cancelled() {
            PollExit::Cancelled
        } else {
            PollExit::Finished(state)
        }
    }
}

/// Unknown statuses count as a failed query.
fn check(response: Result<BatchStatus, ApiError>) -> Result<BatchStatus, ApiError> {
    let status = response?;
    if status.status == BatchStatusKind::Unknown {
        return Err(ApiError::Decode("unknown batch status".to_string()));
    }
    Ok(status)
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
