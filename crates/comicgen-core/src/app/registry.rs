//! TaskRegistry - スロットごとに「現在のタスク」を 1 つだけ持つ
//!
//! # スロット
//! `create` / `batch` / `video:<comic_id>` のような論理的な置き場所。
//! 新しいタスクを start すると、前のタスクは supersede される:
//! - CancellationToken を cancel（ドライバはこれ以降一切書き込まない）
//! - まだ終端でなければ Cancelled にする
//! - スロットからは外れる（古い watch チャンネルは誰にも公開されない）
//!
//! スロットは明示的に discard するまで残る。`video:<comic_id>` のように
//! 増えていくスロットは、見る人がいなくなった時点で discard する。
//!
//! # ドライバ
//! スロットごとに 1 つ spawn する。submit -> (handle が返れば) poll。
//! 1 タスクの中の手順はすべて逐次で、並行 poll はしない。
//! supersede / discard されたドライバの JoinHandle も shutdown まで保持する。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::poller::{PollConfig, Poller};
use super::submitter::{Submitter, apply_reply};
use crate::domain::{
    GenerationTask, RemoteId, SlotId, TaskKind, TaskState, TransitionError, ValidationError,
};
use crate::observability::TaskCounts;
use crate::ports::{Clock, GenerationApi, IdGenerator};
use crate::typed::{DynRequest, GenerationRequest};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown slot: {0}")]
    UnknownSlot(SlotId),

    #[error("slot {slot} cannot be retried while its task is {state}")]
    NotRetryable { slot: SlotId, state: TaskState },

    /// The slot was resumed from a remote id, so there is no request to
    /// send again.
    #[error("slot {0} has no request to retry")]
    NothingToRetry(SlotId),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

struct Slot {
    task: Arc<watch::Sender<GenerationTask>>,
    cancel: CancellationToken,
    /// Kept for `retry`. `None` for resumed tasks.
    request: Option<Arc<dyn DynRequest>>,
    driver: JoinHandle<()>,
}

impl Slot {
    /// Stop the driver and mark the task Cancelled if it is still running.
    /// Returns whether the task changed.
    fn stop(&self, clock: &dyn Clock) -> bool {
        self.cancel.cancel();
        let now = clock.now();
        self.task.send_if_modified(|t| t.cancel(now).is_ok())
    }
}

#[derive(Default)]
struct Slots {
    current: HashMap<SlotId, Slot>,
    /// Drivers of superseded or discarded slots, awaited by `shutdown`.
    retired: Vec<JoinHandle<()>>,
}

impl Slots {
    fn retire(&mut self, slot: Slot) {
        self.retired.retain(|d| !d.is_finished());
        self.retired.push(slot.driver);
    }
}

pub struct TaskRegistry {
    submitter: Arc<Submitter>,
    poller: Arc<Poller>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    slots: Mutex<Slots>,
}

impl TaskRegistry {
    pub fn new(
        api: Arc<dyn GenerationApi>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        poll: PollConfig,
    ) -> Self {
        Self {
            submitter: Arc::new(Submitter::new(Arc::clone(&api), Arc::clone(&clock))),
            poller: Arc::new(Poller::new(api, Arc::clone(&clock), poll)),
            clock,
            ids,
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Start a new task in `slot`, superseding whatever was there.
    ///
    /// Validation happens first: an invalid request leaves the slot and its
    /// current task untouched and sends nothing.
    pub async fn start<R: GenerationRequest>(
        &self,
        slot: SlotId,
        request: R,
    ) -> Result<watch::Receiver<GenerationTask>, RegistryError> {
        GenerationRequest::validate(&request)?;
        let request: Arc<dyn DynRequest> = Arc::new(request);

        let mut slots = self.slots.lock().await;
        self.launch(&mut slots, slot, request.kind(), Some(request), None)
    }

    /// Follow a batch the service already accepted, e.g. one started by an
    /// earlier run. Nothing is submitted; the task starts Pending and is
    /// polled. Such a slot cannot be retried.
    pub async fn resume(
        &self,
        slot: SlotId,
        remote_id: RemoteId,
    ) -> Result<watch::Receiver<GenerationTask>, RegistryError> {
        let mut slots = self.slots.lock().await;
        self.launch(&mut slots, slot, TaskKind::BatchArtifacts, None, Some(remote_id))
    }

    /// Re-issue the slot's last request as a brand-new task.
    ///
    /// Only allowed once the current task is Failed or Cancelled. The old
    /// task object is left as it was.
    pub async fn retry(&self, slot: &SlotId) -> Result<watch::Receiver<GenerationTask>, RegistryError> {
        let mut slots = self.slots.lock().await;
        let current = slots
            .current
            .get(slot)
            .ok_or_else(|| RegistryError::UnknownSlot(slot.clone()))?;

        let state = current.task.borrow().state();
        if !state.is_retryable() {
            return Err(RegistryError::NotRetryable {
                slot: slot.clone(),
                state,
            });
        }
        let request = current
            .request
            .clone()
            .ok_or_else(|| RegistryError::NothingToRetry(slot.clone()))?;
        request.validate_dyn()?;

        tracing::info!(slot = %slot, previous = %current.task.borrow().local_id(), "Retrying");
        self.launch(&mut slots, slot.clone(), request.kind(), Some(request), None)
    }

    /// Cancel the slot's task. The slot keeps the Cancelled task so it can be
    /// retried. Returns whether the task was still running.
    pub async fn cancel(&self, slot: &SlotId) -> Result<bool, RegistryError> {
        let slots = self.slots.lock().await;
        let current = slots
            .current
            .get(slot)
            .ok_or_else(|| RegistryError::UnknownSlot(slot.clone()))?;

        let changed = current.stop(self.clock.as_ref());
        if changed {
            tracing::info!(slot = %slot, task = %current.task.borrow().local_id(), "Task cancelled");
        }
        Ok(changed)
    }

    /// Cancel and forget the slot. Use when nobody is watching it any more;
    /// this is the only way a slot leaves the registry before `shutdown`.
    pub async fn discard(&self, slot: &SlotId) -> bool {
        let mut slots = self.slots.lock().await;
        let removed = slots.current.remove(slot);
        match removed {
            Some(current) => {
                current.stop(self.clock.as_ref());
                slots.retire(current);
                tracing::debug!(slot = %slot, "Slot discarded");
                true
            }
            None => false,
        }
    }

    pub async fn subscribe(&self, slot: &SlotId) -> Option<watch::Receiver<GenerationTask>> {
        self.slots
            .lock()
            .await
            .current
            .get(slot)
            .map(|s| s.task.subscribe())
    }

    pub async fn snapshot(&self, slot: &SlotId) -> Option<GenerationTask> {
        self.slots
            .lock()
            .await
            .current
            .get(slot)
            .map(|s| s.task.borrow().clone())
    }

    pub async fn counts(&self) -> TaskCounts {
        let slots = self.slots.lock().await;
        slots
            .current
            .values()
            .map(|s| s.task.borrow().state())
            .collect()
    }

    /// Cancel every slot and wait for all drivers to exit, including those of
    /// superseded and discarded slots.
    pub async fn shutdown(&self) {
        let (drained, retired) = {
            let mut slots = self.slots.lock().await;
            let drained: Vec<Slot> = slots.current.drain().map(|(_, s)| s).collect();
            (drained, std::mem::take(&mut slots.retired))
        };
        tracing::info!(slots = drained.len(), retired = retired.len(), "Shutting down task registry");

        let mut drivers = retired;
        for slot in drained {
            slot.stop(self.clock.as_ref());
            drivers.push(slot.driver);
        }
        for d in drivers {
            // a panicked driver has nothing left to clean up
            let _ = d.await;
        }
    }

    fn launch(
        &self,
        slots: &mut Slots,
        slot: SlotId,
        kind: TaskKind,
        request: Option<Arc<dyn DynRequest>>,
        remote_id: Option<RemoteId>,
    ) -> Result<watch::Receiver<GenerationTask>, RegistryError> {
        let mut task = GenerationTask::new(self.ids.generate_task_id(), kind);
        task.begin_submit(self.clock.now())?;
        if let Some(id) = remote_id {
            task.accept(id)?;
        }
        let local_id = task.local_id();

        if let Some(old) = slots.current.remove(&slot) {
            if old.stop(self.clock.as_ref()) {
                tracing::info!(
                    slot = %slot,
                    task = %old.task.borrow().local_id(),
                    superseded_by = %local_id,
                    "Superseded running task",
                );
            }
            slots.retire(old);
        }

        let (tx, rx) = watch::channel(task);
        let tx = Arc::new(tx);
        let cancel = CancellationToken::new();

        let driver = tokio::spawn(drive(
            Arc::clone(&self.submitter),
            Arc::clone(&self.poller),
            Arc::clone(&self.clock),
            slot.clone(),
            Arc::clone(&tx),
            request.clone(),
            cancel.clone(),
        ));
        tracing::info!(slot = %slot, task = %local_id, ?kind, resumed = request.is_none(), "Task started");

        slots.current.insert(
            slot,
            Slot {
                task: tx,
                cancel,
                request,
                driver,
            },
        );
        Ok(rx)
    }
}

async fn drive(
    submitter: Arc<Submitter>,
    poller: Arc<Poller>,
    clock: Arc<dyn Clock>,
    slot: SlotId,
    task: Arc<watch::Sender<GenerationTask>>,
    request: Option<Arc<dyn DynRequest>>,
    cancel: CancellationToken,
) {
    if let Some(request) = request {
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(slot = %slot, "Cancelled while submitting");
                return;
            }
            reply = submitter.dispatch(request.as_ref()) => reply,
        };

        let now = clock.now();
        task.send_if_modified(|t| {
            if cancel.is_cancelled() {
                return false;
            }
            match apply_reply(t, reply, now) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(slot = %slot, error = %e, "Could not apply submit reply");
                    false
                }
            }
        });
    }

    if cancel.is_cancelled() || !task.borrow().state().is_active() {
        return;
    }
    let exit = poller.run(&task, &cancel).await;
    tracing::debug!(slot = %slot, ?exit, "Poller exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BatchComicRequest, ComicRequest, FailureCode, VideoRequest};
    use crate::impls::ScriptedApi;
    use crate::impls::scripted::comic;
    use crate::ports::{ApiError, BatchAccepted, BatchStatus, SystemClock, UlidGenerator};
    use std::time::Duration;

    fn registry(api: &Arc<ScriptedApi>) -> TaskRegistry {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        TaskRegistry::new(
            api.clone(),
            Arc::clone(&clock),
            Arc::new(UlidGenerator::new(clock)),
            PollConfig {
                interval: Duration::from_secs(2),
                max_consecutive_failures: 3,
                max_duration: None,
                ..PollConfig::default()
            },
        )
    }

    fn accepted(id: &str) -> Result<BatchAccepted, ApiError> {
        Ok(BatchAccepted {
            task_id: id.to_string(),
            status: Some("started".to_string()),
            message: None,
        })
    }

    async fn settle(rx: &mut watch::Receiver<GenerationTask>) -> GenerationTask {
        rx.wait_for(|t| t.is_terminal()).await.unwrap().clone()
    }

    #[tokio::test]
    async fn start_returns_a_submitting_task() {
        let api = Arc::new(ScriptedApi::new());
        api.hold_comic();
        let reg = registry(&api);

        let rx = reg
            .start(SlotId::create(), ComicRequest::new("robots"))
            .await
            .unwrap();

        assert_eq!(rx.borrow().state(), TaskState::Submitting);
        assert!(rx.borrow().submitted_at().is_some());
        reg.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_request_leaves_the_slot_alone() {
        let api = Arc::new(ScriptedApi::new());
        api.push_comic(Ok(comic("c1", "First")));
        let reg = registry(&api);

        let mut rx = reg
            .start(SlotId::create(), ComicRequest::new("robots"))
            .await
            .unwrap();
        let first = settle(&mut rx).await;

        let err = reg
            .start(SlotId::create(), ComicRequest::new(""))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation(ValidationError::EmptyTopic)));

        let current = reg.snapshot(&SlotId::create()).await.unwrap();
        assert_eq!(current, first);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_is_submitted_then_polled() {
        let api = Arc::new(ScriptedApi::new());
        api.push_batch_accept(accepted("batch_1"));
        api.push_status(Ok(BatchStatus::in_progress(1, 2)));
        api.push_status(Ok(BatchStatus::completed(vec![comic("a", "A"), comic("b", "B")])));
        let reg = registry(&api);

        let mut rx = reg
            .start(SlotId::batch(), BatchComicRequest::new(["space adventure", "time travel"]))
            .await
            .unwrap();
        let done = settle(&mut rx).await;

        assert_eq!(done.state(), TaskState::Completed);
        assert_eq!(done.result().unwrap().artifacts.len(), 2);
        assert_eq!(api.polled_ids(), vec!["batch_1", "batch_1"]);
    }

    #[tokio::test]
    async fn cancel_marks_task_cancelled_and_ignores_late_reply() {
        let api = Arc::new(ScriptedApi::new());
        api.hold_comic();
        let reg = registry(&api);

        let rx = reg
            .start(SlotId::create(), ComicRequest::new("robots"))
            .await
            .unwrap();
        api.wait_for_calls(1).await;

        assert!(reg.cancel(&SlotId::create()).await.unwrap());
        api.release_comic(Ok(comic("late", "Late")));
        reg.shutdown().await;

        let t = rx.borrow().clone();
        assert_eq!(t.state(), TaskState::Cancelled);
        assert!(t.result().is_none());
        assert_eq!(t.id(), None);
    }

    #[tokio::test]
    async fn cancel_of_finished_task_is_a_no_op() {
        let api = Arc::new(ScriptedApi::new());
        api.push_comic(Ok(comic("c1", "Done")));
        let reg = registry(&api);

        let mut rx = reg
            .start(SlotId::create(), ComicRequest::new("robots"))
            .await
            .unwrap();
        settle(&mut rx).await;

        assert!(!reg.cancel(&SlotId::create()).await.unwrap());
        assert_eq!(rx.borrow().state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn unknown_slot_is_reported() {
        let api = Arc::new(ScriptedApi::new());
        let reg = registry(&api);

        let err = reg.cancel(&SlotId::batch()).await.unwrap_err();
        assert!(matches!(err, RegistryError::UnknownSlot(s) if s == SlotId::batch()));
        assert!(reg.retry(&SlotId::batch()).await.is_err());
        assert!(!reg.discard(&SlotId::batch()).await);
    }

    #[tokio::test]
    async fn retry_creates_a_new_task_from_the_remembered_request() {
        let api = Arc::new(ScriptedApi::new());
        api.push_video(Ok(crate::ports::VideoResponse::failed(Some(
            "Veo quota exhausted".to_string(),
        ))));
        api.push_video(Ok(crate::ports::VideoResponse::completed("/videos/c1.mp4")));
        let reg = registry(&api);
        let slot = SlotId::video("c1");

        let mut rx = reg.start(slot.clone(), VideoRequest::new("c1")).await.unwrap();
        let failed = settle(&mut rx).await;
        assert_eq!(failed.state(), TaskState::Failed);
        assert_eq!(failed.error().unwrap().code, Some(FailureCode::ServerFailed));

        let mut rx2 = reg.retry(&slot).await.unwrap();
        let done = settle(&mut rx2).await;

        assert_eq!(done.state(), TaskState::Completed);
        assert_ne!(done.local_id(), failed.local_id());
        // the old task object is untouched
        assert_eq!(rx.borrow().state(), TaskState::Failed);
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn retry_is_refused_while_running() {
        let api = Arc::new(ScriptedApi::new());
        api.hold_comic();
        let reg = registry(&api);

        reg.start(SlotId::create(), ComicRequest::new("robots"))
            .await
            .unwrap();

        let err = reg.retry(&SlotId::create()).await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::NotRetryable { state: TaskState::Submitting, .. }
        ));
        reg.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn counts_reflect_every_slot() {
        let api = Arc::new(ScriptedApi::new());
        api.push_comic(Ok(comic("c1", "Done")));
        api.push_video(Err(ApiError::Network("down".to_string())));
        let reg = registry(&api);

        let mut a = reg
            .start(SlotId::create(), ComicRequest::new("robots"))
            .await
            .unwrap();
        let mut b = reg.start(SlotId::video("c1"), VideoRequest::new("c1")).await.unwrap();
        settle(&mut a).await;
        settle(&mut b).await;

        let counts = reg.counts().await;
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 2);
    }

    #[tokio::test]
    async fn discard_removes_the_slot() {
        let api = Arc::new(ScriptedApi::new());
        api.hold_comic();
        let reg = registry(&api);

        let rx = reg
            .start(SlotId::create(), ComicRequest::new("robots"))
            .await
            .unwrap();
        assert!(reg.discard(&SlotId::create()).await);

        assert_eq!(rx.borrow().state(), TaskState::Cancelled);
        assert!(reg.subscribe(&SlotId::create()).await.is_none());
        assert_eq!(reg.counts().await.total(), 0);
    }

    #[tokio::test]
    async fn cancelled_task_can_be_retried() {
        let api = Arc::new(ScriptedApi::new());
        api.hold_comic();
        let reg = registry(&api);

        let mut first = reg
            .start(SlotId::create(), ComicRequest::new("robots"))
            .await
            .unwrap();
        api.wait_for_calls(1).await;
        assert!(reg.cancel(&SlotId::create()).await.unwrap());
        let cancelled = settle(&mut first).await;
        assert_eq!(cancelled.state(), TaskState::Cancelled);

        api.push_comic(Ok(comic("c2", "Second try")));
        let mut second = reg.retry(&SlotId::create()).await.unwrap();
        let done = settle(&mut second).await;

        assert_eq!(done.state(), TaskState::Completed);
        assert_ne!(done.local_id(), cancelled.local_id());
        assert_eq!(api.calls(), 2);
        assert_eq!(first.borrow().state(), TaskState::Cancelled);
    }

    #[tokio::test]
    async fn shutdown_waits_for_superseded_and_discarded_drivers() {
        let api = Arc::new(ScriptedApi::new());
        api.hold_comic();
        api.hold_video();
        let reg = registry(&api);

        let old = reg
            .start(SlotId::create(), ComicRequest::new("robots"))
            .await
            .unwrap();
        let video = reg.start(SlotId::video("c1"), VideoRequest::new("c1")).await.unwrap();
        api.push_comic(Ok(comic("c2", "Newer")));
        reg.start(SlotId::create(), ComicRequest::new("robots, again"))
            .await
            .unwrap();
        assert!(reg.discard(&SlotId::video("c1")).await);
        assert_eq!(reg.slots.lock().await.retired.len(), 2);

        reg.shutdown().await;

        assert!(reg.slots.lock().await.retired.is_empty());
        // drivers are gone, so nothing holds the senders any more
        assert!(old.has_changed().is_err());
        assert!(video.has_changed().is_err());
        assert_eq!(old.borrow().state(), TaskState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn resumed_batch_is_polled_without_submitting() {
        let api = Arc::new(ScriptedApi::new());
        api.push_status(Ok(BatchStatus::completed(vec![comic("a", "A")])));
        let reg = registry(&api);

        let mut rx = reg
            .resume(SlotId::batch(), RemoteId::new("batch_earlier"))
            .await
            .unwrap();
        let done = settle(&mut rx).await;

        assert_eq!(done.state(), TaskState::Completed);
        assert_eq!(done.id(), Some(&RemoteId::new("batch_earlier")));
        assert_eq!(api.calls(), 0);
        assert_eq!(api.polled_ids(), vec!["batch_earlier"]);
    }

    #[tokio::test(start_paused = true)]
    async fn resumed_batch_has_nothing_to_retry() {
        let api = Arc::new(ScriptedApi::new());
        api.push_status(Ok(BatchStatus::failed("Gemini returned no script")));
        let reg = registry(&api);

        let mut rx = reg
            .resume(SlotId::batch(), RemoteId::new("batch_earlier"))
            .await
            .unwrap();
        assert_eq!(settle(&mut rx).await.state(), TaskState::Failed);

        let err = reg.retry(&SlotId::batch()).await.unwrap_err();
        assert!(matches!(err, RegistryError::NothingToRetry(s) if s == SlotId::batch()));
    }
}
