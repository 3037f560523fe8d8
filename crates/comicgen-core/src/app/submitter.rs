//! Submitter - 1 回だけリクエストを送り、結果を状態機械に写す
//!
//! # フロー
//! 1. validate（空入力なら送らない。タスクは Idle のまま）
//! 2. Idle -> Submitting
//! 3. GenerationApi に 1 リクエスト
//! 4. 結果で Completed / Pending / Failed へ
//!
//! 暗黙のリトライはしない。リトライは新しいタスクを作る呼び出し側の判断。

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{GenerationTask, TaskFailure, TransitionError, ValidationError};
use crate::ports::{Clock, GenerationApi};
use crate::typed::{DynRequest, GenerationRequest, SubmitReply};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

pub struct Submitter {
    api: Arc<dyn GenerationApi>,
    clock: Arc<dyn Clock>,
}

impl Submitter {
    pub fn new(api: Arc<dyn GenerationApi>, clock: Arc<dyn Clock>) -> Self {
        Self { api, clock }
    }

    /// Validate, dispatch and apply the outcome to `task`, which must be
    /// Idle.
    ///
    /// On a validation error nothing is sent and the task is left untouched.
    /// Transport and server failures are not errors here: they end up as a
    /// Failed task.
    pub async fn submit<R: GenerationRequest>(
        &self,
        task: &mut GenerationTask,
        request: &R,
    ) -> Result<(), SubmitError> {
        GenerationRequest::validate(request)?;
        task.begin_submit(self.clock.now())?;

        let reply = self.dispatch(request).await;
        apply_reply(task, reply, self.clock.now())?;
        Ok(())
    }

    /// Issue exactly one request. Transport errors become a `Failed` reply
    /// carrying the user-facing message.
    pub async fn dispatch(&self, request: &dyn DynRequest) -> SubmitReply {
        match request.send_dyn(self.api.as_ref()).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(kind = ?request.kind(), error = %e, "Generation request failed");
                SubmitReply::Failed(TaskFailure::transport(
                    e.user_message(request.fallback_message()),
                ))
            }
        }
    }
}

/// Map a submission reply onto a Submitting task.
pub fn apply_reply(
    task: &mut GenerationTask,
    reply: SubmitReply,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    match reply {
        SubmitReply::Completed { id, result } => {
            if let Some(id) = id {
                task.assign_id(id)?;
            }
            task.complete(result, now)?;
            tracing::info!(task = %task.local_id(), remote_id = ?task.id(), "Generation completed");
        }
        SubmitReply::Accepted(id) => {
            task.accept(id)?;
            tracing::info!(task = %task.local_id(), remote_id = ?task.id(), "Generation accepted");
        }
        SubmitReply::Failed(failure) => {
            tracing::warn!(task = %task.local_id(), error = %failure, "Generation failed");
            task.fail(failure, now)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BatchComicRequest, ComicRequest, FailureCode, RemoteId, TaskId, TaskKind, TaskState,
        VideoRequest,
    };
    use crate::impls::ScriptedApi;
    use crate::impls::scripted::comic;
    use crate::ports::{ApiError, BatchAccepted, FixedClock, VideoResponse};
    use chrono::TimeZone;
    use ulid::Ulid;

    fn fixture() -> (Arc<ScriptedApi>, Submitter) {
        let api = Arc::new(ScriptedApi::new());
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let submitter = Submitter::new(api.clone(), Arc::new(FixedClock::new(at)));
        (api, submitter)
    }

    fn task(kind: TaskKind) -> GenerationTask {
        GenerationTask::new(TaskId::from_ulid(Ulid::new()), kind)
    }

    #[tokio::test]
    async fn comic_with_embedded_result_completes() {
        let (api, submitter) = fixture();
        api.push_comic(Ok(comic("c1", "A Robot Learns to Paint")));

        let mut t = task(TaskKind::SingleArtifact);
        submitter
            .submit(&mut t, &ComicRequest::new("a robot learning to paint"))
            .await
            .unwrap();

        assert_eq!(t.state(), TaskState::Completed);
        assert_eq!(t.id(), Some(&RemoteId::new("c1")));
        assert_eq!(t.result().unwrap().artifacts[0].comic_id(), "c1");
        assert!(t.submitted_at().is_some());
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn empty_topic_sends_nothing_and_stays_idle() {
        let (api, submitter) = fixture();

        let mut t = task(TaskKind::SingleArtifact);
        let err = submitter
            .submit(&mut t, &ComicRequest::new("   "))
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::Validation(ValidationError::EmptyTopic)));
        assert_eq!(t.state(), TaskState::Idle);
        assert_eq!(t.submitted_at(), None);
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn batch_with_only_blank_topics_sends_nothing() {
        let (api, submitter) = fixture();

        let mut t = task(TaskKind::BatchArtifacts);
        let err = submitter
            .submit(&mut t, &BatchComicRequest::new(["", " \t"]))
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::Validation(ValidationError::NoTopics)));
        assert_eq!(t.state(), TaskState::Idle);
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn batch_handle_moves_to_pending() {
        let (api, submitter) = fixture();
        api.push_batch_accept(Ok(BatchAccepted {
            task_id: "batch_20250601_090000".to_string(),
            status: Some("started".to_string()),
            message: Some("Batch generation started".to_string()),
        }));

        let mut t = task(TaskKind::BatchArtifacts);
        submitter
            .submit(&mut t, &BatchComicRequest::new(["space adventure"]))
            .await
            .unwrap();

        assert_eq!(t.state(), TaskState::Pending);
        assert_eq!(t.id(), Some(&RemoteId::new("batch_20250601_090000")));
        assert!(t.result().is_none());
    }

    #[tokio::test]
    async fn transport_failure_prefers_server_detail() {
        let (api, submitter) = fixture();
        api.push_comic(Err(ApiError::from_status(
            500,
            r#"{"detail": "Failed to generate comic: Imagen quota exceeded"}"#,
        )));

        let mut t = task(TaskKind::SingleArtifact);
        submitter
            .submit(&mut t, &ComicRequest::new("climate hero"))
            .await
            .unwrap();

        assert_eq!(t.state(), TaskState::Failed);
        let err = t.error().unwrap();
        assert_eq!(err.message, "Failed to generate comic: Imagen quota exceeded");
        assert_eq!(err.code, Some(FailureCode::Transport));
    }

    #[tokio::test]
    async fn network_failure_falls_back_to_generic_message() {
        let (api, submitter) = fixture();
        api.push_batch_accept(Err(ApiError::Network("connection refused".to_string())));

        let mut t = task(TaskKind::BatchArtifacts);
        submitter
            .submit(&mut t, &BatchComicRequest::new(["time travel"]))
            .await
            .unwrap();

        assert_eq!(t.state(), TaskState::Failed);
        assert_eq!(t.error().unwrap().message, "Failed to start batch generation");
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn video_completed_embeds_url() {
        let (api, submitter) = fixture();
        api.push_video(Ok(VideoResponse::completed("/videos/c1/final.mp4")));

        let mut t = task(TaskKind::SingleArtifact);
        submitter.submit(&mut t, &VideoRequest::new("c1")).await.unwrap();

        assert_eq!(t.state(), TaskState::Completed);
        assert_eq!(t.id(), None);
        assert!(matches!(
            &t.result().unwrap().artifacts[0],
            crate::domain::Artifact::Video { video_url, .. } if video_url == "/videos/c1/final.mp4"
        ));
    }

    #[tokio::test]
    async fn submitting_a_used_task_is_rejected() {
        let (api, submitter) = fixture();
        api.push_comic(Ok(comic("c1", "T")));

        let mut t = task(TaskKind::SingleArtifact);
        submitter.submit(&mut t, &ComicRequest::new("x")).await.unwrap();
        let err = submitter
            .submit(&mut t, &ComicRequest::new("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::Transition(_)));
        assert_eq!(api.calls(), 1);
    }
}
