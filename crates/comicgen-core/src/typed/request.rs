//! GenerationRequest trait - リクエスト型とタスクの形を対応付ける
//!
//! # 二層構造
//! - **表層（Typed）**: `GenerationRequest` - 型ごとに KIND と送信方法を持つ
//! - **内部（Dyn）**: `DynRequest` - object-safe。Registry がリトライ用に保持する

use async_trait::async_trait;

use crate::domain::{
    Artifact, BatchComicRequest, ComicRequest, RemoteId, TaskFailure, TaskKind, TaskResult,
    ValidationError, VideoRequest,
};
use crate::ports::{ApiError, GenerationApi, VideoStatus};

/// What a submission came back with, before it is applied to a task.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitReply {
    /// The response carried the finished result.
    Completed {
        id: Option<RemoteId>,
        result: TaskResult,
    },

    /// The response carried only a handle; the work goes on server-side.
    Accepted(RemoteId),

    /// The service answered, but said the work failed.
    Failed(TaskFailure),
}

/// A request payload that creates a `GenerationTask`.
///
/// # Trait Bounds
/// - `Clone + Send + Sync + 'static`: Registry がリトライのために Arc で保持するため
#[async_trait]
pub trait GenerationRequest: Clone + Send + Sync + 'static {
    /// Result shape of tasks created from this request.
    const KIND: TaskKind;

    /// Shown when the request fails without a server-provided detail.
    const FALLBACK_MESSAGE: &'static str;

    /// Reject obviously empty payloads before any request is made.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Issue exactly one request and classify the response.
    async fn send(&self, api: &dyn GenerationApi) -> Result<SubmitReply, ApiError>;
}

/// Object-safe view of a `GenerationRequest`.
#[async_trait]
pub trait DynRequest: Send + Sync {
    fn kind(&self) -> TaskKind;
    fn fallback_message(&self) -> &'static str;
    fn validate_dyn(&self) -> Result<(), ValidationError>;
    async fn send_dyn(&self, api: &dyn GenerationApi) -> Result<SubmitReply, ApiError>;
}

#[async_trait]
impl<R: GenerationRequest> DynRequest for R {
    fn kind(&self) -> TaskKind {
        R::KIND
    }

    fn fallback_message(&self) -> &'static str {
        R::FALLBACK_MESSAGE
    }

    fn validate_dyn(&self) -> Result<(), ValidationError> {
        GenerationRequest::validate(self)
    }

    async fn send_dyn(&self, api: &dyn GenerationApi) -> Result<SubmitReply, ApiError> {
        self.send(api).await
    }
}

#[async_trait]
impl GenerationRequest for ComicRequest {
    const KIND: TaskKind = TaskKind::SingleArtifact;
    const FALLBACK_MESSAGE: &'static str = "Failed to generate comic";

    fn validate(&self) -> Result<(), ValidationError> {
        ComicRequest::validate(self)
    }

    async fn send(&self, api: &dyn GenerationApi) -> Result<SubmitReply, ApiError> {
        let comic = api.generate_comic(self).await?;
        if comic.comic_id.trim().is_empty() {
            return Err(ApiError::Decode("comic response has no comic_id".to_string()));
        }
        Ok(SubmitReply::Completed {
            id: Some(RemoteId::new(comic.comic_id.clone())),
            result: TaskResult::single(Artifact::Comic(comic)),
        })
    }
}

#[async_trait]
impl GenerationRequest for BatchComicRequest {
    const KIND: TaskKind = TaskKind::BatchArtifacts;
    const FALLBACK_MESSAGE: &'static str = "Failed to start batch generation";

    fn validate(&self) -> Result<(), ValidationError> {
        BatchComicRequest::validate(self)
    }

    async fn send(&self, api: &dyn GenerationApi) -> Result<SubmitReply, ApiError> {
        let accepted = api.generate_batch(&self.without_blank_topics()).await?;
        if accepted.task_id.trim().is_empty() {
            return Err(ApiError::Decode("batch response has no task_id".to_string()));
        }
        Ok(SubmitReply::Accepted(RemoteId::new(accepted.task_id)))
    }
}

#[async_trait]
impl GenerationRequest for VideoRequest {
    const KIND: TaskKind = TaskKind::SingleArtifact;
    const FALLBACK_MESSAGE: &'static str = "Failed to generate video";

    fn validate(&self) -> Result<(), ValidationError> {
        VideoRequest::validate(self)
    }

    async fn send(&self, api: &dyn GenerationApi) -> Result<SubmitReply, ApiError> {
        let response = api.generate_video(self).await?;
        match response.status {
            VideoStatus::Completed => match response.video_url {
                Some(video_url) if !video_url.trim().is_empty() => Ok(SubmitReply::Completed {
                    id: None,
                    result: TaskResult::single(Artifact::Video {
                        comic_id: self.comic_id.clone(),
                        video_url,
                    }),
                }),
                _ => Ok(SubmitReply::Failed(TaskFailure::server(
                    "Video generation finished without a video URL",
                ))),
            },
            VideoStatus::Failed => {
                let message = response
                    .error
                    .or(response.message)
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Video generation failed".to_string());
                Ok(SubmitReply::Failed(TaskFailure::server(message)))
            }
            VideoStatus::Unknown => Err(ApiError::Decode(
                "video response has an unknown status".to_string(),
            )),
        }
    }
}
