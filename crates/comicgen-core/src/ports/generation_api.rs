//! GenerationApi port - コミック生成サービスへの入口
//!
//! Submitter / Poller はこの trait だけを見る。
//! 本番は `impls::http::HttpGenerationApi`（reqwest）、
//! テストとオフライン実行は `impls::scripted::ScriptedApi`。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{BatchComicRequest, ComicRequest, ComicSummary, RemoteId, VideoRequest};

/// Transport-level failure of one request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request never got a response (DNS, connect, timeout, ...).
    #[error("request failed: {0}")]
    Network(String),

    /// The service answered with a non-2xx status. `body` is kept for
    /// debugging but never shown: it may be an HTML error page.
    #[error("service error ({status})")]
    Status {
        status: u16,
        /// `detail` from a FastAPI-style error body, if there was one.
        detail: Option<String>,
        body: String,
    },

    /// 2xx, but the body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Build a `Status` error, pulling `detail` out of the body when it is
    /// `{"detail": "..."}` or a validation error list.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| match v.get("detail") {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(serde_json::Value::Array(items)) => items
                    .first()
                    .and_then(|i| i.get("msg"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string),
                _ => None,
            })
            .filter(|d| !d.trim().is_empty());
        ApiError::Status {
            status,
            detail,
            body,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// Short cause for logs and poll errors: the server's detail when present,
    /// otherwise the error without any response body.
    pub fn reason(&self) -> String {
        match self.detail() {
            Some(detail) => detail.to_string(),
            None => self.to_string(),
        }
    }

    /// Message to show the user: the server's detail text when present,
    /// otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        self.detail().unwrap_or(fallback).to_string()
    }
}

/// Response of `POST /comics/generate/batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAccepted {
    pub task_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatusKind {
    Started,
    InProgress,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Response of `GET /comics/batch/{task_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub status: BatchStatusKind,

    #[serde(default)]
    pub total: u32,

    #[serde(default)]
    pub completed: u32,

    #[serde(default)]
    pub comics: Vec<ComicSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchStatus {
    pub fn started(total: u32) -> Self {
        Self {
            status: BatchStatusKind::Started,
            total,
            completed: 0,
            comics: Vec::new(),
            error: None,
        }
    }

    pub fn in_progress(completed: u32, total: u32) -> Self {
        Self {
            status: BatchStatusKind::InProgress,
            completed,
            ..Self::started(total)
        }
    }

    pub fn completed(comics: Vec<ComicSummary>) -> Self {
        let n = comics.len() as u32;
        Self {
            status: BatchStatusKind::Completed,
            total: n,
            completed: n,
            comics,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: BatchStatusKind::Failed,
            error: Some(error.into()),
            ..Self::started(0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Response of `POST /comics/{id}/generate-video`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoResponse {
    pub status: VideoStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VideoResponse {
    pub fn completed(video_url: impl Into<String>) -> Self {
        Self {
            status: VideoStatus::Completed,
            video_url: Some(video_url.into()),
            message: None,
            error: None,
        }
    }

    pub fn failed(error: Option<String>) -> Self {
        Self {
            status: VideoStatus::Failed,
            video_url: None,
            message: None,
            error,
        }
    }
}

/// The comic service as seen by the tracker.
///
/// Each method issues exactly one request; retrying is the caller's call.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    /// Generate one comic synchronously; the response is the finished comic.
    async fn generate_comic(&self, request: &ComicRequest) -> Result<ComicSummary, ApiError>;

    /// Start a batch; the response is only a handle.
    async fn generate_batch(&self, request: &BatchComicRequest)
    -> Result<BatchAccepted, ApiError>;

    async fn batch_status(&self, task_id: &RemoteId) -> Result<BatchStatus, ApiError>;

    async fn generate_video(&self, request: &VideoRequest) -> Result<VideoResponse, ApiError>;

    async fn list_comics(&self) -> Result<Vec<ComicSummary>, ApiError>;

    async fn get_comic(&self, comic_id: &str) -> Result<ComicSummary, ApiError>;

    /// The comic's script as stored by the service (free-form JSON).
    async fn get_script(&self, comic_id: &str) -> Result<serde_json::Value, ApiError>;
}
