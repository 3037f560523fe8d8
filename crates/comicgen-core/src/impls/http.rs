//! HttpGenerationApi - reqwest で実サービスを叩く GenerationApi
//!
//! - base URL は末尾の `/` を落として保持（例: `http://localhost:8000/api`）
//! - 非 2xx は本文を読んで `ApiError::from_status`（FastAPI の `detail` を拾う）
//! - 2xx で形が違えば `ApiError::Decode`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::domain::{BatchComicRequest, ComicRequest, ComicSummary, RemoteId, VideoRequest};
use crate::ports::{ApiError, BatchAccepted, BatchStatus, GenerationApi, VideoResponse};

/// `GET /comics` has answered both as a bare list and wrapped in `comics`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ComicList {
    Wrapped { comics: Vec<ComicSummary> },
    Bare(Vec<ComicSummary>),
}

#[derive(Clone)]
pub struct HttpGenerationApi {
    client: Client,
    base_url: String,
}

impl HttpGenerationApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(network)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::new(&config.api_url, config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the comic's rendered image. No request is made.
    pub fn image_url(&self, comic_id: &str) -> String {
        format!("{}/comics/{}/image", self.base_url, comic_id)
    }

    /// `GET /health`. Short timeout: this is a liveness probe, not generation.
    pub async fn health(&self) -> Result<serde_json::Value, ApiError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(network)?;
        read_json(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        tracing::debug!(path, "GET");
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(network)?;
        read_json(response).await
    }

    async fn post<B, T>(&self, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(path, "POST");
        let mut request = self.client.post(format!("{}{}", self.base_url, path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(network)?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await.map_err(network)?;

    if !status.is_success() {
        return Err(ApiError::from_status(status.as_u16(), body));
    }
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

fn network(e: reqwest::Error) -> ApiError {
    ApiError::Network(e.to_string())
}

#[async_trait]
impl GenerationApi for HttpGenerationApi {
    async fn generate_comic(&self, request: &ComicRequest) -> Result<ComicSummary, ApiError> {
        self.post("/comics/generate", Some(request)).await
    }

    async fn generate_batch(
        &self,
        request: &BatchComicRequest,
    ) -> Result<BatchAccepted, ApiError> {
        self.post("/comics/generate/batch", Some(request)).await
    }

    async fn batch_status(&self, task_id: &RemoteId) -> Result<BatchStatus, ApiError> {
        self.get(&format!("/comics/batch/{task_id}")).await
    }

    async fn generate_video(&self, request: &VideoRequest) -> Result<VideoResponse, ApiError> {
        let path = format!("/comics/{}/generate-video", request.comic_id);
        self.post::<(), _>(&path, None).await
    }

    async fn list_comics(&self) -> Result<Vec<ComicSummary>, ApiError> {
        let list: ComicList = self.get("/comics").await?;
        Ok(match list {
            ComicList::Wrapped { comics } | ComicList::Bare(comics) => comics,
        })
    }

    async fn get_comic(&self, comic_id: &str) -> Result<ComicSummary, ApiError> {
        self.get(&format!("/comics/{comic_id}")).await
    }

    async fn get_script(&self, comic_id: &str) -> Result<serde_json::Value, ApiError> {
        self.get(&format!("/comics/{comic_id}/script")).await
    }
}
