//! ScriptedApi - 事前に積んだ応答を順番に返す GenerationApi
//!
//! テストとオフラインのデモ用。
//! - エンドポイントごとに FIFO で応答を積む（push_*）
//! - キューが空なら `ApiError::Network` を返す
//! - hold_* を積むと、その呼び出しは release_* されるまで返らない（in-flight の再現）

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{Notify, oneshot};

use crate::domain::{BatchComicRequest, ComicRequest, ComicSummary, RemoteId, VideoRequest};
use crate::ports::{ApiError, BatchAccepted, BatchStatus, GenerationApi, VideoResponse};

type Reply<T> = Result<T, ApiError>;

enum Step<T> {
    Ready(Reply<T>),
    Hold,
}

/// One endpoint's script plus the sender of a held call, if any.
struct Script<T> {
    steps: VecDeque<Step<T>>,
    held: Option<oneshot::Sender<Reply<T>>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            steps: VecDeque::new(),
            held: None,
        }
    }
}

#[derive(Default)]
struct State {
    comics: Script<ComicSummary>,
    batches: Script<BatchAccepted>,
    statuses: Script<BatchStatus>,
    videos: Script<VideoResponse>,
    library: BTreeMap<String, ComicSummary>,
    scripts: BTreeMap<String, serde_json::Value>,

    submit_calls: usize,
    status_calls: usize,
    sent_batches: Vec<BatchComicRequest>,
    polled_ids: Vec<String>,
}

#[derive(Default)]
pub struct ScriptedApi {
    state: Mutex<State>,
    called: Notify,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // a panicking test thread must not hide the script from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_comic(&self, reply: Reply<ComicSummary>) {
        self.state().comics.steps.push_back(Step::Ready(reply));
    }

    pub fn hold_comic(&self) {
        self.state().comics.steps.push_back(Step::Hold);
    }

    pub fn release_comic(&self, reply: Reply<ComicSummary>) {
        release(&mut self.state().comics, reply);
    }

    pub fn push_batch_accept(&self, reply: Reply<BatchAccepted>) {
        self.state().batches.steps.push_back(Step::Ready(reply));
    }

    pub fn push_status(&self, reply: Reply<BatchStatus>) {
        self.state().statuses.steps.push_back(Step::Ready(reply));
    }

    pub fn hold_status(&self) {
        self.state().statuses.steps.push_back(Step::Hold);
    }

    pub fn release_status(&self, reply: Reply<BatchStatus>) {
        release(&mut self.state().statuses, reply);
    }

    pub fn push_video(&self, reply: Reply<VideoResponse>) {
        self.state().videos.steps.push_back(Step::Ready(reply));
    }

    pub fn hold_video(&self) {
        self.state().videos.steps.push_back(Step::Hold);
    }

    /// Add a comic to what `list_comics` / `get_comic` return.
    pub fn add_comic(&self, comic: ComicSummary) {
        self.state().library.insert(comic.comic_id.clone(), comic);
    }

    pub fn add_script(&self, comic_id: impl Into<String>, script: serde_json::Value) {
        self.state().scripts.insert(comic_id.into(), script);
    }

    /// Submit requests made so far (comic, batch and video).
    pub fn calls(&self) -> usize {
        self.state().submit_calls
    }

    pub fn status_calls(&self) -> usize {
        self.state().status_calls
    }

    pub fn sent_batches(&self) -> Vec<BatchComicRequest> {
        self.state().sent_batches.clone()
    }

    /// Remote ids passed to `batch_status`, in call order.
    pub fn polled_ids(&self) -> Vec<String> {
        self.state().polled_ids.clone()
    }

    /// Wait until at least `n` submit requests have been made.
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let notified = self.called.notified();
            if self.calls() >= n {
                return;
            }
            notified.await;
        }
    }

    async fn next<T>(&self, pick: impl FnOnce(&mut State) -> &mut Script<T>) -> Reply<T> {
        let rx = {
            let mut state = self.state();
            let script = pick(&mut state);
            match script.steps.pop_front() {
                Some(Step::Ready(reply)) => return reply,
                None => {
                    return Err(ApiError::Network("no scripted response".to_string()));
                }
                Some(Step::Hold) => {
                    let (tx, rx) = oneshot::channel();
                    script.held = Some(tx);
                    rx
                }
            }
        };
        rx.await
            .unwrap_or_else(|_| Err(ApiError::Network("held call was abandoned".to_string())))
    }

    fn record_submit(&self) {
        self.state().submit_calls += 1;
        self.called.notify_waiters();
    }
}

fn release<T>(script: &mut Script<T>, reply: Reply<T>) {
    match script.held.take() {
        // the caller may already have given up
        Some(tx) => {
            let _ = tx.send(reply);
        }
        None => script.steps.push_front(Step::Ready(reply)),
    }
}

#[async_trait]
impl GenerationApi for ScriptedApi {
    async fn generate_comic(&self, _request: &ComicRequest) -> Result<ComicSummary, ApiError> {
        self.record_submit();
        self.next(|s| &mut s.comics).await
    }

    async fn generate_batch(
        &self,
        request: &BatchComicRequest,
    ) -> Result<BatchAccepted, ApiError> {
        self.state().sent_batches.push(request.clone());
        self.record_submit();
        self.next(|s| &mut s.batches).await
    }

    async fn batch_status(&self, task_id: &RemoteId) -> Result<BatchStatus, ApiError> {
        {
            let mut state = self.state();
            state.status_calls += 1;
            state.polled_ids.push(task_id.as_str().to_string());
        }
        self.next(|s| &mut s.statuses).await
    }

    async fn generate_video(&self, _request: &VideoRequest) -> Result<VideoResponse, ApiError> {
        self.record_submit();
        self.next(|s| &mut s.videos).await
    }

    async fn list_comics(&self) -> Result<Vec<ComicSummary>, ApiError> {
        Ok(self.state().library.values().cloned().collect())
    }

    async fn get_comic(&self, comic_id: &str) -> Result<ComicSummary, ApiError> {
        self.state()
            .library
            .get(comic_id)
            .cloned()
            .ok_or_else(|| not_found("Comic not found"))
    }

    async fn get_script(&self, comic_id: &str) -> Result<serde_json::Value, ApiError> {
        self.state()
            .scripts
            .get(comic_id)
            .cloned()
            .ok_or_else(|| not_found("Script not found"))
    }
}

fn not_found(detail: &str) -> ApiError {
    ApiError::from_status(404, serde_json::json!({ "detail": detail }).to_string())
}

/// A minimal finished comic, as the service would return it.
pub fn comic(id: &str, title: &str) -> ComicSummary {
    ComicSummary {
        comic_id: id.to_string(),
        title: title.to_string(),
        panel_count: 4,
        ..ComicSummary::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_script_is_a_network_error() {
        let api = ScriptedApi::new();
        let err = api.batch_status(&RemoteId::new("b")).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(api.status_calls(), 1);
    }

    #[tokio::test]
    async fn held_call_returns_the_released_reply() {
        let api = std::sync::Arc::new(ScriptedApi::new());
        api.hold_comic();

        let caller = {
            let api = api.clone();
            tokio::spawn(async move { api.generate_comic(&ComicRequest::new("x")).await })
        };
        api.wait_for_calls(1).await;
        // the call is counted just before it parks
        while api.state().comics.held.is_none() {
            tokio::task::yield_now().await;
        }
        api.release_comic(Ok(comic("c1", "T")));

        let got = caller.await.unwrap().unwrap();
        assert_eq!(got.comic_id, "c1");
    }

    #[tokio::test]
    async fn library_lookups() {
        let api = ScriptedApi::new();
        api.add_comic(comic("c1", "One"));
        api.add_script("c1", serde_json::json!({"panels": []}));

        assert_eq!(api.list_comics().await.unwrap().len(), 1);
        assert_eq!(api.get_comic("c1").await.unwrap().title, "One");
        assert!(api.get_script("c1").await.is_ok());

        let err = api.get_comic("nope").await.unwrap_err();
        assert_eq!(err.detail(), Some("Comic not found"));
    }
}
