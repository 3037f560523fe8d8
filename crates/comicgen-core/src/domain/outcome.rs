//! Outcome model: what a finished task produced.
//!
//! Kept transport-agnostic: these are the shapes observers render, not the
//! raw wire responses (those live in `ports::generation_api`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata of one generated comic, as reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComicSummary {
    pub comic_id: String,
    pub title: String,

    #[serde(default)]
    pub theme: String,

    #[serde(default)]
    pub generated_at: String,

    #[serde(default)]
    pub panel_count: u32,

    /// File role -> server path (e.g. "script", "comic_image").
    #[serde(default)]
    pub files: BTreeMap<String, String>,

    #[serde(default)]
    pub generation_params: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
}

/// Something a completed task produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Artifact {
    Comic(ComicSummary),
    Video { comic_id: String, video_url: String },
}

impl Artifact {
    /// Id of the comic this artifact belongs to.
    pub fn comic_id(&self) -> &str {
        match self {
            Artifact::Comic(c) => &c.comic_id,
            Artifact::Video { comic_id, .. } => comic_id,
        }
    }
}

/// Result of a Completed task. Immutable once stored on the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub artifacts: Vec<Artifact>,
}

impl TaskResult {
    pub fn single(artifact: Artifact) -> Self {
        Self {
            artifacts: vec![artifact],
        }
    }

    pub fn batch(comics: Vec<ComicSummary>) -> Self {
        Self {
            artifacts: comics.into_iter().map(Artifact::Comic).collect(),
        }
    }
}

/// Progress of a running batch (`completed` of `total` comics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Progress {
    pub completed: u32,
    pub total: u32,
}

impl Progress {
    pub fn new(completed: u32, total: u32) -> Self {
        Self { completed, total }
    }

    /// Percentage in 0..=100. A zero total reads as 0%.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let ratio = self.completed.min(self.total) as f64 / self.total as f64;
        (ratio * 100.0) as u8
    }
}
