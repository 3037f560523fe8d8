//! Domain identifiers (strongly-typed IDs).
//!
//! - `TaskId`: ローカルで採番する ULID。タスクオブジェクト自体の識別子
//! - `RemoteId`: サーバーが受理時に返す不透明な ID（comic_id / batch task_id）
//! - `SlotId`: 「何を生成しているか」の論理キー（create / batch / video:<id>）

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of one `GenerationTask` object.
///
/// A retry always mints a new one, so two tasks with the same `TaskId` are
/// the same task.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Ulid);

impl TaskId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Opaque identifier assigned by the comic service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The logical thing being generated. Owns at most one active task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(String);

impl SlotId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Slot of the single-comic creation form.
    pub fn create() -> Self {
        Self::new("create")
    }

    /// Slot of the batch generation form.
    pub fn batch() -> Self {
        Self::new("batch")
    }

    /// One video slot per comic.
    pub fn video(comic_id: &str) -> Self {
        Self(format!("video:{comic_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
