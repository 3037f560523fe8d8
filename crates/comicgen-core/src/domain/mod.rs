//! Domain model (IDs, task state machine, payloads, outcomes, errors).
//!
//! ここには I/O を持ち込まない。HTTP や時計は `ports` 経由で差し込む。

pub mod errors;
pub mod ids;
pub mod outcome;
pub mod request;
pub mod state;
pub mod task;

pub use errors::{FailureCode, TaskFailure, ValidationError};
pub use ids::{RemoteId, SlotId, TaskId};
pub use outcome::{Artifact, ComicSummary, Progress, TaskResult};
pub use request::{Audience, BatchComicRequest, ComicRequest, Tone, VideoRequest, VisualStyle};
pub use state::{TaskKind, TaskState};
pub use task::{GenerationTask, TaskEvent, TransitionError};
