//! Ports - 抽象化レイヤー
//!
//! 外部との境界（コミック生成サービス、時計、ID 採番）を trait で切る。
//! 実装は `impls` に置く。

pub mod clock;
pub mod generation_api;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::generation_api::{
    ApiError, BatchAccepted, BatchStatus, BatchStatusKind, GenerationApi, VideoResponse,
    VideoStatus,
};
pub use self::id_generator::{IdGenerator, UlidGenerator};
