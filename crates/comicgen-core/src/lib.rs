//! comicgen-core
//!
//! Lifecycle tracking for comic / video generation requests.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, request, state, task, outcome, errors）
//! - **ports**: 抽象化レイヤー（GenerationApi, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（Submitter, Poller, TaskRegistry, RetryPolicy）
//! - **typed**: 型付きリクエスト API（GenerationRequest, DynRequest）
//! - **impls**: 実装（HttpGenerationApi, ScriptedApi）
//! - **config**: 環境変数からの設定
//! - **observability**: 状態ごとの件数

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod typed;

pub use app::{PollConfig, PollExit, Poller, RegistryError, Submitter, TaskRegistry};
pub use config::{ClientConfig, ConfigError};
pub use domain::{GenerationTask, SlotId, TaskState};
pub use observability::TaskCounts;
