//! App - アプリケーション層
//!
//! ports を組み合わせてタスクのライフサイクルを動かす。
//!
//! # 主要コンポーネント
//! - **Submitter**: 1 リクエストを送り、結果を状態機械に写す
//! - **Poller**: handle を終端状態まで問い合わせる（キャンセル可能、backoff 付き）
//! - **TaskRegistry**: スロットごとの現在タスクとドライバを管理する
//! - **RetryPolicy**: 失敗した問い合わせの待ち時間

pub mod poller;
pub mod registry;
pub mod retry;
pub mod submitter;

// 主要な型を再エクスポート
pub use self::poller::{PollConfig, PollExit, Poller};
pub use self::registry::{RegistryError, TaskRegistry};
pub use self::retry::RetryPolicy;
pub use self::submitter::{SubmitError, Submitter, apply_reply};
