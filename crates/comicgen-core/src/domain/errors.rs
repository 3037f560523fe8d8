//! Errors - 失敗の分類
//!
//! - `ValidationError`: 送信前に弾く入力エラー（タスクは作られない）
//! - `TaskFailure`: Failed 状態のタスクが持つ、ユーザー向けの失敗内容
//!
//! キャンセルは失敗ではないので、ここには現れない。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable cause of a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// Network error or non-2xx response.
    Transport,

    /// The service itself reported `status: failed`.
    ServerFailed,

    /// Too many consecutive status queries failed.
    Unreachable,

    /// The task stayed active past the polling deadline.
    Timeout,
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCode::Transport => "transport",
            FailureCode::ServerFailed => "server_failed",
            FailureCode::Unreachable => "unreachable",
            FailureCode::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// User-displayable failure stored on a Failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<FailureCode>,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>, code: FailureCode) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(message, FailureCode::Transport)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(message, FailureCode::ServerFailed)
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Input rejected before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a topic for your comic")]
    EmptyTopic,

    #[error("Please enter at least one topic")]
    NoTopics,

    #[error("A comic id is required")]
    EmptyComicId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_display_includes_code() {
        let f = TaskFailure::server("model overloaded");
        assert_eq!(f.to_string(), "model overloaded (server_failed)");
    }

    #[test]
    fn failure_code_serializes_as_snake_case() {
        let v = serde_json::to_value(TaskFailure::new("x", FailureCode::Unreachable)).unwrap();
        assert_eq!(v["code"], "unreachable");
    }
}
