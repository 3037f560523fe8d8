//! Typed - 型付きリクエスト API
//!
//! リクエスト型ごとに「タスクの形（KIND）」「失敗時の文言」「送信方法」を
//! 静的に結びつける。Registry は型消去した `DynRequest` だけを扱う。

pub mod request;

pub use self::request::{DynRequest, GenerationRequest, SubmitReply};
