//! Impls - GenerationApi の実装
//!
//! # 含まれる実装
//! - **HttpGenerationApi**: reqwest で実サービスに接続する本番用
//! - **ScriptedApi**: 積んだ応答を返すテスト・デモ用

pub mod http;
pub mod scripted;

// 主要な型を再エクスポート
pub use self::http::HttpGenerationApi;
pub use self::scripted::ScriptedApi;
