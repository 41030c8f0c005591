//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryStore**: 単一プロセス用の正本
//! - **ScriptedClassifier**: 決め打ち応答の分類器
//!
//! # 本番用実装
//! 本番用の実装は別クレートに配置します：
//! - `linkweaver-sqlite`: SqliteStore
//! - `linkweaver-cli`: HTTP 経由の分類器

pub mod memory_store;
pub mod scripted_classifier;

pub use self::memory_store::InMemoryStore;
pub use self::scripted_classifier::ScriptedClassifier;
