//! linkweaver-core
//!
//! Core building blocks for discovering, reviewing and materializing
//! semantic links between documents.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, document, task, link, classification, outcome, errors, events）
//! - **ports**: 抽象化レイヤー（Store, Classifier, Clock, IdGenerator）
//! - **anchoring**: リンク文言の位置特定とアンカー挿入（I/O なし）
//! - **analyzer**: 1 文書をコーパス全体と突き合わせて候補を作る
//! - **queue**: 永続キューとワーカープール（ストアの条件付き更新で claim）
//! - **app**: 外部向けの操作（実行開始、状況確認、レビュー、書き出し）
//! - **impls**: 実装（InMemoryStore, ScriptedClassifier など開発用）
//! - **observability**: ログのターゲット

pub mod analyzer;
pub mod anchoring;
pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use self::analyzer::{AnalysisError, AnalyzerConfig, DocumentRelationAnalyzer};
pub use self::app::{ControlError, LinkService, RunStatus, StartOutcome};
pub use self::queue::{AnalysisQueue, PoolConfig, PoolReport, QueueStatus, TaskProcessor};
