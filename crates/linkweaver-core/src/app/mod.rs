//! App - アプリケーション層
//!
//! このモジュールは、キュー・ストア・アンカリングを組み合わせて
//! 外部向けの操作を提供します。
//!
//! # 主要コンポーネント
//! - **LinkService**: 実行開始（冪等）、状況確認、候補のレビュー、書き出し
//! - **RunStatus**: 件数・進捗・最近更新されたタスク

pub mod service;
pub mod status;

// 主要な型を再エクスポート
pub use self::service::{
    ControlError, DEFAULT_HREF_PREFIX, LinkService, RenderedDocument, StartOutcome,
};
pub use self::status::{RECENT_TASK_LIMIT, RunStatus, TaskSummary};
