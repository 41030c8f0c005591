//! Queue - 分析タスクのキューとワーカープール
//!
//! # 設計
//! - タスクはストアに永続化され、ワーカー同士はメモリを共有しない
//! - claim は「最古の queued を選ぶ → 条件付き更新」の 2 段階。
//!   条件付き更新が 0 行なら他のワーカーが取ったので、選び直すだけ（エラーではない）
//! - プロセス内の状態は「実行中フラグ」と「稼働ワーカー数」だけ
//!
//! # 終了条件
//! 空振りしたワーカーは `idle_backoff` だけ眠り、queued も processing も
//! 残っていなければ抜けます（`keep_warm` なら抜けずに待ち続ける）。
//! `stop()` は新しい claim を止めるだけで、処理中のタスクは最後まで走ります。

mod config;
mod pool;
mod status;

pub use self::config::PoolConfig;
pub use self::pool::{AnalysisQueue, RunPermit};
pub use self::status::{PoolReport, QueueStatus};

use async_trait::async_trait;

use crate::analyzer::AnalysisError;
use crate::domain::{AnalysisReport, AnalysisTask};

/// Work performed on a claimed task.
///
/// The processor completes the task itself; on `Err` the pool marks the task
/// failed with the error's message and moves on.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(&self, task: &AnalysisTask) -> Result<AnalysisReport, AnalysisError>;
}
