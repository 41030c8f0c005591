//! Events - キューが発行するドメインイベント
//!
//! ワーカーの状態変化を購読者（CLI の進捗表示、テスト）に流します。
//! 正本はあくまでストアで、イベントは取りこぼしても整合性に影響しません。

use serde::{Deserialize, Serialize};

use super::ids::{DocumentId, TaskId};

/// DomainEvent はワーカープールで発生したイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// プールが起動した
    RunStarted { workers: usize },
    /// ワーカーがタスクを claim した
    TaskClaimed {
        worker_id: usize,
        task_id: TaskId,
        document_id: DocumentId,
    },
    /// タスクの処理が完了した
    TaskCompleted { worker_id: usize, task_id: TaskId },
    /// タスクが失敗した（プールは継続）
    TaskFailed {
        worker_id: usize,
        task_id: TaskId,
        error: String,
    },
    /// ワーカー単位のエラー（ストア障害など）。致命的ではない
    WorkerError { worker_id: usize, error: String },
    /// 全ワーカーが終了した
    RunStopped,
}
