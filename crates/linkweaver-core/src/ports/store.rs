//! Store ports - 正本（source of truth）
//!
//! ワーカー同士はメモリを共有しません。協調はすべてストアの条件付き書き込み
//! （`claim`: 「id = X かつ status = queued なら processing にする」）を経由します。
//! そのため実装は `claim` を単一のアトミック操作として提供しなければなりません。
//! 複数プロセスでワーカーを動かす場合もこの性質だけで「1 タスク 1 ワーカー」が
//! 成り立ちます。
//!
//! # 実装
//! - `impls::InMemoryStore`（同一プロセス・テスト用）
//! - `linkweaver-sqlite` クレートの `SqliteStore`

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AnalysisTask, Document, DocumentId, LinkCandidate, LinkFilter, LinkId, LinkStatus,
    TaskCounts, TaskId,
};

/// StoreError はストア操作の失敗
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("corrupt {entity} row: {reason}")]
    Corrupt { entity: &'static str, reason: String },
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// DocumentStore はコーパスへの読み取り（とインポート用の書き込み）
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError>;

    /// All documents in creation order.
    async fn list_documents(&self) -> Result<Vec<Document>, StoreError>;

    /// Import-time write. The analysis core never calls this.
    async fn upsert_document(&self, document: Document) -> Result<(), StoreError>;
}

/// TaskStore は AnalysisTask の状態遷移を管理
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Delete every task and every link candidate (full run reset).
    async fn reset_run(&self) -> Result<(), StoreError>;

    async fn insert_tasks(&self, tasks: Vec<AnalysisTask>) -> Result<(), StoreError>;

    /// Oldest queued task by creation order, without claiming it.
    async fn next_queued(&self) -> Result<Option<AnalysisTask>, StoreError>;

    /// Atomic `queued -> processing` guarded on the current status.
    ///
    /// `Ok(false)` means zero rows were affected: someone else claimed it.
    async fn claim(&self, id: TaskId, started_at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Single-field progress write, visible to `task_counts` immediately.
    async fn update_progress(
        &self,
        id: TaskId,
        progress: u8,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// `processing -> completed`, progress = 100. `Ok(false)` if not processing.
    async fn complete_task(&self, id: TaskId, at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// `processing -> failed` with a message. `Ok(false)` if not processing.
    async fn fail_task(
        &self,
        id: TaskId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn get_task(&self, id: TaskId) -> Result<Option<AnalysisTask>, StoreError>;

    async fn task_counts(&self) -> Result<TaskCounts, StoreError>;

    /// Most recently updated first.
    async fn recent_tasks(&self, limit: usize) -> Result<Vec<AnalysisTask>, StoreError>;
}

/// LinkStore はリンク候補の作成とレビューを管理
#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn link_exists(
        &self,
        source: DocumentId,
        target: DocumentId,
    ) -> Result<bool, StoreError>;

    /// `Ok(false)` when the ordered pair already has a candidate.
    async fn insert_link(&self, link: LinkCandidate) -> Result<bool, StoreError>;

    async fn get_link(&self, id: LinkId) -> Result<Option<LinkCandidate>, StoreError>;

    /// Ordered by confidence desc, then most recent first.
    async fn list_links(&self, filter: &LinkFilter) -> Result<Vec<LinkCandidate>, StoreError>;

    /// Sets status + reviewer + review time; returns the number updated.
    async fn review_links(
        &self,
        ids: &[LinkId],
        status: LinkStatus,
        reviewer: &str,
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
}

/// Store は 3 つのコレクションすべてを扱う正本
pub trait Store: DocumentStore + TaskStore + LinkStore {}

impl<T: DocumentStore + TaskStore + LinkStore + ?Sized> Store for T {}
