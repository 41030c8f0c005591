//! InMemoryStore - 開発用・テスト用の正本
//!
//! # 実装詳細
//! - 3 つのコレクションを 1 つの `tokio::sync::Mutex` で守る
//! - `claim` はロックを握ったまま「status を見て書き換える」ので
//!   同一プロセス内ではアトミック
//! - Vec は挿入順 = 作成順として扱う
//!
//! 複数プロセスでワーカーを動かす場合は使えません（`linkweaver-sqlite` を使う）。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::link::listing_order;
use crate::domain::{
    AnalysisTask, Document, DocumentId, LinkCandidate, LinkFilter, LinkId, LinkStatus,
    TaskCounts, TaskId, TaskStatus,
};
use crate::ports::{DocumentStore, LinkStore, StoreError, TaskStore};

#[derive(Debug, Default)]
struct State {
    documents: Vec<Document>,
    tasks: Vec<AnalysisTask>,
    links: Vec<LinkCandidate>,
}

impl State {
    fn task_mut(&mut self, id: TaskId) -> Result<&mut AnalysisTask, StoreError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "task",
                id: id.to_string(),
            })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the corpus in creation order.
    pub fn with_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        Self {
            state: Mutex::new(State {
                documents: documents.into_iter().collect(),
                ..State::default()
            }),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        Ok(self.state.lock().await.documents.clone())
    }

    async fn upsert_document(&self, document: Document) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match state.documents.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = Document {
                    created_at,
                    ..document
                };
            }
            None => state.documents.push(document),
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn reset_run(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.tasks.clear();
        state.links.clear();
        Ok(())
    }

    async fn insert_tasks(&self, tasks: Vec<AnalysisTask>) -> Result<(), StoreError> {
        self.state.lock().await.tasks.extend(tasks);
        Ok(())
    }

    async fn next_queued(&self) -> Result<Option<AnalysisTask>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .iter()
            .find(|t| t.status == TaskStatus::Queued)
            .cloned())
    }

    async fn claim(&self, id: TaskId, started_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => Ok(task.claim(started_at)),
            None => Ok(false),
        }
    }

    async fn update_progress(
        &self,
        id: TaskId,
        progress: u8,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let task = state.task_mut(id)?;
        if task.status == TaskStatus::Processing {
            task.record_progress(progress, at);
        }
        Ok(())
    }

    async fn complete_task(&self, id: TaskId, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.task_mut(id)?.mark_completed(at))
    }

    async fn fail_task(
        &self,
        id: TaskId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.task_mut(id)?.mark_failed(error, at))
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<AnalysisTask>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn task_counts(&self) -> Result<TaskCounts, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tasks.iter().map(|t| t.status).collect())
    }

    async fn recent_tasks(&self, limit: usize) -> Result<Vec<AnalysisTask>, StoreError> {
        let state = self.state.lock().await;
        let mut tasks = state.tasks.clone();
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        tasks.truncate(limit);
        Ok(tasks)
    }
}

#[async_trait]
impl LinkStore for InMemoryStore {
    async fn link_exists(
        &self,
        source: DocumentId,
        target: DocumentId,
    ) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .links
            .iter()
            .any(|l| l.source_document_id == source && l.target_document_id == target))
    }

    async fn insert_link(&self, link: LinkCandidate) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let duplicate = state.links.iter().any(|l| {
            l.source_document_id == link.source_document_id
                && l.target_document_id == link.target_document_id
        });
        if duplicate {
            return Ok(false);
        }
        state.links.push(link);
        Ok(true)
    }

    async fn get_link(&self, id: LinkId) -> Result<Option<LinkCandidate>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.links.iter().find(|l| l.id == id).cloned())
    }

    async fn list_links(&self, filter: &LinkFilter) -> Result<Vec<LinkCandidate>, StoreError> {
        let state = self.state.lock().await;
        let mut links: Vec<LinkCandidate> = state
            .links
            .iter()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        links.sort_by(listing_order);
        Ok(links)
    }

    async fn review_links(
        &self,
        ids: &[LinkId],
        status: LinkStatus,
        reviewer: &str,
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let mut updated = 0;
        for link in state.links.iter_mut().filter(|l| ids.contains(&l.id)) {
            link.review(status, reviewer, at);
            updated += 1;
        }
        Ok(updated)
    }
}
