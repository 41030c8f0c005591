//! LinkService - 外部向けの操作（実行開始・状況確認・レビュー・書き出し）
//!
//! キュー・ストア・アンカリングを組み合わせるだけの薄い層です。
//! 状態はすべてストアから読み直し、ここでは何もキャッシュしません。

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::status::{RECENT_TASK_LIMIT, RunStatus, summarize};
use crate::anchoring::{HighlightClasses, apply_approved_links, highlight};
use crate::domain::{
    AUTO_APPROVE_CONFIDENCE_THRESHOLD, DEFAULT_REVIEWER, Document, DocumentId, LinkCandidate,
    LinkFilter, LinkId, LinkStatus,
};
use crate::observability::CONTROL_TARGET;
use crate::ports::{Clock, Store, StoreError};
use crate::queue::{AnalysisQueue, PoolReport, RunPermit};

/// Address prefix for anchors when none is configured.
pub const DEFAULT_HREF_PREFIX: &str = "/blog/";

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("link not found: {0}")]
    LinkNotFound(LinkId),

    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("no link ids provided")]
    NoLinkIds,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    Started { task_count: usize },
    AlreadyRunning,
}

/// A document rendered for display or export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDocument {
    pub id: DocumentId,
    pub name: String,
    pub slug: String,
    pub content: Option<String>,
}

pub struct LinkService {
    store: Arc<dyn Store>,
    queue: AnalysisQueue,
    clock: Arc<dyn Clock>,
    href_prefix: String,
    highlight_classes: HighlightClasses,
}

impl LinkService {
    pub fn new(store: Arc<dyn Store>, queue: AnalysisQueue, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            queue,
            clock,
            href_prefix: DEFAULT_HREF_PREFIX.to_string(),
            highlight_classes: HighlightClasses::default(),
        }
    }

    pub fn with_href_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.href_prefix = prefix.into();
        self
    }

    pub fn with_highlight_classes(mut self, classes: HighlightClasses) -> Self {
        self.highlight_classes = classes;
        self
    }

    pub fn queue(&self) -> &AnalysisQueue {
        &self.queue
    }

    /// Reset, enqueue every document, and launch the pool in the background.
    ///
    /// Concurrent callers race on the pool's running flag; exactly one wins.
    pub async fn start_run(&self) -> Result<StartOutcome, ControlError> {
        let Some((permit, task_count)) = self.begin_run().await? else {
            return Ok(StartOutcome::AlreadyRunning);
        };
        // detached; progress is observed through `run_status`
        drop(permit.launch());
        Ok(StartOutcome::Started { task_count })
    }

    /// Like [`start_run`](Self::start_run) but waits for the pool to drain.
    /// `None` if a run is already in progress.
    pub async fn run_to_completion(&self) -> Result<Option<PoolReport>, ControlError> {
        let Some((permit, _)) = self.begin_run().await? else {
            return Ok(None);
        };
        Ok(Some(permit.run().await))
    }

    async fn begin_run(&self) -> Result<Option<(RunPermit, usize)>, ControlError> {
        let Some(permit) = self.queue.try_begin() else {
            info!(target: CONTROL_TARGET, "run already in progress");
            return Ok(None);
        };
        let ids: Vec<DocumentId> = self
            .store
            .list_documents()
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();
        // an error here drops the permit and releases the pool
        let task_count = self.queue.enqueue_run(&ids).await?;
        info!(target: CONTROL_TARGET, tasks = task_count, "analysis run started");
        Ok(Some((permit, task_count)))
    }

    pub fn stop_run(&self) {
        self.queue.stop();
    }

    pub async fn run_status(&self) -> Result<RunStatus, ControlError> {
        let status = self.queue.status().await?;
        let tasks = self.store.recent_tasks(RECENT_TASK_LIMIT).await?;
        let documents = self.store.list_documents().await?;
        Ok(RunStatus {
            status,
            running: self.queue.is_running(),
            active_workers: self.queue.active_workers(),
            recent_tasks: summarize(tasks, &documents),
        })
    }

    pub async fn list_links(&self, filter: &LinkFilter) -> Result<Vec<LinkCandidate>, ControlError> {
        Ok(self.store.list_links(filter).await?)
    }

    /// Set one candidate's status. The reviewer defaults to `"user"`.
    pub async fn review_link(
        &self,
        id: LinkId,
        status: LinkStatus,
        reviewer: Option<&str>,
    ) -> Result<LinkCandidate, ControlError> {
        let updated = self.review_links(&[id], status, reviewer).await?;
        if updated == 0 {
            return Err(ControlError::LinkNotFound(id));
        }
        self.store
            .get_link(id)
            .await?
            .ok_or(ControlError::LinkNotFound(id))
    }

    /// Set many candidates' status at once; returns how many were updated.
    pub async fn review_links(
        &self,
        ids: &[LinkId],
        status: LinkStatus,
        reviewer: Option<&str>,
    ) -> Result<usize, ControlError> {
        if ids.is_empty() {
            return Err(ControlError::NoLinkIds);
        }
        let reviewer = reviewer.unwrap_or(DEFAULT_REVIEWER);
        let updated = self
            .store
            .review_links(ids, status, reviewer, self.clock.now())
            .await?;
        info!(
            target: CONTROL_TARGET,
            requested = ids.len(),
            updated,
            status = %status,
            reviewer,
            "links reviewed"
        );
        Ok(updated)
    }

    /// Approve every pending candidate at or above the auto-approve threshold.
    pub async fn approve_high_confidence(
        &self,
        reviewer: Option<&str>,
    ) -> Result<usize, ControlError> {
        let ids: Vec<LinkId> = self
            .store
            .list_links(&LinkFilter::default().with_status(LinkStatus::Pending))
            .await?
            .into_iter()
            .filter(|l| l.confidence >= AUTO_APPROVE_CONFIDENCE_THRESHOLD)
            .map(|l| l.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        self.review_links(&ids, LinkStatus::Approved, reviewer).await
    }

    /// The document's content with its approved outgoing links anchored.
    pub async fn materialize_document(
        &self,
        id: DocumentId,
    ) -> Result<RenderedDocument, ControlError> {
        let document = self.document(id).await?;
        let documents = self.store.list_documents().await?;
        let links = self.outgoing_links(id, Some(LinkStatus::Approved)).await?;
        Ok(self.materialize(document, &links, &self.slugs(&documents)))
    }

    /// Every document in creation order, approved links applied.
    pub async fn export_documents(&self) -> Result<Vec<RenderedDocument>, ControlError> {
        let documents = self.store.list_documents().await?;
        let slugs = self.slugs(&documents);

        let mut by_source: HashMap<DocumentId, Vec<LinkCandidate>> = HashMap::new();
        for link in self
            .store
            .list_links(&LinkFilter::default().with_status(LinkStatus::Approved))
            .await?
        {
            by_source
                .entry(link.source_document_id)
                .or_default()
                .push(link);
        }

        Ok(documents
            .into_iter()
            .map(|document| {
                let links = by_source.remove(&document.id).unwrap_or_default();
                self.materialize(document, &links, &slugs)
            })
            .collect())
    }

    /// Reviewer preview: approved and pending spans highlighted.
    pub async fn preview_document(&self, id: DocumentId) -> Result<RenderedDocument, ControlError> {
        let document = self.document(id).await?;
        let links = self.outgoing_links(id, None).await?;
        let content = document
            .content
            .as_deref()
            .map(|content| highlight(content, &links, &self.highlight_classes));
        Ok(RenderedDocument {
            id: document.id,
            name: document.name,
            slug: document.slug,
            content,
        })
    }

    async fn document(&self, id: DocumentId) -> Result<Document, ControlError> {
        self.store
            .get_document(id)
            .await?
            .ok_or(ControlError::DocumentNotFound(id))
    }

    /// Candidates whose source is `id` (the filter alone also matches targets).
    async fn outgoing_links(
        &self,
        id: DocumentId,
        status: Option<LinkStatus>,
    ) -> Result<Vec<LinkCandidate>, ControlError> {
        let filter = LinkFilter {
            document_id: Some(id),
            status,
        };
        let mut links = self.store.list_links(&filter).await?;
        links.retain(|l| l.source_document_id == id);
        Ok(links)
    }

    fn slugs(&self, documents: &[Document]) -> HashMap<DocumentId, String> {
        documents.iter().map(|d| (d.id, d.slug.clone())).collect()
    }

    fn materialize(
        &self,
        document: Document,
        links: &[LinkCandidate],
        slugs: &HashMap<DocumentId, String>,
    ) -> RenderedDocument {
        let content = document.content.as_deref().map(|content| {
            apply_approved_links(content, links, |link| {
                slugs
                    .get(&link.target_document_id)
                    .map(|slug| format!("{}{}", self.href_prefix, slug))
            })
        });
        RenderedDocument {
            id: document.id,
            name: document.name,
            slug: document.slug,
            content,
        }
    }
}
