//! Status - 実行状況のスナップショット

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AnalysisTask, Document, DocumentId, TaskId, TaskStatus};
use crate::queue::QueueStatus;

/// Number of task summaries included in a status snapshot.
pub const RECENT_TASK_LIMIT: usize = 10;

/// One recently updated task, joined with its document's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub document_id: DocumentId,
    pub document_name: Option<String>,
    pub document_slug: Option<String>,
    pub status: TaskStatus,
    pub progress: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl TaskSummary {
    pub fn new(task: AnalysisTask, document: Option<&Document>) -> Self {
        Self {
            id: task.id,
            document_id: task.document_id,
            document_name: document.map(|d| d.name.clone()),
            document_slug: document.map(|d| d.slug.clone()),
            status: task.status,
            progress: task.progress,
            started_at: task.started_at,
            completed_at: task.completed_at,
            updated_at: task.updated_at,
            error: task.error,
        }
    }
}

/// Aggregate counts plus the most recently updated tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub status: QueueStatus,
    pub running: bool,
    pub active_workers: usize,
    pub recent_tasks: Vec<TaskSummary>,
}

pub(crate) fn summarize(tasks: Vec<AnalysisTask>, documents: &[Document]) -> Vec<TaskSummary> {
    let by_id: HashMap<DocumentId, &Document> = documents.iter().map(|d| (d.id, d)).collect();
    tasks
        .into_iter()
        .map(|task| {
            let document = by_id.get(&task.document_id).copied();
            TaskSummary::new(task, document)
        })
        .collect()
}
