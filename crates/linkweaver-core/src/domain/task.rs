//! AnalysisTask record and its state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DocumentId, TaskId};

/// Task status.
///
/// State transitions:
/// - Queued -> Processing (claim)
/// - Processing -> Completed
/// - Processing -> Failed
///
/// Failed tasks are never requeued; a new run resets everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a worker to claim it.
    Queued,

    /// Claimed by exactly one worker.
    Processing,

    /// Every target was evaluated.
    Completed,

    /// Precondition or top-level failure; `error` holds the message.
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task status '{0}'")]
pub struct InvalidTaskStatus(pub String);

impl FromStr for TaskStatus {
    type Err = InvalidTaskStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(InvalidTaskStatus(other.to_string())),
        }
    }
}

/// One unit of work: analyze `document_id` against the rest of the corpus.
///
/// The store is the single source of truth; the state-changing methods below
/// are what store implementations apply once their guard condition held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub id: TaskId,
    pub document_id: DocumentId,
    pub status: TaskStatus,

    /// Percent of targets processed, 0..=100.
    pub progress: u8,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    pub error: Option<String>,
}

impl AnalysisTask {
    pub fn new(id: TaskId, document_id: DocumentId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            document_id,
            status: TaskStatus::Queued,
            progress: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            error: None,
        }
    }

    /// Queued -> Processing. Returns false (and changes nothing) otherwise.
    pub fn claim(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != TaskStatus::Queued {
            return false;
        }
        self.status = TaskStatus::Processing;
        self.started_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Progress never moves backwards and is clamped to 100.
    pub fn record_progress(&mut self, progress: u8, now: DateTime<Utc>) {
        self.progress = self.progress.max(progress.min(100));
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(TaskStatus::Completed) {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.progress = 100;
        self.completed_at = Some(now);
        self.updated_at = now;
        true
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(TaskStatus::Failed) {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(now);
        self.updated_at = now;
        true
    }
}

/// Point-in-time task counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn add(&mut self, status: TaskStatus) {
        self.total += 1;
        match status {
            TaskStatus::Queued => self.queued += 1,
            TaskStatus::Processing => self.processing += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }

    /// Nothing left to claim and nothing in flight.
    pub fn is_drained(&self) -> bool {
        self.queued == 0 && self.processing == 0
    }
}

impl FromIterator<TaskStatus> for TaskCounts {
    fn from_iter<I: IntoIterator<Item = TaskStatus>>(iter: I) -> Self {
        let mut counts = TaskCounts::default();
        for status in iter {
            counts.add(status);
        }
        counts
    }
}

/// Processed-targets ratio as an integer percent.
pub fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed.min(total) * 100) / total) as u8
}
