use serde::{Deserialize, Serialize};

use crate::domain::TaskCounts;

/// Point-in-time aggregate over every task of the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,

    /// `completed / total` as a percentage; 0 when there are no tasks.
    pub progress: f64,
}

impl From<TaskCounts> for QueueStatus {
    fn from(counts: TaskCounts) -> Self {
        let progress = if counts.total == 0 {
            0.0
        } else {
            counts.completed as f64 * 100.0 / counts.total as f64
        };
        Self {
            total: counts.total,
            queued: counts.queued,
            processing: counts.processing,
            completed: counts.completed,
            failed: counts.failed,
            progress,
        }
    }
}

/// Tally returned when the pool stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolReport {
    /// Tasks whose processor returned `Ok`.
    pub processed: usize,
    /// Tasks marked failed by the pool.
    pub failed: usize,
    /// Conditional claims that affected no row (another worker won).
    pub lost_claims: usize,
}

impl PoolReport {
    pub fn absorb(&mut self, other: PoolReport) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.lost_claims += other.lost_claims;
    }
}
