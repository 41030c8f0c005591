//! Per-pair outcomes and the per-task tally built from them.

use serde::{Deserialize, Serialize};

/// Why a pair produced no candidate without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A candidate already exists for this ordered pair.
    ExistingCandidate,
    /// The classifier's phrase does not occur in the source content.
    PhraseNotFound,
    /// The phrase sits inside an existing anchor.
    AlreadyAnchored,
    /// Lost the insert race to another writer for the same pair.
    DuplicatePair,
}

/// Result of evaluating one (source, target) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PairOutcome {
    /// A pending candidate was persisted.
    Accepted,
    /// The classifier said no, or confidence was below the threshold.
    Rejected,
    Skipped { reason: SkipReason },
    /// Classifier or store failure; the pair was skipped and the task went on.
    Errored { message: String },
}

/// Tally for one task, logged when the task completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub targets: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl AnalysisReport {
    pub fn new(targets: usize) -> Self {
        Self {
            targets,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: &PairOutcome) {
        match outcome {
            PairOutcome::Accepted => self.accepted += 1,
            PairOutcome::Rejected => self.rejected += 1,
            PairOutcome::Skipped { .. } => self.skipped += 1,
            PairOutcome::Errored { .. } => self.errors += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.accepted + self.rejected + self.skipped + self.errors
    }
}
