//! Domain model (ids, documents, tasks, link candidates, classifications).
//!
//! ストアにもワーカーにも依存しない純粋なデータと状態遷移だけを置きます。

pub mod classification;
pub mod document;
pub mod errors;
pub mod events;
pub mod ids;
pub mod link;
pub mod outcome;
pub mod task;

pub use self::classification::{Classification, ClassificationRequest};
pub use self::document::Document;
pub use self::errors::ErrorKind;
pub use self::events::DomainEvent;
pub use self::ids::{DocumentId, LinkId, ParseIdError, TaskId};
pub use self::link::{
    AUTO_APPROVE_CONFIDENCE_THRESHOLD, DEFAULT_REVIEWER, InvalidLinkStatus,
    LINK_CONFIDENCE_THRESHOLD, LinkCandidate, LinkFilter, LinkStatus,
};
pub use self::outcome::{AnalysisReport, PairOutcome, SkipReason};
pub use self::task::{AnalysisTask, InvalidTaskStatus, TaskCounts, TaskStatus, progress_percent};
