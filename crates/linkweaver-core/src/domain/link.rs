//! Link candidates ("semantic links") and their review status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DocumentId, LinkId};

/// Minimum classifier confidence for a candidate to be persisted.
pub const LINK_CONFIDENCE_THRESHOLD: u8 = 70;

/// Minimum confidence for the reviewer's bulk "approve high confidence" action.
/// Deliberately separate from [`LINK_CONFIDENCE_THRESHOLD`].
pub const AUTO_APPROVE_CONFIDENCE_THRESHOLD: u8 = 85;

/// Reviewer recorded when none is supplied.
pub const DEFAULT_REVIEWER: &str = "user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Pending,
    Approved,
    Rejected,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Approved => "approved",
            LinkStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid link status '{0}' (expected pending, approved or rejected)")]
pub struct InvalidLinkStatus(pub String);

impl FromStr for LinkStatus {
    type Err = InvalidLinkStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LinkStatus::Pending),
            "approved" => Ok(LinkStatus::Approved),
            "rejected" => Ok(LinkStatus::Rejected),
            other => Err(InvalidLinkStatus(other.to_string())),
        }
    }
}

/// A discovered cross-reference from `source_document_id` to
/// `target_document_id`. At most one exists per ordered pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub id: LinkId,
    pub source_document_id: DocumentId,
    pub target_document_id: DocumentId,

    /// Literal phrase to anchor.
    pub link_text: String,

    /// Byte offset of `link_text` in the source content at discovery time.
    pub link_position: usize,

    pub alt_text: String,
    pub confidence: u8,
    pub reasoning: String,
    pub status: LinkStatus,

    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
}

impl LinkCandidate {
    /// Half-open byte span `[start, end)` in the source content.
    pub fn span(&self) -> (usize, usize) {
        (self.link_position, self.link_position + self.link_text.len())
    }

    pub fn overlaps(&self, other: &LinkCandidate) -> bool {
        let (a_start, a_end) = self.span();
        let (b_start, b_end) = other.span();
        a_start < b_end && b_start < a_end
    }

    pub fn review(&mut self, status: LinkStatus, reviewer: impl Into<String>, now: DateTime<Utc>) {
        self.status = status;
        self.reviewed_at = Some(now);
        self.reviewed_by = Some(reviewer.into());
    }
}

/// Query filter for listing candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFilter {
    /// Matches candidates where the document is either source or target.
    pub document_id: Option<DocumentId>,
    pub status: Option<LinkStatus>,
}

impl LinkFilter {
    pub fn for_document(document_id: DocumentId) -> Self {
        Self {
            document_id: Some(document_id),
            status: None,
        }
    }

    pub fn with_status(mut self, status: LinkStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, link: &LinkCandidate) -> bool {
        let document_ok = self.document_id.is_none_or(|id| {
            link.source_document_id == id || link.target_document_id == id
        });
        let status_ok = self.status.is_none_or(|s| link.status == s);
        document_ok && status_ok
    }
}

/// Listing order: confidence desc, then most recent first.
pub fn listing_order(a: &LinkCandidate, b: &LinkCandidate) -> std::cmp::Ordering {
    b.confidence
        .cmp(&a.confidence)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use ulid::Ulid;

    pub fn candidate(position: usize, text: &str, status: LinkStatus) -> LinkCandidate {
        LinkCandidate {
            id: LinkId::from_ulid(Ulid::new()),
            source_document_id: DocumentId(1),
            target_document_id: DocumentId(2),
            link_text: text.to_string(),
            link_position: position,
            alt_text: format!("About {text}"),
            confidence: 80,
            reasoning: String::new(),
            status,
            created_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
        }
    }
}
