//! Corpus documents (read-only to the analysis core).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::DocumentId;

/// A corpus record. The analysis core only ever reads these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    /// Address segment used when anchoring links to this document.
    pub slug: String,
    /// Text/HTML body. `None` documents are never analyzed or linked to.
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        id: DocumentId,
        name: impl Into<String>,
        slug: impl Into<String>,
        content: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            slug: slug.into(),
            content,
            created_at: now,
            updated_at: now,
        }
    }

    /// Content, treating an empty body like a missing one.
    pub fn body(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.is_empty())
    }
}
