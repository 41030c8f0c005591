//! Corpus import (JSON)

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use linkweaver_core::domain::{Document, DocumentId};

/// One record of the import file. `slug` falls back to a slugified `name`.
#[derive(Debug, Deserialize)]
pub struct CorpusRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl CorpusRecord {
    pub fn into_document(self, now: DateTime<Utc>) -> Document {
        let slug = self
            .slug
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| slugify(&self.name));
        Document::new(DocumentId(self.id), self.name, slug, self.content, now)
    }
}

pub fn read_corpus(path: &Path) -> Result<Vec<CorpusRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read corpus file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("corpus file {} is not a JSON array of documents", path.display()))
}

/// Lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
