//! Table definitions. Applied idempotently on every connect.
//!
//! Timestamps are stored as RFC 3339 text, which does not sort reliably as a
//! string; creation order therefore comes from the `seq` rowid columns.

pub(crate) const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS documents (
        id          INTEGER PRIMARY KEY,
        name        TEXT NOT NULL,
        slug        TEXT NOT NULL,
        content     TEXT,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS analysis_tasks (
        seq           INTEGER PRIMARY KEY AUTOINCREMENT,
        id            TEXT NOT NULL UNIQUE,
        document_id   INTEGER NOT NULL,
        status        TEXT NOT NULL,
        progress      INTEGER NOT NULL DEFAULT 0,
        created_at    TEXT NOT NULL,
        started_at    TEXT,
        completed_at  TEXT,
        updated_at    TEXT NOT NULL,
        error         TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_analysis_tasks_status_seq
        ON analysis_tasks (status, seq)",
    "CREATE TABLE IF NOT EXISTS link_candidates (
        seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
        id                  TEXT NOT NULL UNIQUE,
        source_document_id  INTEGER NOT NULL,
        target_document_id  INTEGER NOT NULL,
        link_text           TEXT NOT NULL,
        link_position       INTEGER NOT NULL,
        alt_text            TEXT NOT NULL,
        confidence          INTEGER NOT NULL,
        reasoning           TEXT NOT NULL,
        status              TEXT NOT NULL,
        created_at          TEXT NOT NULL,
        reviewed_at         TEXT,
        reviewed_by         TEXT,
        UNIQUE (source_document_id, target_document_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_link_candidates_target
        ON link_candidates (target_document_id)",
];
