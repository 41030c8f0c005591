//! SqliteStore - SQLite 上の正本
//!
//! claim は 1 本の `UPDATE ... WHERE id = ? AND status = 'queued'` で、
//! `rows_affected()` が 1 なら勝ち、0 なら他のワーカーが先に取った、です。
//! SQLite が書き込みを直列化するので、同じファイルを複数プロセスで開いても
//! 「1 タスク 1 ワーカー」が成り立ちます。

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use tracing::{debug, info};

use linkweaver_core::domain::link::listing_order;
use linkweaver_core::domain::{
    AnalysisTask, Document, DocumentId, LinkCandidate, LinkFilter, LinkId, LinkStatus,
    TaskCounts, TaskId, TaskStatus,
};
use linkweaver_core::ports::{DocumentStore, LinkStore, StoreError, TaskStore};

use crate::schema;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_CONNECTIONS: u32 = 8;

fn db(err: sqlx::Error) -> StoreError {
    StoreError::backend(err)
}

fn corrupt(entity: &'static str, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        entity,
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(db)?;
        info!(url, "connected to sqlite");
        Self::from_pool(pool).await
    }

    /// Private in-memory database on a single long-lived connection.
    ///
    /// Every pooled connection to `sqlite::memory:` would otherwise get its
    /// own empty database.
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db)?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        for statement in schema::STATEMENTS {
            sqlx::query(*statement).execute(&pool).await.map_err(db)?;
        }
        debug!("sqlite schema applied");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn task_exists(&self, id: TaskId) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM analysis_tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        Ok(found.is_some())
    }

    /// Distinguish "guard did not hold" (`Ok(false)`) from "no such task".
    async fn guarded(&self, id: TaskId, rows_affected: u64) -> Result<bool, StoreError> {
        if rows_affected > 0 {
            return Ok(true);
        }
        if self.task_exists(id).await? {
            Ok(false)
        } else {
            Err(StoreError::NotFound {
                entity: "task",
                id: id.to_string(),
            })
        }
    }
}

fn document_from_row(row: &SqliteRow) -> Result<Document, StoreError> {
    Ok(Document {
        id: DocumentId(row.try_get("id").map_err(db)?),
        name: row.try_get("name").map_err(db)?,
        slug: row.try_get("slug").map_err(db)?,
        content: row.try_get("content").map_err(db)?,
        created_at: row.try_get("created_at").map_err(db)?,
        updated_at: row.try_get("updated_at").map_err(db)?,
    })
}

fn task_from_row(row: &SqliteRow) -> Result<AnalysisTask, StoreError> {
    let id: String = row.try_get("id").map_err(db)?;
    let status: String = row.try_get("status").map_err(db)?;
    let progress: i64 = row.try_get("progress").map_err(db)?;
    Ok(AnalysisTask {
        id: id.parse::<TaskId>().map_err(|e| corrupt("task", e))?,
        document_id: DocumentId(row.try_get("document_id").map_err(db)?),
        status: status.parse::<TaskStatus>().map_err(|e| corrupt("task", e))?,
        progress: u8::try_from(progress).map_err(|e| corrupt("task", e))?,
        created_at: row.try_get("created_at").map_err(db)?,
        started_at: row.try_get("started_at").map_err(db)?,
        completed_at: row.try_get("completed_at").map_err(db)?,
        updated_at: row.try_get("updated_at").map_err(db)?,
        error: row.try_get("error").map_err(db)?,
    })
}

fn link_from_row(row: &SqliteRow) -> Result<LinkCandidate, StoreError> {
    let id: String = row.try_get("id").map_err(db)?;
    let status: String = row.try_get("status").map_err(db)?;
    let position: i64 = row.try_get("link_position").map_err(db)?;
    let confidence: i64 = row.try_get("confidence").map_err(db)?;
    Ok(LinkCandidate {
        id: id.parse::<LinkId>().map_err(|e| corrupt("link", e))?,
        source_document_id: DocumentId(row.try_get("source_document_id").map_err(db)?),
        target_document_id: DocumentId(row.try_get("target_document_id").map_err(db)?),
        link_text: row.try_get("link_text").map_err(db)?,
        link_position: usize::try_from(position).map_err(|e| corrupt("link", e))?,
        alt_text: row.try_get("alt_text").map_err(db)?,
        confidence: u8::try_from(confidence).map_err(|e| corrupt("link", e))?,
        reasoning: row.try_get("reasoning").map_err(db)?,
        status: status.parse::<LinkStatus>().map_err(|e| corrupt("link", e))?,
        created_at: row.try_get("created_at").map_err(db)?,
        reviewed_at: row.try_get("reviewed_at").map_err(db)?,
        reviewed_by: row.try_get("reviewed_by").map_err(db)?,
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .as_ref()
            .map(document_from_row)
            .transpose()
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query("SELECT * FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        let mut documents = rows
            .iter()
            .map(document_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(documents)
    }

    async fn upsert_document(&self, document: Document) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO documents (id, name, slug, content, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                slug = excluded.slug,
                content = excluded.content,
                updated_at = excluded.updated_at",
        )
        .bind(document.id.get())
        .bind(&document.name)
        .bind(&document.slug)
        .bind(&document.content)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn reset_run(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        sqlx::query("DELETE FROM analysis_tasks")
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        sqlx::query("DELETE FROM link_candidates")
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        tx.commit().await.map_err(db)
    }

    async fn insert_tasks(&self, tasks: Vec<AnalysisTask>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        for task in &tasks {
            sqlx::query(
                "INSERT INTO analysis_tasks
                    (id, document_id, status, progress, created_at, started_at,
                     completed_at, updated_at, error)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(task.id.to_string())
            .bind(task.document_id.get())
            .bind(task.status.as_str())
            .bind(i64::from(task.progress))
            .bind(task.created_at)
            .bind(task.started_at)
            .bind(task.completed_at)
            .bind(task.updated_at)
            .bind(&task.error)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        }
        tx.commit().await.map_err(db)
    }

    async fn next_queued(&self) -> Result<Option<AnalysisTask>, StoreError> {
        sqlx::query("SELECT * FROM analysis_tasks WHERE status = 'queued' ORDER BY seq LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .as_ref()
            .map(task_from_row)
            .transpose()
    }

    async fn claim(&self, id: TaskId, started_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE analysis_tasks
             SET status = 'processing', started_at = ?, updated_at = ?
             WHERE id = ? AND status = 'queued'",
        )
        .bind(started_at)
        .bind(started_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_progress(
        &self,
        id: TaskId,
        progress: u8,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE analysis_tasks
             SET progress = MAX(progress, ?), updated_at = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(i64::from(progress.min(100)))
        .bind(at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        self.guarded(id, result.rows_affected()).await?;
        Ok(())
    }

    async fn complete_task(&self, id: TaskId, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE analysis_tasks
             SET status = 'completed', progress = 100, completed_at = ?, updated_at = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(at)
        .bind(at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        self.guarded(id, result.rows_affected()).await
    }

    async fn fail_task(
        &self,
        id: TaskId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE analysis_tasks
             SET status = 'failed', error = ?, completed_at = ?, updated_at = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(error)
        .bind(at)
        .bind(at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        self.guarded(id, result.rows_affected()).await
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<AnalysisTask>, StoreError> {
        sqlx::query("SELECT * FROM analysis_tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .as_ref()
            .map(task_from_row)
            .transpose()
    }

    async fn task_counts(&self) -> Result<TaskCounts, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM analysis_tasks GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

        let mut counts = TaskCounts::default();
        for row in &rows {
            let status: String = row.try_get("status").map_err(db)?;
            let n: i64 = row.try_get("n").map_err(db)?;
            let n = usize::try_from(n).map_err(|e| corrupt("task", e))?;
            match status.parse::<TaskStatus>().map_err(|e| corrupt("task", e))? {
                TaskStatus::Queued => counts.queued = n,
                TaskStatus::Processing => counts.processing = n,
                TaskStatus::Completed => counts.completed = n,
                TaskStatus::Failed => counts.failed = n,
            }
            counts.total += n;
        }
        Ok(counts)
    }

    async fn recent_tasks(&self, limit: usize) -> Result<Vec<AnalysisTask>, StoreError> {
        let rows = sqlx::query("SELECT * FROM analysis_tasks ORDER BY seq")
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        let mut tasks = rows
            .iter()
            .map(task_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        tasks.truncate(limit);
        Ok(tasks)
    }
}

#[async_trait]
impl LinkStore for SqliteStore {
    async fn link_exists(
        &self,
        source: DocumentId,
        target: DocumentId,
    ) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM link_candidates WHERE source_document_id = ? AND target_document_id = ?",
        )
        .bind(source.get())
        .bind(target.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        Ok(found.is_some())
    }

    async fn insert_link(&self, link: LinkCandidate) -> Result<bool, StoreError> {
        let position = i64::try_from(link.link_position).map_err(|e| corrupt("link", e))?;
        let result = sqlx::query(
            "INSERT INTO link_candidates
                (id, source_document_id, target_document_id, link_text, link_position,
                 alt_text, confidence, reasoning, status, created_at, reviewed_at, reviewed_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (source_document_id, target_document_id) DO NOTHING",
        )
        .bind(link.id.to_string())
        .bind(link.source_document_id.get())
        .bind(link.target_document_id.get())
        .bind(&link.link_text)
        .bind(position)
        .bind(&link.alt_text)
        .bind(i64::from(link.confidence))
        .bind(&link.reasoning)
        .bind(link.status.as_str())
        .bind(link.created_at)
        .bind(link.reviewed_at)
        .bind(&link.reviewed_by)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_link(&self, id: LinkId) -> Result<Option<LinkCandidate>, StoreError> {
        sqlx::query("SELECT * FROM link_candidates WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .as_ref()
            .map(link_from_row)
            .transpose()
    }

    async fn list_links(&self, filter: &LinkFilter) -> Result<Vec<LinkCandidate>, StoreError> {
        let document = filter.document_id.map(DocumentId::get);
        let status = filter.status.map(LinkStatus::as_str);
        let rows = sqlx::query(
            "SELECT * FROM link_candidates
             WHERE (?1 IS NULL OR source_document_id = ?1 OR target_document_id = ?1)
               AND (?2 IS NULL OR status = ?2)",
        )
        .bind(document)
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        let mut links = rows
            .iter()
            .map(link_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        links.sort_by(listing_order);
        Ok(links)
    }

    async fn review_links(
        &self,
        ids: &[LinkId],
        status: LinkStatus,
        reviewer: &str,
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let mut updated = 0u64;
        for id in ids {
            let result = sqlx::query(
                "UPDATE link_candidates
                 SET status = ?, reviewed_at = ?, reviewed_by = ?
                 WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(at)
            .bind(reviewer)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db)?;
            updated += result.rows_affected();
        }
        tx.commit().await.map_err(db)?;
        usize::try_from(updated).map_err(|e| corrupt("link", e))
    }
}
