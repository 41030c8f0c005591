//! Analyzer - 1 文書を残りのコーパス全体と突き合わせる
//!
//! # フロー
//! 1. ソース文書を読む（本文がなければ "no content" でタスクを失敗にする）
//! 2. 本文のある他の文書それぞれについて
//!    - 既存候補があれば飛ばす
//!    - 分類器に問い合わせる（ペア単位のタイムアウト付き）
//!    - 採用条件（should_link かつ confidence >= 70）を満たせば位置を特定し
//!      マークアップと重ならなければ pending 候補として保存
//!    - 1 ペア終わるごとに進捗を書き込む
//! 3. タスクを completed にする
//!
//! ペア単位の失敗（分類器エラー、書き込み競合）はログに残して次へ進みます。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::anchoring::{find_link_position, overlaps_markup};
use crate::domain::{
    AnalysisReport, AnalysisTask, ClassificationRequest, Document, DocumentId, ErrorKind,
    LinkCandidate, LinkStatus, PairOutcome, SkipReason, progress_percent,
};
use crate::observability::ANALYZER_TARGET;
use crate::ports::{Classifier, ClassifyError, Clock, IdGenerator, Store, StoreError};
use crate::queue::TaskProcessor;

const DEFAULT_CLASSIFY_TIMEOUT_SECS: u64 = 120;

/// Analyzer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Upper bound on a single classifier call; exceeding it skips the pair.
    pub classify_timeout: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            classify_timeout: Duration::from_secs(DEFAULT_CLASSIFY_TIMEOUT_SECS),
        }
    }
}

impl AnalyzerConfig {
    /// Reads `LINKWEAVER_CLASSIFY_TIMEOUT_SECS`; unset or invalid keeps the default.
    pub fn from_env() -> Self {
        let secs = std::env::var("LINKWEAVER_CLASSIFY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_CLASSIFY_TIMEOUT_SECS);
        Self {
            classify_timeout: Duration::from_secs(secs),
        }
    }

    pub fn with_classify_timeout(mut self, timeout: Duration) -> Self {
        self.classify_timeout = timeout;
        self
    }
}

/// Failures that end a whole task.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("no content")]
    NoContent { document_id: DocumentId },

    #[error("source document {0} not found")]
    SourceMissing(DocumentId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::NoContent { .. } | AnalysisError::SourceMissing(_) => {
                ErrorKind::Precondition
            }
            AnalysisError::Store(_) => ErrorKind::Infrastructure,
        }
    }
}

/// Document Relation Analyzer.
pub struct DocumentRelationAnalyzer {
    store: Arc<dyn Store>,
    classifier: Arc<dyn Classifier>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: AnalyzerConfig,
}

impl DocumentRelationAnalyzer {
    pub fn new(
        store: Arc<dyn Store>,
        classifier: Arc<dyn Classifier>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            classifier,
            clock,
            ids,
            config: AnalyzerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AnalyzerConfig) -> Self {
        self.config = config;
        self
    }

    /// Evaluate `task.document_id` against every other document with content.
    ///
    /// The task must already be claimed. On success the task is completed;
    /// on `Err` the caller is responsible for failing it.
    pub async fn analyze(&self, task: &AnalysisTask) -> Result<AnalysisReport, AnalysisError> {
        let source = self
            .store
            .get_document(task.document_id)
            .await?
            .ok_or(AnalysisError::SourceMissing(task.document_id))?;
        let Some(source_content) = source.body() else {
            return Err(AnalysisError::NoContent {
                document_id: source.id,
            });
        };

        let targets: Vec<Document> = self
            .store
            .list_documents()
            .await?
            .into_iter()
            .filter(|d| d.id != source.id && d.body().is_some())
            .collect();

        let mut report = AnalysisReport::new(targets.len());
        for target in &targets {
            let outcome = self.evaluate_pair(&source, source_content, target).await;
            match &outcome {
                PairOutcome::Errored { message } => warn!(
                    target: ANALYZER_TARGET,
                    task_id = %task.id,
                    document_id = %source.id,
                    target_id = %target.id,
                    error = %message,
                    "pair skipped after error"
                ),
                other => debug!(
                    target: ANALYZER_TARGET,
                    task_id = %task.id,
                    document_id = %source.id,
                    target_id = %target.id,
                    outcome = ?other,
                    "pair evaluated"
                ),
            }
            report.record(&outcome);

            let progress = progress_percent(report.processed(), report.targets);
            if let Err(err) = self
                .store
                .update_progress(task.id, progress, self.clock.now())
                .await
            {
                // progress is advisory; the next target writes it again
                warn!(
                    target: ANALYZER_TARGET,
                    task_id = %task.id,
                    target_id = %target.id,
                    progress,
                    error = %err,
                    "progress write failed"
                );
            }
        }

        if !self.store.complete_task(task.id, self.clock.now()).await? {
            warn!(
                target: ANALYZER_TARGET,
                task_id = %task.id,
                "task left processing before completion"
            );
        }
        info!(
            target: ANALYZER_TARGET,
            task_id = %task.id,
            document_id = %source.id,
            targets = report.targets,
            accepted = report.accepted,
            rejected = report.rejected,
            skipped = report.skipped,
            errors = report.errors,
            "document analyzed"
        );
        Ok(report)
    }

    async fn evaluate_pair(
        &self,
        source: &Document,
        source_content: &str,
        target: &Document,
    ) -> PairOutcome {
        match self.store.link_exists(source.id, target.id).await {
            Ok(true) => {
                return PairOutcome::Skipped {
                    reason: SkipReason::ExistingCandidate,
                };
            }
            Ok(false) => {}
            Err(err) => return errored(err),
        }

        let Some(target_content) = target.body() else {
            return PairOutcome::Rejected;
        };
        let request = ClassificationRequest {
            source_name: &source.name,
            source_content,
            target_name: &target.name,
            target_content,
        };
        let timeout = self.config.classify_timeout;
        let classification =
            match tokio::time::timeout(timeout, self.classifier.classify(request)).await {
                Ok(Ok(classification)) => classification,
                Ok(Err(err)) => return errored(err),
                Err(_) => return errored(ClassifyError::Timeout(timeout)),
            };

        if !classification.is_acceptable() {
            return PairOutcome::Rejected;
        }

        let link_text = classification.link_text.as_str();
        let Some(position) = find_link_position(source_content, link_text) else {
            return PairOutcome::Skipped {
                reason: SkipReason::PhraseNotFound,
            };
        };
        if overlaps_markup(source_content, position, link_text.len()) {
            return PairOutcome::Skipped {
                reason: SkipReason::AlreadyAnchored,
            };
        }

        let candidate = LinkCandidate {
            id: self.ids.generate_link_id(),
            source_document_id: source.id,
            target_document_id: target.id,
            link_text: link_text.to_string(),
            link_position: position,
            alt_text: classification.alt_text,
            confidence: classification.confidence,
            reasoning: classification.reasoning,
            status: LinkStatus::Pending,
            created_at: self.clock.now(),
            reviewed_at: None,
            reviewed_by: None,
        };
        match self.store.insert_link(candidate).await {
            Ok(true) => PairOutcome::Accepted,
            Ok(false) => PairOutcome::Skipped {
                reason: SkipReason::DuplicatePair,
            },
            Err(err) => errored(err),
        }
    }
}

fn errored(err: impl std::fmt::Display) -> PairOutcome {
    PairOutcome::Errored {
        message: err.to_string(),
    }
}

#[async_trait]
impl TaskProcessor for DocumentRelationAnalyzer {
    async fn process(&self, task: &AnalysisTask) -> Result<AnalysisReport, AnalysisError> {
        self.analyze(task).await
    }
}
