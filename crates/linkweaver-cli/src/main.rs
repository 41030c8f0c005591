//! linkweaver - 文書間の意味的リンク候補を見つけ、レビューし、書き出す CLI
//!
//! # Commands
//! - `import`: JSON のコーパスを取り込む
//! - `analyze`: 全文書を再分析する（ワーカープールを起動して完了まで待つ）
//! - `status`: 直近の実行状況
//! - `links` / `review` / `approve-high-confidence`: 候補の一覧とレビュー
//! - `preview` / `export`: 承認済みリンクを反映した本文

mod classifier;
mod corpus;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use linkweaver_core::analyzer::{AnalyzerConfig, DocumentRelationAnalyzer};
use linkweaver_core::app::{DEFAULT_HREF_PREFIX, LinkService};
use linkweaver_core::domain::{
    Classification, ClassificationRequest, DocumentId, LinkFilter, LinkId, LinkStatus,
};
use linkweaver_core::ports::{
    Classifier, ClassifyError, Clock, DocumentStore, Store, SystemClock, UlidGenerator,
};
use linkweaver_core::queue::{AnalysisQueue, PoolConfig};
use linkweaver_sqlite::SqliteStore;

use crate::classifier::{DEFAULT_API_URL, DEFAULT_MODEL, MessagesClassifier, MessagesConfig};

const DEFAULT_DATABASE_URL: &str = "sqlite://linkweaver.db?mode=rwc";

#[derive(Parser, Debug)]
#[command(name = "linkweaver")]
#[command(about = "Discover, review and apply semantic links between documents")]
#[command(version, propagate_version = true)]
struct Cli {
    /// SQLite database holding documents, tasks and link candidates
    #[arg(long, env = "LINKWEAVER_DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    /// Address prefix for anchors (`{prefix}{slug}`)
    #[arg(long, env = "LINKWEAVER_HREF_PREFIX", default_value = DEFAULT_HREF_PREFIX)]
    href_prefix: String,

    #[command(flatten)]
    classifier: ClassifierArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct ClassifierArgs {
    /// API key for the classification endpoint (required by `analyze`)
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "LINKWEAVER_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, env = "LINKWEAVER_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import documents from a JSON array of {id, name, slug?, content?}
    Import { path: PathBuf },

    /// Re-analyze every document; previous tasks and candidates are discarded
    Analyze {
        /// Concurrent workers (defaults to LINKWEAVER_WORKERS or 10)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Show task counts and the most recently updated tasks
    Status,

    /// List link candidates
    Links {
        /// Only candidates where this document is source or target
        #[arg(long)]
        document: Option<i64>,

        /// pending, approved or rejected
        #[arg(long)]
        status: Option<LinkStatus>,
    },

    /// Set the review status of one or more candidates
    Review {
        #[arg(required = true)]
        ids: Vec<LinkId>,

        /// pending, approved or rejected
        #[arg(long)]
        status: LinkStatus,

        /// Reviewer name (defaults to "user")
        #[arg(long)]
        by: Option<String>,
    },

    /// Approve every pending candidate with confidence >= 85
    ApproveHighConfidence {
        #[arg(long)]
        by: Option<String>,
    },

    /// Print one document with approved and pending spans highlighted
    Preview { document: i64 },

    /// Write every document with its approved links applied, as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "linkweaver=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::connect(&cli.database_url)
            .await
            .with_context(|| format!("failed to open database {}", cli.database_url))?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (classifier, pool): (Arc<dyn Classifier>, PoolConfig) = match &cli.command {
        Command::Analyze { workers } => {
            let mut pool = PoolConfig::from_env();
            if let Some(workers) = *workers {
                pool = pool.with_workers(workers);
            }
            (messages_classifier(&cli.classifier)?, pool)
        }
        _ => (Arc::new(Unconfigured), PoolConfig::default()),
    };
    let service = build_service(&store, &clock, classifier, pool, &cli.href_prefix);

    match cli.command {
        Command::Import { path } => {
            let records = corpus::read_corpus(&path)?;
            let count = records.len();
            for record in records {
                store
                    .upsert_document(record.into_document(clock.now()))
                    .await
                    .context("failed to store document")?;
            }
            info!(count, path = %path.display(), "corpus imported");
        }

        Command::Analyze { .. } => {
            let queue = service.queue().clone();
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, finishing in-flight tasks");
                    queue.stop();
                }
            });

            let Some(report) = service
                .run_to_completion()
                .await
                .context("failed to start analysis")?
            else {
                bail!("an analysis run is already in progress");
            };
            info!(
                processed = report.processed,
                failed = report.failed,
                lost_claims = report.lost_claims,
                "analysis finished"
            );
            print_json(&service.run_status().await?.status)?;
        }

        Command::Status => print_json(&service.run_status().await?)?,

        Command::Links { document, status } => {
            let filter = LinkFilter {
                document_id: document.map(DocumentId),
                status,
            };
            print_json(&service.list_links(&filter).await?)?;
        }

        Command::Review { ids, status, by } => {
            let updated = service.review_links(&ids, status, by.as_deref()).await?;
            if updated < ids.len() {
                warn!(requested = ids.len(), updated, "some link ids were not found");
            }
            println!("{updated}");
        }

        Command::ApproveHighConfidence { by } => {
            let approved = service.approve_high_confidence(by.as_deref()).await?;
            println!("{approved}");
        }

        Command::Preview { document } => {
            let rendered = service.preview_document(DocumentId(document)).await?;
            println!("{}", rendered.content.unwrap_or_default());
        }

        Command::Export { out } => {
            let documents = service.export_documents().await?;
            let json = serde_json::to_string_pretty(&documents)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(count = documents.len(), path = %path.display(), "documents exported");
                }
                None => println!("{json}"),
            }
        }
    }

    Ok(())
}

fn build_service(
    store: &Arc<dyn Store>,
    clock: &Arc<dyn Clock>,
    classifier: Arc<dyn Classifier>,
    pool: PoolConfig,
    href_prefix: &str,
) -> LinkService {
    let analyzer = DocumentRelationAnalyzer::new(
        store.clone(),
        classifier,
        clock.clone(),
        Arc::new(UlidGenerator::new(SystemClock)),
    )
    .with_config(AnalyzerConfig::from_env());

    let queue = AnalysisQueue::new(
        store.clone(),
        Arc::new(analyzer),
        clock.clone(),
        Arc::new(UlidGenerator::new(SystemClock)),
        pool,
    );

    LinkService::new(store.clone(), queue, clock.clone()).with_href_prefix(href_prefix)
}

fn messages_classifier(args: &ClassifierArgs) -> Result<Arc<dyn Classifier>> {
    let api_key = args
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .context("ANTHROPIC_API_KEY (or --api-key) is required for analyze")?;
    let timeout = AnalyzerConfig::from_env().classify_timeout;

    let classifier = MessagesClassifier::new(MessagesConfig {
        api_url: args.api_url.clone(),
        api_key,
        model: args.model.clone(),
        // the analyzer's own per-pair timeout is the one that counts
        request_timeout: timeout + Duration::from_secs(5),
    })
    .context("failed to build HTTP client")?;
    Ok(Arc::new(classifier))
}

/// Stands in for the classifier on commands that never analyze.
struct Unconfigured;

#[async_trait]
impl Classifier for Unconfigured {
    async fn classify(
        &self,
        _request: ClassificationRequest<'_>,
    ) -> Result<Classification, ClassifyError> {
        Err(ClassifyError::Request("no classifier configured".into()))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
