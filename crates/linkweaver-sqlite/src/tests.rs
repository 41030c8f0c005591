use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rstest::rstest;
use ulid::Ulid;

use linkweaver_core::analyzer::DocumentRelationAnalyzer;
use linkweaver_core::domain::{
    AnalysisTask, Classification, Document, DocumentId, LinkCandidate, LinkFilter, LinkId,
    LinkStatus, TaskId, TaskStatus,
};
use linkweaver_core::impls::ScriptedClassifier;
use linkweaver_core::ports::{
    Clock, DocumentStore, LinkStore, StoreError, SystemClock, TaskStore, UlidGenerator,
};
use linkweaver_core::queue::{AnalysisQueue, PoolConfig};

use crate::SqliteStore;

async fn store() -> SqliteStore {
    SqliteStore::connect_in_memory().await.unwrap()
}

fn task(document: i64) -> AnalysisTask {
    AnalysisTask::new(TaskId::from_ulid(Ulid::new()), DocumentId(document), Utc::now())
}

fn link(source: i64, target: i64, confidence: u8, minute: u32) -> LinkCandidate {
    LinkCandidate {
        id: LinkId::from_ulid(Ulid::new()),
        source_document_id: DocumentId(source),
        target_document_id: DocumentId(target),
        link_text: "SBA loan".into(),
        link_position: 12,
        alt_text: "SBA loans".into(),
        confidence,
        reasoning: "related".into(),
        status: LinkStatus::Pending,
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap(),
        reviewed_at: None,
        reviewed_by: None,
    }
}

fn doc(id: i64, name: &str, content: Option<&str>) -> Document {
    Document::new(
        DocumentId(id),
        name,
        name.to_lowercase(),
        content.map(str::to_string),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, id as u32).unwrap(),
    )
}

#[tokio::test]
async fn concurrent_claims_have_exactly_one_winner() {
    let store = Arc::new(store().await);
    let t = task(1);
    let id = t.id;
    store.insert_tasks(vec![t]).await.unwrap();

    let mut joins = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        joins.push(tokio::spawn(async move { store.claim(id, Utc::now()).await }));
    }
    let mut wins = 0;
    for join in joins {
        if join.await.unwrap().unwrap() {
            wins += 1;
        }
    }

    assert_eq!(wins, 1);
    let claimed = store.get_task(id).await.unwrap().unwrap();
    assert_eq!(claimed.status, TaskStatus::Processing);
    assert!(claimed.started_at.is_some());
}

#[tokio::test]
async fn next_queued_is_oldest_unclaimed() {
    let store = store().await;
    let tasks: Vec<AnalysisTask> = (1..=3).map(task).collect();
    let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
    store.insert_tasks(tasks).await.unwrap();

    assert_eq!(store.next_queued().await.unwrap().unwrap().id, ids[0]);
    assert!(store.claim(ids[0], Utc::now()).await.unwrap());
    assert_eq!(store.next_queued().await.unwrap().unwrap().id, ids[1]);
}

#[tokio::test]
async fn task_lifecycle_round_trips() {
    let store = store().await;
    let t = task(7);
    let id = t.id;
    store.insert_tasks(vec![t]).await.unwrap();
    store.claim(id, Utc::now()).await.unwrap();

    store.update_progress(id, 40, Utc::now()).await.unwrap();
    store.update_progress(id, 10, Utc::now()).await.unwrap();
    assert_eq!(store.get_task(id).await.unwrap().unwrap().progress, 40);

    assert!(store.fail_task(id, "no content", Utc::now()).await.unwrap());
    assert!(!store.complete_task(id, Utc::now()).await.unwrap());

    let failed = store.get_task(id).await.unwrap().unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("no content"));
    assert!(failed.completed_at.is_some());

    let counts = store.task_counts().await.unwrap();
    assert_eq!((counts.total, counts.failed), (1, 1));
}

#[rstest]
#[case::complete(true)]
#[case::fail(false)]
#[tokio::test]
async fn unknown_task_is_not_found(#[case] complete: bool) {
    let store = store().await;
    let id = TaskId::from_ulid(Ulid::new());

    let err = if complete {
        store.complete_task(id, Utc::now()).await.unwrap_err()
    } else {
        store.fail_task(id, "boom", Utc::now()).await.unwrap_err()
    };

    assert!(matches!(err, StoreError::NotFound { entity: "task", .. }));
}

#[tokio::test]
async fn duplicate_pair_insert_affects_no_rows() {
    let store = store().await;

    assert!(store.insert_link(link(1, 2, 80, 0)).await.unwrap());
    assert!(!store.insert_link(link(1, 2, 95, 1)).await.unwrap());
    assert!(store.insert_link(link(2, 1, 80, 2)).await.unwrap());

    assert!(store.link_exists(DocumentId(1), DocumentId(2)).await.unwrap());
    let all = store.list_links(&LinkFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn listing_orders_by_confidence_then_recency() {
    let store = store().await;
    store.insert_link(link(1, 2, 75, 0)).await.unwrap();
    store.insert_link(link(1, 3, 90, 1)).await.unwrap();
    store.insert_link(link(4, 1, 75, 5)).await.unwrap();
    store.insert_link(link(5, 6, 99, 9)).await.unwrap();

    let links = store
        .list_links(&LinkFilter::for_document(DocumentId(1)))
        .await
        .unwrap();

    let pairs: Vec<(i64, i64)> = links
        .iter()
        .map(|l| (l.source_document_id.get(), l.target_document_id.get()))
        .collect();
    assert_eq!(pairs, vec![(1, 3), (4, 1), (1, 2)]);
}

#[tokio::test]
async fn review_stamps_status_and_reviewer() {
    let store = store().await;
    let a = link(1, 2, 90, 0);
    let b = link(1, 3, 80, 1);
    let ids = [a.id, b.id, LinkId::from_ulid(Ulid::new())];
    store.insert_link(a).await.unwrap();
    store.insert_link(b).await.unwrap();

    let updated = store
        .review_links(&ids, LinkStatus::Rejected, "user", Utc::now())
        .await
        .unwrap();

    assert_eq!(updated, 2);
    let rejected = store
        .list_links(&LinkFilter::default().with_status(LinkStatus::Rejected))
        .await
        .unwrap();
    assert_eq!(rejected.len(), 2);
    assert!(rejected.iter().all(|l| l.reviewed_by.as_deref() == Some("user")));
    assert!(rejected.iter().all(|l| l.reviewed_at.is_some()));
}

#[tokio::test]
async fn reset_run_clears_tasks_and_links_but_not_documents() {
    let store = store().await;
    store.upsert_document(doc(1, "Loans", Some("x"))).await.unwrap();
    store.insert_tasks(vec![task(1)]).await.unwrap();
    store.insert_link(link(1, 2, 80, 0)).await.unwrap();

    store.reset_run().await.unwrap();

    assert_eq!(store.task_counts().await.unwrap().total, 0);
    assert!(!store.link_exists(DocumentId(1), DocumentId(2)).await.unwrap());
    assert_eq!(store.list_documents().await.unwrap().len(), 1);
}

#[tokio::test]
async fn upsert_keeps_original_creation_time() {
    let store = store().await;
    let original = doc(1, "Loans", Some("first"));
    store.upsert_document(original.clone()).await.unwrap();

    let mut edited = doc(1, "Loans", Some("second"));
    edited.created_at = Utc::now();
    edited.updated_at = Utc::now();
    store.upsert_document(edited).await.unwrap();

    let stored = store.get_document(DocumentId(1)).await.unwrap().unwrap();
    assert_eq!(stored.content.as_deref(), Some("second"));
    assert_eq!(stored.created_at, original.created_at);
}

#[tokio::test]
async fn pool_runs_to_completion_on_sqlite() {
    let store = Arc::new(store().await);
    for d in [
        doc(1, "Loans", Some("Small businesses often need an SBA loan.")),
        doc(2, "Guide", Some("How SBA loans work.")),
        doc(3, "Empty", None),
    ] {
        store.upsert_document(d).await.unwrap();
    }
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let classifier = ScriptedClassifier::new().respond(
        "Loans",
        "Guide",
        Classification::link("SBA loan", "SBA loans explained", 90),
    );
    let analyzer = DocumentRelationAnalyzer::new(
        store.clone(),
        Arc::new(classifier),
        clock.clone(),
        Arc::new(UlidGenerator::new(SystemClock)),
    );
    let queue = AnalysisQueue::new(
        store.clone(),
        Arc::new(analyzer),
        clock,
        Arc::new(UlidGenerator::new(SystemClock)),
        PoolConfig::default()
            .with_workers(4)
            .with_idle_backoff(Duration::from_millis(10)),
    );
    let ids: Vec<DocumentId> = store
        .list_documents()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    queue.enqueue_run(&ids).await.unwrap();

    let report = queue.start().await.unwrap();

    assert_eq!((report.processed, report.failed), (2, 1));
    let status = queue.status().await.unwrap();
    assert_eq!(status.total, 3);
    assert_eq!(status.completed, 2);
    assert_eq!(status.failed, 1);
    let links = store.list_links(&LinkFilter::default()).await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].link_position, 31);
}
