use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{PoolConfig, PoolReport, QueueStatus, TaskProcessor};
use crate::domain::{AnalysisTask, DocumentId, DomainEvent};
use crate::observability::QUEUE_TARGET;
use crate::ports::{Clock, IdGenerator, Store, StoreError};

const EVENT_CAPACITY: usize = 256;

/// Job queue and worker pool.
///
/// Workers share nothing but the store: each loop selects the oldest queued
/// task and claims it with the store's conditional update. The only
/// in-process state is the running flag and an active-worker gauge.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct AnalysisQueue {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn Store>,
    processor: Arc<dyn TaskProcessor>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: PoolConfig,
    running: AtomicBool,
    active: AtomicUsize,
    shutdown_tx: watch::Sender<bool>,
    events: broadcast::Sender<DomainEvent>,
}

impl Inner {
    fn emit(&self, event: DomainEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

impl AnalysisQueue {
    pub fn new(
        store: Arc<dyn Store>,
        processor: Arc<dyn TaskProcessor>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: PoolConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                processor,
                clock,
                ids,
                config,
                running: AtomicBool::new(false),
                active: AtomicUsize::new(0),
                shutdown_tx,
                events,
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Delete every task and link candidate, then queue one task per id.
    ///
    /// Tasks are created in the order given, which is also the claim order.
    pub async fn enqueue_run(&self, document_ids: &[DocumentId]) -> Result<usize, StoreError> {
        self.inner.store.reset_run().await?;

        let now = self.inner.clock.now();
        let tasks: Vec<AnalysisTask> = document_ids
            .iter()
            .map(|&document_id| {
                AnalysisTask::new(self.inner.ids.generate_task_id(), document_id, now)
            })
            .collect();
        let count = tasks.len();
        self.inner.store.insert_tasks(tasks).await?;

        info!(target: QUEUE_TARGET, tasks = count, "run enqueued");
        Ok(count)
    }

    /// Take the running flag if nobody holds it.
    ///
    /// The flag is released when the returned permit is dropped, so a permit
    /// that is never launched does not wedge the pool.
    pub fn try_begin(&self) -> Option<RunPermit> {
        self.inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.inner.shutdown_tx.send_replace(false);
        Some(RunPermit {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Run the pool to completion. `None` if a run is already in progress.
    pub async fn start(&self) -> Option<PoolReport> {
        let permit = self.try_begin()?;
        Some(permit.run().await)
    }

    /// Stop claiming new tasks. In-flight tasks finish normally.
    pub fn stop(&self) {
        info!(target: QUEUE_TARGET, "stop requested");
        self.inner.shutdown_tx.send_replace(true);
    }

    /// Point-in-time counts read straight from the store.
    pub async fn status(&self) -> Result<QueueStatus, StoreError> {
        Ok(self.inner.store.task_counts().await?.into())
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn active_workers(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.inner.events.subscribe()
    }
}

/// Exclusive right to run the pool once.
pub struct RunPermit {
    inner: Arc<Inner>,
}

impl RunPermit {
    /// Spawn `workers` loops and wait until every loop exits.
    pub async fn run(self) -> PoolReport {
        let inner = Arc::clone(&self.inner);
        let workers = inner.config.workers.max(1);

        info!(target: QUEUE_TARGET, workers, "worker pool starting");
        inner.emit(DomainEvent::RunStarted { workers });

        let mut joins: Vec<JoinHandle<PoolReport>> = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let inner = Arc::clone(&inner);
            let shutdown_rx = inner.shutdown_tx.subscribe();
            joins.push(tokio::spawn(worker_loop(worker_id, inner, shutdown_rx)));
        }

        let mut report = PoolReport::default();
        for join in joins {
            match join.await {
                Ok(tally) => report.absorb(tally),
                Err(err) => error!(target: QUEUE_TARGET, error = %err, "worker loop aborted"),
            }
        }

        info!(
            target: QUEUE_TARGET,
            processed = report.processed,
            failed = report.failed,
            lost_claims = report.lost_claims,
            "worker pool stopped"
        );
        inner.emit(DomainEvent::RunStopped);
        report
    }

    /// Run in the background.
    pub fn launch(self) -> JoinHandle<PoolReport> {
        tokio::spawn(self.run())
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
    }
}

/// Keeps `active` accurate even if the loop unwinds.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(gauge: &'a AtomicUsize) -> Self {
        gauge.fetch_add(1, Ordering::AcqRel);
        Self(gauge)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

enum Claim {
    Claimed(AnalysisTask),
    Lost,
    Empty,
}

async fn claim_next(inner: &Inner) -> Result<Claim, StoreError> {
    let Some(task) = inner.store.next_queued().await? else {
        return Ok(Claim::Empty);
    };
    let started_at = inner.clock.now();
    if !inner.store.claim(task.id, started_at).await? {
        return Ok(Claim::Lost);
    }
    let mut task = task;
    task.claim(started_at);
    Ok(Claim::Claimed(task))
}

async fn worker_loop(
    worker_id: usize,
    inner: Arc<Inner>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> PoolReport {
    let _active = ActiveGuard::enter(&inner.active);
    let mut tally = PoolReport::default();

    loop {
        if *shutdown_rx.borrow() {
            debug!(target: QUEUE_TARGET, worker_id, "worker stopping on request");
            break;
        }

        match claim_next(&inner).await {
            Ok(Claim::Claimed(task)) => {
                execute(worker_id, &inner, task, &mut tally).await;
            }
            Ok(Claim::Lost) => {
                // another worker won the race; pick again
                tally.lost_claims += 1;
                tokio::task::yield_now().await;
            }
            Ok(Claim::Empty) => {
                if !idle(&inner, &mut shutdown_rx).await {
                    continue;
                }
                if inner.config.keep_warm {
                    continue;
                }
                match inner.store.task_counts().await {
                    Ok(counts) if counts.is_drained() => {
                        debug!(target: QUEUE_TARGET, worker_id, "run drained; worker exiting");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => report_worker_error(worker_id, &inner, &err),
                }
            }
            Err(err) => {
                report_worker_error(worker_id, &inner, &err);
                idle(&inner, &mut shutdown_rx).await;
            }
        }
    }

    tally
}

/// Sleep one backoff interval. Returns false if woken by a stop request.
async fn idle(inner: &Inner, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = shutdown_rx.changed() => false,
        _ = tokio::time::sleep(inner.config.idle_backoff) => true,
    }
}

async fn execute(worker_id: usize, inner: &Arc<Inner>, task: AnalysisTask, tally: &mut PoolReport) {
    let task_id = task.id;
    info!(
        target: QUEUE_TARGET,
        worker_id,
        task_id = %task_id,
        document_id = %task.document_id,
        "task claimed"
    );
    inner.emit(DomainEvent::TaskClaimed {
        worker_id,
        task_id,
        document_id: task.document_id,
    });

    // A panicking processor must not take the worker down with it.
    let processor = Arc::clone(&inner.processor);
    let outcome = tokio::spawn(async move { processor.process(&task).await }).await;

    let message = match outcome {
        Ok(Ok(_report)) => {
            tally.processed += 1;
            info!(target: QUEUE_TARGET, worker_id, task_id = %task_id, "task completed");
            inner.emit(DomainEvent::TaskCompleted { worker_id, task_id });
            return;
        }
        Ok(Err(err)) => {
            warn!(
                target: QUEUE_TARGET,
                worker_id,
                task_id = %task_id,
                kind = ?err.kind(),
                error = %err,
                "task failed"
            );
            err.to_string()
        }
        Err(join_err) => {
            error!(target: QUEUE_TARGET, worker_id, task_id = %task_id, error = %join_err, "task aborted");
            format!("task aborted: {join_err}")
        }
    };

    tally.failed += 1;
    match inner.store.fail_task(task_id, &message, inner.clock.now()).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(target: QUEUE_TARGET, worker_id, task_id = %task_id, "task was not processing when failing it");
        }
        Err(err) => report_worker_error(worker_id, inner, &err),
    }
    inner.emit(DomainEvent::TaskFailed {
        worker_id,
        task_id,
        error: message,
    });
}

fn report_worker_error(worker_id: usize, inner: &Inner, err: &StoreError) {
    warn!(target: QUEUE_TARGET, worker_id, error = %err, "worker store error");
    inner.emit(DomainEvent::WorkerError {
        worker_id,
        error: err.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::analyzer::AnalysisError;
    use crate::domain::{AnalysisReport, TaskId, TaskStatus};
    use crate::impls::InMemoryStore;
    use crate::ports::{SystemClock, TaskStore, UlidGenerator};

    /// Completes every task it is handed, except for `fail_for`.
    struct CountingProcessor {
        store: Arc<InMemoryStore>,
        seen: Mutex<HashMap<TaskId, usize>>,
        fail_for: Option<DocumentId>,
        delay: Duration,
    }

    impl CountingProcessor {
        fn new(store: Arc<InMemoryStore>) -> Self {
            Self {
                store,
                seen: Mutex::new(HashMap::new()),
                fail_for: None,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl TaskProcessor for CountingProcessor {
        async fn process(&self, task: &AnalysisTask) -> Result<AnalysisReport, AnalysisError> {
            *self.seen.lock().unwrap().entry(task.id).or_default() += 1;
            tokio::time::sleep(self.delay).await;
            if self.fail_for == Some(task.document_id) {
                return Err(AnalysisError::NoContent {
                    document_id: task.document_id,
                });
            }
            self.store.complete_task(task.id, Utc::now()).await?;
            Ok(AnalysisReport::new(0))
        }
    }

    fn fast_config(workers: usize) -> PoolConfig {
        PoolConfig::default()
            .with_workers(workers)
            .with_idle_backoff(Duration::from_millis(10))
    }

    fn queue(
        store: &Arc<InMemoryStore>,
        processor: Arc<CountingProcessor>,
        config: PoolConfig,
    ) -> AnalysisQueue {
        AnalysisQueue::new(
            store.clone(),
            processor,
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(SystemClock)),
            config,
        )
    }

    fn ids(n: i64) -> Vec<DocumentId> {
        (1..=n).map(DocumentId).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_task_is_processed_exactly_once() {
        let store = Arc::new(InMemoryStore::new());
        let processor = Arc::new(CountingProcessor::new(store.clone()));
        let q = queue(&store, processor.clone(), fast_config(8));
        q.enqueue_run(&ids(40)).await.unwrap();

        let report = q.start().await.unwrap();

        assert_eq!(report.processed, 40);
        assert_eq!(report.failed, 0);
        let seen = processor.seen.lock().unwrap();
        assert_eq!(seen.len(), 40);
        assert!(seen.values().all(|&n| n == 1));
        let status = q.status().await.unwrap();
        assert_eq!(status.completed, 40);
        assert_eq!(status.progress, 100.0);
        assert!(!q.is_running());
        assert_eq!(q.active_workers(), 0);
    }

    #[tokio::test]
    async fn failing_task_does_not_halt_the_run() {
        let store = Arc::new(InMemoryStore::new());
        let mut processor = CountingProcessor::new(store.clone());
        processor.fail_for = Some(DocumentId(2));
        let q = queue(&store, Arc::new(processor), fast_config(2));
        q.enqueue_run(&ids(3)).await.unwrap();

        let report = q.start().await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);
        let status = q.status().await.unwrap();
        assert_eq!(status.completed, 2);
        assert_eq!(status.failed, 1);
        let failed = store
            .recent_tasks(10)
            .await
            .unwrap()
            .into_iter()
            .find(|t| t.status == TaskStatus::Failed)
            .unwrap();
        assert_eq!(failed.document_id, DocumentId(2));
        assert_eq!(failed.error.as_deref(), Some("no content"));
        assert!(failed.completed_at.is_some());
    }

    #[tokio::test]
    async fn second_begin_is_refused_while_running() {
        let store = Arc::new(InMemoryStore::new());
        let q = queue(&store, Arc::new(CountingProcessor::new(store.clone())), fast_config(1));

        let permit = q.try_begin().unwrap();
        assert!(q.is_running());
        assert!(q.try_begin().is_none());
        assert!(q.start().await.is_none());

        drop(permit);
        assert!(!q.is_running());
        assert!(q.try_begin().is_some());
    }

    #[tokio::test]
    async fn empty_run_drains_immediately() {
        let store = Arc::new(InMemoryStore::new());
        let q = queue(&store, Arc::new(CountingProcessor::new(store.clone())), fast_config(3));
        q.enqueue_run(&[]).await.unwrap();

        let report = q.start().await.unwrap();

        assert_eq!(report, PoolReport::default());
        let status = q.status().await.unwrap();
        assert_eq!(status.total, 0);
        assert_eq!(status.progress, 0.0);
    }

    #[tokio::test]
    async fn stop_ends_a_warm_pool() {
        let store = Arc::new(InMemoryStore::new());
        let q = queue(
            &store,
            Arc::new(CountingProcessor::new(store.clone())),
            fast_config(2).with_keep_warm(true),
        );
        q.enqueue_run(&ids(2)).await.unwrap();

        let handle = q.try_begin().unwrap().launch();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(q.is_running());
        q.stop();

        let report = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.processed, 2);
        assert!(!q.is_running());
    }

    #[tokio::test]
    async fn stop_lets_in_flight_task_finish() {
        let store = Arc::new(InMemoryStore::new());
        let mut processor = CountingProcessor::new(store.clone());
        processor.delay = Duration::from_millis(100);
        let q = queue(&store, Arc::new(processor), fast_config(1));
        q.enqueue_run(&ids(3)).await.unwrap();

        let handle = q.try_begin().unwrap().launch();
        tokio::time::sleep(Duration::from_millis(30)).await;
        q.stop();
        let report = handle.await.unwrap();

        assert_eq!(report.processed, 1);
        let status = q.status().await.unwrap();
        assert_eq!(status.completed, 1);
        assert_eq!(status.queued, 2);
    }

    #[tokio::test]
    async fn enqueue_replaces_previous_run() {
        let store = Arc::new(InMemoryStore::new());
        let q = queue(&store, Arc::new(CountingProcessor::new(store.clone())), fast_config(2));
        q.enqueue_run(&ids(5)).await.unwrap();
        q.start().await.unwrap();

        let queued = q.enqueue_run(&ids(2)).await.unwrap();

        assert_eq!(queued, 2);
        let status = q.status().await.unwrap();
        assert_eq!(status.total, 2);
        assert_eq!(status.queued, 2);
        assert_eq!(status.completed, 0);
    }

    #[tokio::test]
    async fn lifecycle_events_are_broadcast() {
        let store = Arc::new(InMemoryStore::new());
        let q = queue(&store, Arc::new(CountingProcessor::new(store.clone())), fast_config(1));
        let mut events = q.subscribe();
        q.enqueue_run(&ids(1)).await.unwrap();

        q.start().await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.first(), Some(&DomainEvent::RunStarted { workers: 1 }));
        assert!(seen.iter().any(|e| matches!(e, DomainEvent::TaskClaimed { .. })));
        assert!(seen.iter().any(|e| matches!(e, DomainEvent::TaskCompleted { .. })));
        assert_eq!(seen.last(), Some(&DomainEvent::RunStopped));
    }
}
