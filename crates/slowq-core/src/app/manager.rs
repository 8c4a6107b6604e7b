//! JobManager - 受付（submit / poll）と実行ループ（run）
//!
//! # フロー
//! 1. register_initializer / register_processor（起動時）
//! 2. submit: processor の存在確認 → JobStore::create → WorkQueue::enqueue
//! 3. run: dequeue → claim → InitBlock 解決 → processor 実行 → complete
//! 4. poll: JobStore::get を読むだけ
//!
//! ひとつのジョブの失敗（エラー・panic・初期化失敗）は Failed として記録され、
//! ループや他のジョブには波及しない。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::config::EngineConfig;
use super::worker::WorkerGroup;
use crate::domain::{
    AppName, Document, EngineError, ErrorMessage, JobOutcome, JobRecord, JobStatus,
    OpName, PollOutcome, RequestId,
};
use crate::impls::{InMemoryJobStore, InMemoryWorkQueue};
use crate::observability::JobCounts;
use crate::ports::{JobStore, StoreError, WorkQueue};
use crate::registry::{
    CloseErrors, ExecuteError, InitBlockCache, Initializer, InitializerRegistry, Processor,
    ProcessorRegistry,
};

/// The orchestrator. Owns the registries and the InitBlock cache; talks to
/// the store and queue collaborators through their ports.
///
/// # 使用例
/// ```ignore
/// let manager = Arc::new(JobManager::in_memory(EngineConfig::default()));
/// manager.register_initializer("broadside", BroadsideInitializer)?;
/// manager.register_processor("broadside", "bouncerpt", BounceReport)?;
///
/// let workers = manager.spawn_workers();
/// let id = manager.submit("broadside", "bouncerpt", context, input).await?;
/// while manager.poll(id).await?.is_pending() { sleep(interval).await; }
/// manager.shutdown(workers).await?;
/// ```
pub struct JobManager {
    processors: ProcessorRegistry,
    initializers: Arc<InitializerRegistry>,
    blocks: InitBlockCache,
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    config: EngineConfig,
}

impl JobManager {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn WorkQueue>, config: EngineConfig) -> Self {
        let initializers = Arc::new(InitializerRegistry::new());
        Self {
            processors: ProcessorRegistry::new(),
            blocks: InitBlockCache::new(Arc::clone(&initializers)),
            initializers,
            store,
            queue,
            config,
        }
    }

    /// Engine backed by the in-process store and queue.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(InMemoryWorkQueue::new()),
            config,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn initializers(&self) -> &InitializerRegistry {
        &self.initializers
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    pub fn init_blocks(&self) -> &InitBlockCache {
        &self.blocks
    }

    // ------------------------------------------------------------------
    // registration
    // ------------------------------------------------------------------

    pub fn register_initializer<I: Initializer>(
        &self,
        app: impl Into<AppName>,
        initializer: I,
    ) -> Result<(), EngineError> {
        self.initializers.register(app.into(), initializer)
    }

    pub fn register_processor<P: Processor>(
        &self,
        app: impl Into<AppName>,
        op: impl Into<OpName>,
        processor: P,
    ) -> Result<(), EngineError> {
        self.processors.register(app.into(), op.into(), processor)
    }

    // ------------------------------------------------------------------
    // client side
    // ------------------------------------------------------------------

    /// Persist a new job and signal the workers. Returns immediately.
    ///
    /// Fails with `ProcessorNotFound` before anything is persisted when no
    /// processor is registered for (app, op). A failed enqueue is logged
    /// only: the job is durable and the pending sweep redelivers it.
    pub async fn submit(
        &self,
        app: impl Into<AppName>,
        op: impl Into<OpName>,
        context: Document,
        input: Document,
    ) -> Result<RequestId, EngineError> {
        let (app, op) = (app.into(), op.into());
        if !self.processors.contains(&app, &op) {
            warn!(%app, %op, "submit rejected: no processor");
            return Err(EngineError::ProcessorNotFound { app, op });
        }

        let created = self
            .store
            .create(app.clone(), op.clone(), context.clone(), input.clone())
            .await;
        let request_id = match created {
            Err(StoreError::DuplicateId(dup)) => {
                warn!(request_id = %dup, "request id collided, retrying with a fresh one");
                self.store.create(app.clone(), op.clone(), context, input).await?
            }
            other => other?,
        };

        if let Err(e) = self.queue.enqueue(request_id).await {
            warn!(%request_id, error = %e, "enqueue failed, left for pending sweep");
        }
        info!(%request_id, %app, %op, "job submitted");
        Ok(request_id)
    }

    /// Non-blocking status check: try-later, success or failure.
    pub async fn poll(&self, request_id: RequestId) -> Result<PollOutcome, EngineError> {
        Ok(self.job(request_id).await?.poll_outcome())
    }

    /// Full record, including output files and timestamps.
    pub async fn job(&self, request_id: RequestId) -> Result<JobRecord, EngineError> {
        self.store
            .get(request_id)
            .await?
            .ok_or(EngineError::RequestNotFound(request_id))
    }

    pub async fn counts(&self) -> Result<JobCounts, EngineError> {
        Ok(self.store.counts().await?)
    }

    /// Re-enqueue a signal for every job still `Queued` (one batch).
    pub async fn requeue_pending(&self) -> Result<usize, EngineError> {
        let ids = self.store.queued_ids(self.config.sweep_batch).await?;
        for request_id in &ids {
            self.queue.enqueue(*request_id).await?;
        }
        Ok(ids.len())
    }

    // ------------------------------------------------------------------
    // worker side
    // ------------------------------------------------------------------

    /// Spawn worker loops (and the pending sweep) on the current runtime.
    pub fn spawn_workers(self: &Arc<Self>) -> WorkerGroup {
        WorkerGroup::spawn(Arc::clone(self))
    }

    /// Stop the workers, wait for in-flight jobs, then close every cached
    /// InitBlock. Returns the number of blocks closed.
    pub async fn shutdown(&self, workers: WorkerGroup) -> Result<usize, CloseErrors> {
        workers.shutdown_and_join().await;
        self.blocks.close_all().await
    }

    /// One worker loop. Runs until `shutdown` flips to true (or its sender
    /// is dropped).
    pub async fn run(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(worker_id, "worker started");
        let mut failures: u32 = 0;
        loop {
            // shutdown が来ていたら抜ける
            if *shutdown.borrow() {
                break;
            }

            // dequeue は「待つ」ので select で shutdown と競合させる
            let dequeued = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                d = self.queue.dequeue(self.config.dequeue_timeout) => d,
            };

            let result = match dequeued {
                Ok(Some(request_id)) => self
                    .process_with_shutdown(request_id, &mut shutdown)
                    .await
                    .map(|_| ()),
                Ok(None) => Ok(()),
                Err(e) => Err(EngineError::from(e)),
            };

            match result {
                Ok(()) => failures = 0,
                Err(e) if e.kind().is_transient() => {
                    failures = failures.saturating_add(1);
                    let delay = self.config.backoff.next_delay(failures);
                    warn!(worker_id, error = %e, ?delay, "collaborator unavailable, backing off");
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    failures = 0;
                    error!(worker_id, error = %e, "job bookkeeping failed");
                }
            }
        }
        debug!(worker_id, "worker stopped");
    }

    /// Claim and execute one job.
    ///
    /// `Ok(None)` when the claim is lost (duplicate or stale signal);
    /// otherwise the terminal status that was persisted. Only store errors
    /// are returned as `Err`; job failures are outcomes. The completion is
    /// retried until the store accepts it.
    pub async fn process_one(&self, request_id: RequestId) -> Result<Option<JobStatus>, EngineError> {
        // 誰も shutdown を送らない receiver（_tx が生きている間は changed() が返らない）
        let (_tx, mut shutdown) = watch::channel(false);
        self.process_with_shutdown(request_id, &mut shutdown).await
    }

    async fn process_with_shutdown(
        &self,
        request_id: RequestId,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<JobStatus>, EngineError> {
        let Some(job) = self.store.claim(request_id).await? else {
            debug!(%request_id, "signal discarded: claim lost");
            return Ok(None);
        };
        let (app, op) = (job.app.clone(), job.op.clone());
        debug!(%request_id, %app, %op, "job claimed");

        let outcome = self.execute(job).await;
        let status = outcome.status();
        self.persist(request_id, outcome, shutdown).await?;

        match status {
            JobStatus::Success => info!(%request_id, %app, %op, "job succeeded"),
            _ => info!(%request_id, %app, %op, ?status, "job failed"),
        }
        Ok(Some(status))
    }

    /// Resolve block and processor, run it; every failure becomes an outcome.
    async fn execute(&self, job: JobRecord) -> JobOutcome {
        let request_id = job.request_id;
        let block = match self.blocks.resolve(&job.app).await {
            Ok(block) => block,
            Err(e) => {
                warn!(%request_id, app = %job.app, error = %e, "init block unavailable");
                return JobOutcome::failed_with(ErrorMessage::INIT_FAILED, e.to_string());
            }
        };
        let processor = match self.processors.lookup(&job.app, &job.op) {
            Ok(p) => p,
            Err(e) => {
                return JobOutcome::failed_with(ErrorMessage::PROCESSOR_NOT_FOUND, e.to_string());
            }
        };

        // processor は別タスクで動かし、panic も JoinError として受け取る
        let JobRecord { context, input, .. } = job;
        let joined =
            tokio::spawn(async move { processor.execute_dyn(&block, &context, &input).await })
                .await;

        match joined {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e @ ExecuteError::BlockTypeMismatch { .. })) => {
                error!(%request_id, error = %e, kind = ?e.kind(), "processor registered against the wrong block type");
                JobOutcome::failed_with(ErrorMessage::BLOCK_TYPE_MISMATCH, e.to_string())
            }
            Ok(Err(e @ ExecuteError::Failed(_))) => {
                warn!(%request_id, error = %e, kind = ?e.kind(), "processor returned an error");
                JobOutcome::failed_with(ErrorMessage::PROCESSOR_FAILED, e.to_string())
            }
            Err(join_err) if join_err.is_panic() => {
                error!(%request_id, "processor panicked");
                JobOutcome::failed_with(ErrorMessage::PROCESSOR_PANICKED, "processor panicked")
            }
            Err(join_err) => {
                JobOutcome::failed_with(ErrorMessage::PROCESSOR_FAILED, join_err.to_string())
            }
        }
    }

    /// `complete`, retried with back-off while the store is unavailable.
    ///
    /// The outcome is only given up when shutdown is requested mid-outage;
    /// the job then stays `InProgress`.
    async fn persist(
        &self,
        request_id: RequestId,
        outcome: JobOutcome,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), EngineError> {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let err = match self.store.complete(request_id, outcome.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => EngineError::from(e),
            };
            if !err.kind().is_transient() {
                error!(%request_id, error = %err, "completion rejected by store");
                return Err(err);
            }

            let delay = self.config.backoff.next_delay(attempt);
            if attempt >= self.config.completion_alert_after {
                error!(%request_id, error = %err, attempt, ?delay, "completion still not persisted");
            } else {
                warn!(%request_id, error = %err, attempt, ?delay, "completion not persisted, retrying");
            }

            if *shutdown.borrow() {
                error!(%request_id, attempt, "shutdown during store outage, outcome dropped");
                return Err(err);
            }
            tokio::select! {
                _ = shutdown.changed() => {
                    error!(%request_id, attempt, "shutdown during store outage, outcome dropped");
                    return Err(err);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
