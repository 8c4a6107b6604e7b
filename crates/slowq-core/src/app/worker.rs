use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::manager::JobManager;

/// Worker group handle.
/// - `request_shutdown()`（または handle の drop）でワーカー全体が止まる
/// - in-flight の processor 実行は強制キャンセルしない（新しい dequeue をやめるだけ）
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `config.workers` worker loops, plus the pending sweep if enabled.
    pub(crate) fn spawn(manager: Arc<JobManager>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let n = manager.config().workers;

        let mut joins = Vec::with_capacity(n + 1);
        for worker_id in 0..n {
            let m = Arc::clone(&manager);
            let rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                m.run(worker_id, rx).await;
            }));
        }

        if let Some(interval) = manager.config().sweep_interval {
            let m = Arc::clone(&manager);
            let rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                sweep_loop(m, interval, rx).await;
            }));
        }

        info!(workers = n, "worker group started");
        Self { shutdown_tx, joins }
    }

    /// Number of spawned tasks (workers + sweeper).
    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            if let Err(e) = j.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
        info!("worker group stopped");
    }
}

/// Re-enqueue signals for jobs still `Queued` (lost or failed enqueues).
async fn sweep_loop(
    manager: Arc<JobManager>,
    interval: std::time::Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // 最初の tick は即時に返るので読み捨てる
    ticker.tick().await;
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }
        match manager.requeue_pending().await {
            Ok(0) => {}
            Ok(n) => debug!(requeued = n, "pending sweep"),
            Err(e) => warn!(error = %e, "pending sweep failed"),
        }
    }
}
