//! InMemoryJobStore - プロセス内の正本
//!
//! 1 つの tokio Mutex で全レコードを守ります。ロックは各操作の中で完結し、
//! processor 実行を跨いで保持されることはありません。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{AppName, Document, JobOutcome, JobRecord, JobStatus, OpName, RequestId};
use crate::observability::JobCounts;
use crate::ports::{Clock, IdGenerator, JobStore, StoreError, SystemClock, UlidGenerator};

pub struct InMemoryJobStore {
    records: Mutex<HashMap<RequestId, JobRecord>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::with_parts(Arc::new(UlidGenerator::new(SystemClock)), Arc::new(SystemClock))
    }

    /// Build with explicit id generator and clock (tests).
    pub fn with_parts(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ids,
            clock,
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(
        &self,
        app: AppName,
        op: OpName,
        context: Document,
        input: Document,
    ) -> Result<RequestId, StoreError> {
        let request_id = self.ids.generate_request_id();
        let record = JobRecord::new(request_id, app, op, context, input, self.clock.now());

        let mut records = self.records.lock().await;
        if records.contains_key(&request_id) {
            return Err(StoreError::DuplicateId(request_id));
        }
        records.insert(request_id, record);
        Ok(request_id)
    }

    async fn claim(&self, request_id: RequestId) -> Result<Option<JobRecord>, StoreError> {
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(&request_id) else {
            return Ok(None);
        };
        if let Err(e) = record.claim(now) {
            debug!(%request_id, from = ?e.from, "claim skipped");
            return Ok(None);
        }
        Ok(Some(record.clone()))
    }

    async fn complete(&self, request_id: RequestId, outcome: JobOutcome) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&request_id)
            .ok_or(StoreError::NotFound(request_id))?;
        record
            .complete(outcome, now)
            .map_err(|e| StoreError::InvalidTransition {
                request_id,
                from: e.from,
                to: e.to,
            })
    }

    async fn get(&self, request_id: RequestId) -> Result<Option<JobRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.get(&request_id).cloned())
    }

    async fn queued_ids(&self, limit: usize) -> Result<Vec<RequestId>, StoreError> {
        let records = self.records.lock().await;
        let mut queued: Vec<&JobRecord> = records
            .values()
            .filter(|r| r.status == JobStatus::Queued)
            .collect();
        queued.sort_by_key(|r| (r.submitted_at, r.request_id));
        Ok(queued.into_iter().take(limit).map(|r| r.request_id).collect())
    }

    async fn counts(&self) -> Result<JobCounts, StoreError> {
        let records = self.records.lock().await;
        let mut counts = JobCounts::default();
        for record in records.values() {
            counts.record(record.status);
        }
        Ok(counts)
    }
}
