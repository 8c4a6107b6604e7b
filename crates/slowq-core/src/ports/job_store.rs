//! JobStore port - 正本（source of truth）
//!
//! 本番では RDB の「現在の status が X なら更新」(UPDATE ... WHERE status = X)
//! で実装する想定です。in-memory 実装は `impls::InMemoryJobStore`。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    AppName, Document, ErrorKind, JobOutcome, JobRecord, JobStatus, OpName, RequestId,
};
use crate::observability::JobCounts;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(RequestId),

    #[error("request id already exists: {0}")]
    DuplicateId(RequestId),

    #[error("invalid transition for {request_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        request_id: RequestId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            // A colliding id is retried once by JobManager::submit, like an outage.
            StoreError::DuplicateId(_) | StoreError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}

/// Durable record of every submitted job.
///
/// # 設計原則
/// - `claim` は Queued -> InProgress の条件付き更新（勝者は 1 つだけ）
/// - `complete` は InProgress からのみ（二重完了は InvalidTransition）
/// - `get` は読むだけ（状態を変えない）
/// - レコードは削除しない（保持期間は外部の関心事）
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a fresh `Queued` record and return its identifier.
    async fn create(
        &self,
        app: AppName,
        op: OpName,
        context: Document,
        input: Document,
    ) -> Result<RequestId, StoreError>;

    /// Atomically move a `Queued` record to `InProgress`.
    ///
    /// `Ok(None)` when the record is missing or not `Queued`.
    async fn claim(&self, request_id: RequestId) -> Result<Option<JobRecord>, StoreError>;

    /// Move an `InProgress` record to its terminal status.
    async fn complete(&self, request_id: RequestId, outcome: JobOutcome) -> Result<(), StoreError>;

    async fn get(&self, request_id: RequestId) -> Result<Option<JobRecord>, StoreError>;

    /// Up to `limit` identifiers still `Queued`, oldest first.
    async fn queued_ids(&self, limit: usize) -> Result<Vec<RequestId>, StoreError>;

    async fn counts(&self) -> Result<JobCounts, StoreError>;
}
