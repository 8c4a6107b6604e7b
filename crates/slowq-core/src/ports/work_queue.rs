//! WorkQueue port - 配送キュー（Redis list または InMemory）
//!
//! WorkQueue は request_id のみを流します（状態や payload は含まない）。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::RequestId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("work queue unavailable: {0}")]
    Unavailable(String),
}

/// Best-effort, at-least-once delivery of "job is ready" signals.
///
/// # 設計原則
/// - request_id のみを保持（正本は JobStore）
/// - 同じ id が複数回届いても良い（claim が弾く）
/// - blocking dequeue（timeout 付き）
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, request_id: RequestId) -> Result<(), QueueError>;

    /// Remove one signal, waiting up to `timeout`. `Ok(None)` on timeout.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<RequestId>, QueueError>;
}
