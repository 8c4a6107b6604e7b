//! InMemoryWorkQueue - 開発用の配送キュー
//!
//! - Mutex<VecDeque> + Notify による blocking dequeue
//! - Notify は待機者がいなければ permit を 1 つ保持するので、
//!   enqueue と dequeue の間で通知が失われない

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::RequestId;
use crate::ports::{QueueError, WorkQueue};

pub struct InMemoryWorkQueue {
    signals: Mutex<VecDeque<RequestId>>,
    notify: Notify,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self {
            signals: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Number of undelivered signals.
    pub async fn len(&self) -> usize {
        self.signals.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn enqueue(&self, request_id: RequestId) -> Result<(), QueueError> {
        self.signals.lock().await.push_back(request_id);
        // 待機中のワーカーに通知（ロックの外で）
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<RequestId>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(request_id) = self.signals.lock().await.pop_front() {
                return Ok(Some(request_id));
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use ulid::Ulid;

    fn id() -> RequestId {
        RequestId::from_ulid(Ulid::new())
    }

    #[tokio::test]
    async fn enqueue_dequeue_is_fifo() {
        let queue = InMemoryWorkQueue::new();
        let (a, b) = (id(), id());
        queue.enqueue(a).await.unwrap();
        queue.enqueue(b).await.unwrap();

        let timeout = Duration::from_millis(100);
        assert_eq!(queue.dequeue(timeout).await.unwrap(), Some(a));
        assert_eq!(queue.dequeue(timeout).await.unwrap(), Some(b));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn dequeue_times_out_when_empty() {
        let queue = InMemoryWorkQueue::new();
        let start = Instant::now();
        let popped = queue.dequeue(Duration::from_millis(200)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn duplicates_are_delivered_twice() {
        let queue = InMemoryWorkQueue::new();
        let a = id();
        queue.enqueue(a).await.unwrap();
        queue.enqueue(a).await.unwrap();
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn enqueue_wakes_waiting_dequeue() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let a = id();

        let waiter = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.dequeue(Duration::from_secs(5)).await.unwrap() }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        queue.enqueue(a).await.unwrap();

        assert_eq!(waiter.await.unwrap(), Some(a));
    }
}
