//! InitBlockCache - app ごとの InitBlock を一度だけ作って共有する
//!
//! # Single-flight
//! - app ごとに 1 つの slot（`tokio::sync::Mutex`）を持つ
//! - ロックは initializer の完了までだけ保持する（processor 実行には跨がない）
//! - 同時に待っていた敗者は、勝者の block かエラーをそのまま受け取る
//! - 失敗はキャッシュしない（次の resolve で再試行）
//! - evict / close_all は slot のロックを取ってから map から外し、retired にする

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::block::{BoxError, SharedBlock};
use super::initializer::InitializerRegistry;
use crate::domain::{AppName, EngineError};

#[derive(Default)]
struct Slot {
    /// Completed init attempts, readable without the lock.
    attempts: AtomicU64,
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    block: Option<SharedBlock>,
    attempts: u64,
    last_error: Option<String>,
    /// Set once the slot has left the map (evict / close_all).
    retired: bool,
}

/// `close()` failures collected by `close_all`.
#[derive(Debug, Error)]
#[error("{} init block(s) failed to close", .failures.len())]
pub struct CloseErrors {
    pub failures: Vec<(AppName, String)>,
}

pub struct InitBlockCache {
    initializers: Arc<InitializerRegistry>,
    slots: DashMap<AppName, Arc<Slot>>,
}

impl InitBlockCache {
    pub fn new(initializers: Arc<InitializerRegistry>) -> Self {
        Self {
            initializers,
            slots: DashMap::new(),
        }
    }

    fn slot(&self, app: &AppName) -> Arc<Slot> {
        // shard ロックはここで解放される（await を跨がない）
        Arc::clone(self.slots.entry(app.clone()).or_default().value())
    }

    /// Return the cached block of `app`, running its initializer on first use.
    pub async fn resolve(&self, app: &AppName) -> Result<SharedBlock, EngineError> {
        loop {
            let slot = self.slot(app);
            let seen = slot.attempts.load(Ordering::Acquire);

            let mut state = slot.state.lock().await;
            if state.retired {
                // 待っている間に evict された slot は捨てて取り直す
                continue;
            }
            if let Some(block) = &state.block {
                return Ok(block.clone());
            }
            if state.attempts != seen
                && let Some(reason) = &state.last_error
            {
                // 待っている間に勝者が失敗した
                return Err(EngineError::Initialization {
                    app: app.clone(),
                    reason: reason.clone(),
                });
            }

            let initializer = self.initializers.lookup(app)?;
            let owned_app = app.clone();
            debug!(%app, "running initializer");
            let joined =
                tokio::spawn(async move { initializer.init_dyn(&owned_app).await }).await;

            state.attempts += 1;
            slot.attempts.store(state.attempts, Ordering::Release);

            let reason = match joined {
                Ok(Ok(block)) => {
                    info!(%app, block = block.type_name(), "init block ready");
                    state.block = Some(block.clone());
                    state.last_error = None;
                    return Ok(block);
                }
                Ok(Err(e)) => e.to_string(),
                Err(join_err) => format!("initializer panicked: {join_err}"),
            };
            warn!(%app, %reason, attempt = state.attempts, "initializer failed");
            state.last_error = Some(reason.clone());
            return Err(EngineError::Initialization {
                app: app.clone(),
                reason,
            });
        }
    }

    pub async fn is_cached(&self, app: &AppName) -> bool {
        let Some(slot) = self.slots.get(app).map(|e| Arc::clone(e.value())) else {
            return false;
        };
        slot.state.lock().await.block.is_some()
    }

    /// Drop the cached block of `app` and close it.
    ///
    /// Returns `Ok(false)` if nothing was cached.
    pub async fn evict(&self, app: &AppName) -> Result<bool, BoxError> {
        let Some(slot) = self.slots.get(app).map(|e| Arc::clone(e.value())) else {
            return Ok(false);
        };
        // slot のロックを取ってから map から外す（resolve 中の slot を取り残さない）
        let mut state = slot.state.lock().await;
        state.retired = true;
        self.slots.remove_if(app, |_, current| Arc::ptr_eq(current, &slot));
        let block = state.block.take();
        drop(state);

        match block {
            Some(block) => {
                info!(%app, "evicting init block");
                block.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close every cached block. Errors are collected, not fatal to the rest.
    ///
    /// Returns the number of blocks closed successfully.
    pub async fn close_all(&self) -> Result<usize, CloseErrors> {
        let slots: Vec<(AppName, Arc<Slot>)> = self
            .slots
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let mut closed = 0;
        let mut failures = Vec::new();
        for (app, slot) in slots {
            let block = {
                let mut state = slot.state.lock().await;
                state.retired = true;
                self.slots.remove_if(&app, |_, current| Arc::ptr_eq(current, &slot));
                state.block.take()
            };
            let Some(block) = block else {
                continue;
            };
            match block.close() {
                Ok(()) => {
                    debug!(%app, "init block closed");
                    closed += 1;
                }
                Err(e) => {
                    error!(%app, error = %e, "init block close failed");
                    failures.push((app, e.to_string()));
                }
            }
        }

        if failures.is_empty() {
            Ok(closed)
        } else {
            Err(CloseErrors { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use crate::registry::{InitBlock, Initializer};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    struct Pool {
        closed: Arc<AtomicBool>,
        fail_close: bool,
    }

    impl InitBlock for Pool {
        fn close(&self) -> Result<(), BoxError> {
            self.closed.store(true, Ordering::SeqCst);
            if self.fail_close {
                return Err("socket already gone".into());
            }
            Ok(())
        }
    }

    /// Counts calls; fails the first `fail_first` of them.
    struct Counting {
        calls: Arc<AtomicUsize>,
        fail_first: usize,
        delay: Duration,
        closed: Arc<AtomicBool>,
        fail_close: bool,
    }

    impl Counting {
        fn new(calls: Arc<AtomicUsize>) -> Self {
            Self {
                calls,
                fail_first: 0,
                delay: Duration::ZERO,
                closed: Arc::new(AtomicBool::new(false)),
                fail_close: false,
            }
        }
    }

    #[async_trait]
    impl Initializer for Counting {
        type Block = Pool;

        async fn init(&self, _app: &AppName) -> Result<Pool, BoxError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if n < self.fail_first {
                return Err(format!("connect refused (call {n})").into());
            }
            Ok(Pool {
                closed: Arc::clone(&self.closed),
                fail_close: self.fail_close,
            })
        }
    }

    struct Panicking;

    #[async_trait]
    impl Initializer for Panicking {
        type Block = ();

        async fn init(&self, _app: &AppName) -> Result<(), BoxError> {
            panic!("bad config");
        }
    }

    fn cache_with(app: &str, init: impl Initializer) -> InitBlockCache {
        let registry = InitializerRegistry::new();
        registry.register(AppName::new(app), init).unwrap();
        InitBlockCache::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn resolve_caches_block() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache_with("a", Counting::new(Arc::clone(&calls)));
        let app = AppName::new("a");

        cache.resolve(&app).await.unwrap();
        cache.resolve(&app).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_cached(&app).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_resolution_runs_initializer_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut init = Counting::new(Arc::clone(&calls));
        init.delay = Duration::from_millis(100);
        let cache = Arc::new(cache_with("a", init));

        let mut joins = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            joins.push(tokio::spawn(async move {
                cache.resolve(&AppName::new("a")).await.is_ok()
            }));
        }
        for j in joins {
            assert!(j.await.unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn waiters_receive_the_winners_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut init = Counting::new(Arc::clone(&calls));
        init.fail_first = usize::MAX;
        init.delay = Duration::from_millis(200);
        let cache = Arc::new(cache_with("a", init));

        let mut joins = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            joins.push(tokio::spawn(async move {
                cache.resolve(&AppName::new("a")).await
            }));
        }
        for j in joins {
            let err = j.await.unwrap().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InitializationFailure);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut init = Counting::new(Arc::clone(&calls));
        init.fail_first = 1;
        let cache = cache_with("a", init);
        let app = AppName::new("a");

        let err = cache.resolve(&app).await.unwrap_err();
        assert!(err.to_string().contains("connect refused"));
        assert!(!cache.is_cached(&app).await);

        cache.resolve(&app).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unregistered_app_is_not_found() {
        let cache = InitBlockCache::new(Arc::new(InitializerRegistry::new()));
        let err = cache.resolve(&AppName::new("ghost")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn panicking_initializer_becomes_initialization_failure() {
        let cache = cache_with("p", Panicking);
        let err = cache.resolve(&AppName::new("p")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InitializationFailure);
        assert!(err.to_string().contains("panicked"));
    }

    #[tokio::test]
    async fn close_all_collects_errors_and_closes_the_rest() {
        let registry = InitializerRegistry::new();
        let good = Counting::new(Arc::new(AtomicUsize::new(0)));
        let good_closed = Arc::clone(&good.closed);
        let mut bad = Counting::new(Arc::new(AtomicUsize::new(0)));
        bad.fail_close = true;
        registry.register(AppName::new("good"), good).unwrap();
        registry.register(AppName::new("bad"), bad).unwrap();
        let cache = InitBlockCache::new(Arc::new(registry));

        cache.resolve(&AppName::new("good")).await.unwrap();
        cache.resolve(&AppName::new("bad")).await.unwrap();

        let err = cache.close_all().await.unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].0, AppName::new("bad"));
        assert!(good_closed.load(Ordering::SeqCst));
        assert!(!cache.is_cached(&AppName::new("good")).await);
    }

    #[tokio::test]
    async fn evict_closes_and_forgets() {
        let calls = Arc::new(AtomicUsize::new(0));
        let init = Counting::new(Arc::clone(&calls));
        let closed = Arc::clone(&init.closed);
        let cache = cache_with("a", init);
        let app = AppName::new("a");

        assert!(!cache.evict(&app).await.unwrap());
        cache.resolve(&app).await.unwrap();
        assert!(cache.evict(&app).await.unwrap());
        assert!(closed.load(Ordering::SeqCst));

        cache.resolve(&app).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Blocks inside `init` until the test hands out permits.
    struct Gated {
        calls: Arc<AtomicUsize>,
        gate: Arc<Semaphore>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Initializer for Gated {
        type Block = Pool;

        async fn init(&self, _app: &AppName) -> Result<Pool, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await?.forget();
            Ok(Pool {
                closed: Arc::clone(&self.closed),
                fail_close: false,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn resolve_waiting_behind_evict_lands_in_the_live_slot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let closed = Arc::new(AtomicBool::new(false));
        let cache = Arc::new(cache_with(
            "a",
            Gated {
                calls: Arc::clone(&calls),
                gate: Arc::clone(&gate),
                closed: Arc::clone(&closed),
            },
        ));
        let app = AppName::new("a");

        // 1) first resolve holds the slot lock inside the initializer
        let first = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.resolve(&AppName::new("a")).await.is_ok() })
        };
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        // 2) evict queues on the lock, then a second resolve queues behind it
        let evict = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.evict(&AppName::new("a")).await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.resolve(&AppName::new("a")).await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        gate.add_permits(2);
        assert!(first.await.unwrap());
        assert!(evict.await.unwrap());
        assert!(closed.load(Ordering::SeqCst));
        assert!(second.await.unwrap());

        // the re-initialized block is reachable and closed at shutdown
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_cached(&app).await);
        assert_eq!(cache.close_all().await.unwrap(), 1);
        assert!(!cache.is_cached(&app).await);
    }
}
