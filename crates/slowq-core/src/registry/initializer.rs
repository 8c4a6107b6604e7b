//! Initializer - app ごとの InitBlock を作る能力と、その登録簿

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{info, warn};

use super::block::{BoxError, InitBlock, SharedBlock};
use crate::domain::{AppName, EngineError};

/// Builds the shared resource bundle of one application.
///
/// The engine calls `init` at most once per successful resolution; a failed
/// call is retried on the next resolution.
///
/// # 使用例
/// ```ignore
/// struct BroadsideInitializer;
///
/// #[async_trait]
/// impl Initializer for BroadsideInitializer {
///     type Block = BroadsideBlock;
///
///     async fn init(&self, _app: &AppName) -> Result<BroadsideBlock, BoxError> {
///         Ok(BroadsideBlock::connect().await?)
///     }
/// }
/// ```
#[async_trait]
pub trait Initializer: Send + Sync + 'static {
    type Block: InitBlock;

    async fn init(&self, app: &AppName) -> Result<Self::Block, BoxError>;
}

/// Object-safe form stored in the registry.
#[async_trait]
pub trait DynInitializer: Send + Sync {
    async fn init_dyn(&self, app: &AppName) -> Result<SharedBlock, BoxError>;
}

struct TypedInitializer<I> {
    inner: I,
}

#[async_trait]
impl<I: Initializer> DynInitializer for TypedInitializer<I> {
    async fn init_dyn(&self, app: &AppName) -> Result<SharedBlock, BoxError> {
        let block = self.inner.init(app).await?;
        Ok(SharedBlock::new(block))
    }
}

/// app -> initializer.
///
/// 登録は key 単位の排他（DashMap の entry）で、別 app の登録を直列化しない。
#[derive(Default)]
pub struct InitializerRegistry {
    initializers: DashMap<AppName, Arc<dyn DynInitializer>>,
}

impl InitializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<I: Initializer>(&self, app: AppName, initializer: I) -> Result<(), EngineError> {
        match self.initializers.entry(app) {
            Entry::Occupied(e) => {
                let app = e.key().clone();
                warn!(%app, "duplicate initializer registration");
                Err(EngineError::InitializerAlreadyRegistered { app })
            }
            Entry::Vacant(e) => {
                info!(app = %e.key(), "initializer registered");
                e.insert(Arc::new(TypedInitializer { inner: initializer }));
                Ok(())
            }
        }
    }

    pub fn lookup(&self, app: &AppName) -> Result<Arc<dyn DynInitializer>, EngineError> {
        self.initializers
            .get(app)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| EngineError::InitializerNotFound { app: app.clone() })
    }

    pub fn contains(&self, app: &AppName) -> bool {
        self.initializers.contains_key(app)
    }

    pub fn registered_apps(&self) -> Vec<AppName> {
        let mut apps: Vec<AppName> = self.initializers.iter().map(|e| e.key().clone()).collect();
        apps.sort();
        apps
    }
}
