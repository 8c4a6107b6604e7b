//! Processor - (app, op) ごとの処理ロジックと、その登録簿

use std::any::type_name;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tracing::{info, warn};

use super::block::{BoxError, InitBlock, SharedBlock};
use crate::domain::{AppName, Document, EngineError, ErrorKind, JobOutcome, OpName, ProcessorKey};

/// Executes one job of a given (app, op).
///
/// Stateless from the engine's point of view: it may run concurrently for
/// different jobs. `block` is only borrowed for the duration of the call.
///
/// - `Ok(outcome)`: persisted verbatim (success or reported failure).
/// - `Err(e)`: the job fails with a `processor_failed` message.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// The block type produced by this application's initializer.
    type Block: InitBlock;

    async fn execute(
        &self,
        block: &Self::Block,
        context: &Document,
        input: &Document,
    ) -> Result<JobOutcome, BoxError>;
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("init block type mismatch: expected {expected}, got {actual}")]
    BlockTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{0}")]
    Failed(BoxError),
}

impl ExecuteError {
    /// Both variants are isolated to one job.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ProcessorFailure
    }
}

/// Object-safe form stored in the registry.
#[async_trait]
pub trait DynProcessor: Send + Sync {
    async fn execute_dyn(
        &self,
        block: &SharedBlock,
        context: &Document,
        input: &Document,
    ) -> Result<JobOutcome, ExecuteError>;

    fn block_type(&self) -> &'static str;
}

struct TypedProcessor<P> {
    inner: P,
}

#[async_trait]
impl<P: Processor> DynProcessor for TypedProcessor<P> {
    async fn execute_dyn(
        &self,
        block: &SharedBlock,
        context: &Document,
        input: &Document,
    ) -> Result<JobOutcome, ExecuteError> {
        let typed = block
            .downcast_ref::<P::Block>()
            .ok_or_else(|| ExecuteError::BlockTypeMismatch {
                expected: self.block_type(),
                actual: block.type_name(),
            })?;
        self.inner
            .execute(typed, context, input)
            .await
            .map_err(ExecuteError::Failed)
    }

    fn block_type(&self) -> &'static str {
        type_name::<P::Block>()
    }
}

/// (app, op) -> processor.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: DashMap<ProcessorKey, Arc<dyn DynProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: Processor>(
        &self,
        app: AppName,
        op: OpName,
        processor: P,
    ) -> Result<(), EngineError> {
        match self.processors.entry(ProcessorKey::new(app, op)) {
            Entry::Occupied(e) => {
                let ProcessorKey { app, op } = e.key().clone();
                warn!(%app, %op, "duplicate processor registration");
                Err(EngineError::ProcessorAlreadyRegistered { app, op })
            }
            Entry::Vacant(e) => {
                info!(key = %e.key(), block = type_name::<P::Block>(), "processor registered");
                e.insert(Arc::new(TypedProcessor { inner: processor }));
                Ok(())
            }
        }
    }

    pub fn lookup(&self, app: &AppName, op: &OpName) -> Result<Arc<dyn DynProcessor>, EngineError> {
        self.processors
            .get(&ProcessorKey::new(app.clone(), op.clone()))
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| EngineError::ProcessorNotFound {
                app: app.clone(),
                op: op.clone(),
            })
    }

    pub fn contains(&self, app: &AppName, op: &OpName) -> bool {
        self.processors
            .contains_key(&ProcessorKey::new(app.clone(), op.clone()))
    }

    pub fn registered_keys(&self) -> Vec<ProcessorKey> {
        let mut keys: Vec<ProcessorKey> = self.processors.iter().map(|e| e.key().clone()).collect();
        keys.sort_by(|a, b| (&a.app, &a.op).cmp(&(&b.app, &b.op)));
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Processor for Echo {
        type Block = ();

        async fn execute(
            &self,
            _block: &(),
            _context: &Document,
            input: &Document,
        ) -> Result<JobOutcome, BoxError> {
            Ok(JobOutcome::success(input.clone()))
        }
    }

    struct Other;
    impl InitBlock for Other {}

    #[test]
    fn double_registration_fails() {
        let registry = ProcessorRegistry::new();
        registry.register("app".into(), "op".into(), Echo).unwrap();
        let err = registry.register("app".into(), "op".into(), Echo).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyRegistered);
        assert_eq!(
            err.to_string(),
            "processor already registered for this app and operation: app=app, op=op"
        );
    }

    #[test]
    fn same_op_under_different_apps_is_allowed() {
        let registry = ProcessorRegistry::new();
        registry.register("a".into(), "op".into(), Echo).unwrap();
        registry.register("b".into(), "op".into(), Echo).unwrap();
        assert_eq!(registry.registered_keys().len(), 2);
    }

    #[test]
    fn lookup_of_unknown_pair_is_not_found() {
        let registry = ProcessorRegistry::new();
        registry.register("a".into(), "op".into(), Echo).unwrap();
        let err = registry.lookup(&"a".into(), &"nope".into()).err().unwrap();
        assert!(matches!(err, EngineError::ProcessorNotFound { .. }));
        assert!(!registry.contains(&"a".into(), &"nope".into()));
    }

    #[tokio::test]
    async fn typed_processor_runs_with_matching_block() {
        let registry = ProcessorRegistry::new();
        registry.register("a".into(), "op".into(), Echo).unwrap();
        let processor = registry.lookup(&"a".into(), &"op".into()).unwrap();

        let outcome = processor
            .execute_dyn(&SharedBlock::new(()), &json!({}), &json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::success(json!({"x": 1})));
    }

    #[tokio::test]
    async fn mismatched_block_is_an_error_not_a_panic() {
        let registry = ProcessorRegistry::new();
        registry.register("a".into(), "op".into(), Echo).unwrap();
        let processor = registry.lookup(&"a".into(), &"op".into()).unwrap();

        let err = processor
            .execute_dyn(&SharedBlock::new(Other), &json!({}), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecuteError::BlockTypeMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::ProcessorFailure);
        assert!(!err.kind().is_transient());
    }
}
