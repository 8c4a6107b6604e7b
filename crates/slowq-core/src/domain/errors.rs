//! Errors - エラー型と分類

use thiserror::Error;

use super::ids::RequestId;
use super::names::{AppName, OpName};
use crate::ports::{QueueError, StoreError};

/// ErrorKind は運用上の分類
///
/// - Unavailable だけが一時的（バックオフしてリトライ）
/// - それ以外は恒久的（呼び出し側 or データの誤り）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyRegistered,
    NotFound,
    InitializationFailure,
    InvalidTransition,
    ProcessorFailure,
    Unavailable,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Unavailable)
    }
}

/// Caller-facing engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("initializer already registered for this app: app={app}")]
    InitializerAlreadyRegistered { app: AppName },

    #[error("processor already registered for this app and operation: app={app}, op={op}")]
    ProcessorAlreadyRegistered { app: AppName, op: OpName },

    #[error("initializer not found: app={app}")]
    InitializerNotFound { app: AppName },

    #[error("processor not found: app={app}, op={op}")]
    ProcessorNotFound { app: AppName, op: OpName },

    #[error("request not found: {0}")]
    RequestNotFound(RequestId),

    #[error("initialization failed: app={app}: {reason}")]
    Initialization { app: AppName, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InitializerAlreadyRegistered { .. }
            | EngineError::ProcessorAlreadyRegistered { .. } => ErrorKind::AlreadyRegistered,
            EngineError::InitializerNotFound { .. }
            | EngineError::ProcessorNotFound { .. }
            | EngineError::RequestNotFound(_) => ErrorKind::NotFound,
            EngineError::Initialization { .. } => ErrorKind::InitializationFailure,
            EngineError::Store(e) => e.kind(),
            EngineError::Queue(_) => ErrorKind::Unavailable,
        }
    }
}
