//! slowq-core
//!
//! Asynchronous "slow query" engine: clients submit a job, get a request id
//! back immediately, and poll until a worker has run the registered
//! processor.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, names, job, outcome, message, errors）
//! - **ports**: 抽象化レイヤー（JobStore, WorkQueue, Clock, IdGenerator）
//! - **registry**: Initializer / Processor の登録と InitBlock キャッシュ
//! - **app**: JobManager, ワーカー、設定
//! - **impls**: 実装（InMemoryJobStore, InMemoryWorkQueue）
//! - **observability**: tracing の初期化とジョブ件数

pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod registry;

pub use app::{EngineConfig, JobManager, WorkerGroup};
pub use domain::{
    AppName, Document, EngineError, ErrorMessage, JobOutcome, JobStatus, OpName, PollOutcome,
    RequestId,
};
pub use registry::{BoxError, InitBlock, Initializer, Processor};
