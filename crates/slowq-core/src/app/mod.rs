//! App - エンジン本体（設定・受付・実行ループ）
//!
//! - **config**: `EngineConfig`, `Backoff`（環境変数から読める）
//! - **manager**: `JobManager`（submit / poll / run）
//! - **worker**: `WorkerGroup`（ワーカーと pending sweep のタスク群）

pub mod config;
pub mod manager;
pub mod worker;

pub use self::config::{Backoff, ConfigError, EngineConfig};
pub use self::manager::JobManager;
pub use self::worker::WorkerGroup;
