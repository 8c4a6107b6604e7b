//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryJobStore**: プロセス内の正本
//! - **InMemoryWorkQueue**: プロセス内の配送キュー
//!
//! RDB / Redis を使う本番実装は同じ trait を別クレートで実装します。

pub mod inmem_job_store;
pub mod inmem_work_queue;

pub use self::inmem_job_store::InMemoryJobStore;
pub use self::inmem_work_queue::InMemoryWorkQueue;
