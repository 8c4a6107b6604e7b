//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部コラボレータ（RDB, Redis など）へのインターフェースです。
//!
//! # 設計原則
//! - JobStore が source of truth（正本）
//! - WorkQueue は request_id のみを流す起床ヒント（at-least-once で良い）
//! - 二重実行の防止は JobStore::claim の原子性が担う

pub mod clock;
pub mod id_generator;
pub mod job_store;
pub mod work_queue;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::{JobStore, StoreError};
pub use self::work_queue::{QueueError, WorkQueue};
