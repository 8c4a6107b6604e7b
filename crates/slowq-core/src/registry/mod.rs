//! Registry - アプリケーションが差し込む能力（capability）の登録と管理
//!
//! # 二層構造
//! - **表層（Typed）**: `Initializer`, `Processor` - `Block` 型を静的に結び付ける
//! - **内部（Dyn）**: `DynInitializer`, `DynProcessor` - object-safe, type erasure
//!
//! # 構成
//! - **block**: `InitBlock` と型消去した `SharedBlock`
//! - **initializer**: `Initializer` と `InitializerRegistry`（app ごとに 1 つ）
//! - **processor**: `Processor` と `ProcessorRegistry`（(app, op) ごとに 1 つ）
//! - **cache**: `InitBlockCache`（app ごとに single-flight で初期化）

pub mod block;
pub mod cache;
pub mod initializer;
pub mod processor;

pub use self::block::{BoxError, InitBlock, SharedBlock};
pub use self::cache::{CloseErrors, InitBlockCache};
pub use self::initializer::{DynInitializer, Initializer, InitializerRegistry};
pub use self::processor::{DynProcessor, ExecuteError, Processor, ProcessorRegistry};
