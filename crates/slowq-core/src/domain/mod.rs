//! Domain model (ids, names, job records, outcomes, errors).
//!
//! - **ids**: `RequestId`（ULID ベース）
//! - **names**: `AppName`, `OpName`, `ProcessorKey`
//! - **job**: `JobStatus`, `JobRecord`（状態遷移はここに集約）
//! - **outcome**: `JobOutcome`, `PollOutcome`
//! - **message**: `ErrorMessage`
//! - **errors**: `EngineError`, `ErrorKind`

pub mod errors;
pub mod ids;
pub mod job;
pub mod message;
pub mod names;
pub mod outcome;

use std::collections::BTreeMap;

pub use self::errors::{EngineError, ErrorKind};
pub use self::ids::{IdParseError, RequestId};
pub use self::job::{JobRecord, JobStatus};
pub use self::message::ErrorMessage;
pub use self::names::{AppName, OpName, ProcessorKey};
pub use self::outcome::{JobOutcome, PollOutcome};

/// Opaque structured payload (context, input, result).
///
/// The engine never looks inside; only processors interpret it.
pub type Document = serde_json::Value;

/// Side artifacts produced by a job: name -> location.
pub type OutputFiles = BTreeMap<String, String>;
