//! Outcome model: what a processor reports, and what a poller sees.
//!
//! `JobOutcome` makes "result XOR messages" structural: a success carries a
//! result document, a failure carries messages, never both.

use serde::{Deserialize, Serialize};

use super::job::JobStatus;
use super::message::ErrorMessage;
use super::{Document, OutputFiles};

/// Terminal outcome of one execution, as reported by a processor or
/// synthesized by the worker loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Success {
        result: Document,
        #[serde(default, skip_serializing_if = "OutputFiles::is_empty")]
        output_files: OutputFiles,
    },
    Failed {
        messages: Vec<ErrorMessage>,
        #[serde(default, skip_serializing_if = "OutputFiles::is_empty")]
        output_files: OutputFiles,
    },
}

impl JobOutcome {
    pub fn success(result: Document) -> Self {
        Self::Success {
            result,
            output_files: OutputFiles::new(),
        }
    }

    pub fn failed(messages: Vec<ErrorMessage>) -> Self {
        Self::Failed {
            messages,
            output_files: OutputFiles::new(),
        }
    }

    /// Failure with a single engine-generated message.
    pub fn failed_with(errcode: &str, detail: impl Into<String>) -> Self {
        Self::failed(vec![ErrorMessage::with_detail(errcode, detail)])
    }

    /// Attach an output file reference (name -> location).
    pub fn with_output_file(mut self, name: impl Into<String>, location: impl Into<String>) -> Self {
        match &mut self {
            Self::Success { output_files, .. } | Self::Failed { output_files, .. } => {
                output_files.insert(name.into(), location.into());
            }
        }
        self
    }

    /// The terminal status this outcome moves a job to.
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Success { .. } => JobStatus::Success,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn output_files(&self) -> &OutputFiles {
        match self {
            Self::Success { output_files, .. } | Self::Failed { output_files, .. } => output_files,
        }
    }
}

/// What a poller observes for a known request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollOutcome {
    /// Queued or in progress: no result, no messages.
    TryLater,
    Success {
        result: Document,
        #[serde(default, skip_serializing_if = "OutputFiles::is_empty")]
        output_files: OutputFiles,
    },
    Failed {
        messages: Vec<ErrorMessage>,
    },
}

impl PollOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::TryLater)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_files_attach_to_either_variant() {
        let ok = JobOutcome::success(json!({})).with_output_file("report", "s3://bucket/r.csv");
        let ko = JobOutcome::failed(vec![]).with_output_file("log", "/tmp/run.log");
        assert_eq!(ok.output_files().get("report").unwrap(), "s3://bucket/r.csv");
        assert_eq!(ko.output_files().get("log").unwrap(), "/tmp/run.log");
    }

    #[test]
    fn status_follows_variant() {
        assert_eq!(JobOutcome::success(json!(1)).status(), JobStatus::Success);
        assert_eq!(
            JobOutcome::failed_with("x", "boom").status(),
            JobStatus::Failed
        );
    }

    #[test]
    fn serializes_with_status_tag() {
        let v = serde_json::to_value(JobOutcome::success(json!({"a": 1}))).unwrap();
        assert_eq!(v, json!({ "status": "success", "result": { "a": 1 } }));
    }
}
