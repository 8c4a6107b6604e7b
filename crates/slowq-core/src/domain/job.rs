//! Job record and status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::RequestId;
use super::message::ErrorMessage;
use super::names::{AppName, OpName};
use super::outcome::{JobOutcome, PollOutcome};
use super::{Document, OutputFiles};

/// Job status.
///
/// State transitions (one-directional):
/// - Queued -> InProgress -> Success
/// - Queued -> InProgress -> Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Persisted, waiting for a worker to claim it.
    Queued,

    /// Claimed by exactly one worker.
    InProgress,

    Success,

    Failed,
}

impl JobStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }

    /// Is this job eligible for claim?
    pub fn is_claimable(self) -> bool {
        matches!(self, JobStatus::Queued)
    }
}

/// Rejected status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// The persisted unit of work.
///
/// Design:
/// - This is the "single source of truth" for job state.
/// - The work queue holds RequestId only.
/// - All state transitions happen here.
/// - `result` and `messages` are both empty until a terminal state, and
///   never both present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub request_id: RequestId,
    pub app: AppName,
    pub op: OpName,
    pub context: Document,
    pub input: Document,
    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Document>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ErrorMessage>,

    #[serde(default, skip_serializing_if = "OutputFiles::is_empty")]
    pub output_files: OutputFiles,

    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(
        request_id: RequestId,
        app: AppName,
        op: OpName,
        context: Document,
        input: Document,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            app,
            op,
            context,
            input,
            status: JobStatus::Queued,
            result: None,
            messages: Vec::new(),
            output_files: OutputFiles::new(),
            submitted_at: now,
            updated_at: now,
        }
    }

    /// Queued -> InProgress.
    pub fn claim(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.is_claimable() {
            return Err(TransitionError {
                from: self.status,
                to: JobStatus::InProgress,
            });
        }
        self.status = JobStatus::InProgress;
        self.updated_at = now;
        Ok(())
    }

    /// InProgress -> Success / Failed, recording the outcome.
    ///
    /// A failure without any message gets a generic one so pollers always
    /// see a non-empty list.
    pub fn complete(&mut self, outcome: JobOutcome, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status != JobStatus::InProgress {
            return Err(TransitionError {
                from: self.status,
                to: outcome.status(),
            });
        }
        match outcome {
            JobOutcome::Success {
                result,
                output_files,
            } => {
                self.status = JobStatus::Success;
                self.result = Some(result);
                self.output_files = output_files;
            }
            JobOutcome::Failed {
                mut messages,
                output_files,
            } => {
                if messages.is_empty() {
                    messages.push(ErrorMessage::with_detail(
                        ErrorMessage::PROCESSOR_FAILED,
                        "processor reported failure without messages",
                    ));
                }
                self.status = JobStatus::Failed;
                self.messages = messages;
                self.output_files = output_files;
            }
        }
        self.updated_at = now;
        Ok(())
    }

    /// Translate current state into the caller-facing poll shape.
    pub fn poll_outcome(&self) -> PollOutcome {
        match self.status {
            JobStatus::Queued | JobStatus::InProgress => PollOutcome::TryLater,
            JobStatus::Success => PollOutcome::Success {
                result: self.result.clone().unwrap_or(Document::Null),
                output_files: self.output_files.clone(),
            },
            JobStatus::Failed => PollOutcome::Failed {
                messages: self.messages.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use ulid::Ulid;

    fn record() -> JobRecord {
        JobRecord::new(
            RequestId::from_ulid(Ulid::new()),
            AppName::new("broadside"),
            OpName::new("bouncerpt"),
            json!({"userId": 123}),
            json!({"fromEmail": "a@b.com"}),
            Utc::now(),
        )
    }

    #[test]
    fn new_record_is_queued_and_empty() {
        let rec = record();
        assert_eq!(rec.status, JobStatus::Queued);
        assert!(rec.result.is_none());
        assert!(rec.messages.is_empty());
        assert_eq!(rec.poll_outcome(), PollOutcome::TryLater);
    }

    #[test]
    fn claim_then_complete_success() {
        let mut rec = record();
        rec.claim(Utc::now()).unwrap();
        assert_eq!(rec.poll_outcome(), PollOutcome::TryLater);

        rec.complete(JobOutcome::success(json!({"report": "ok"})), Utc::now())
            .unwrap();
        assert_eq!(rec.status, JobStatus::Success);
        assert!(rec.messages.is_empty());
        assert_eq!(
            rec.poll_outcome(),
            PollOutcome::Success {
                result: json!({"report": "ok"}),
                output_files: OutputFiles::new(),
            }
        );
    }

    #[test]
    fn second_claim_is_rejected() {
        let mut rec = record();
        rec.claim(Utc::now()).unwrap();
        let err = rec.claim(Utc::now()).unwrap_err();
        assert_eq!(err.from, JobStatus::InProgress);
    }

    #[rstest]
    #[case::queued(false)]
    #[case::already_terminal(true)]
    fn complete_requires_in_progress(#[case] finish_first: bool) {
        let mut rec = record();
        if finish_first {
            rec.claim(Utc::now()).unwrap();
            rec.complete(JobOutcome::success(json!(1)), Utc::now()).unwrap();
        }
        let err = rec
            .complete(JobOutcome::failed_with("x", "late"), Utc::now())
            .unwrap_err();
        assert_eq!(err.to, JobStatus::Failed);
    }

    #[test]
    fn failure_without_messages_gets_a_generic_one() {
        let mut rec = record();
        rec.claim(Utc::now()).unwrap();
        rec.complete(JobOutcome::failed(vec![]), Utc::now()).unwrap();
        assert_eq!(rec.messages.len(), 1);
        assert!(rec.result.is_none());
    }

    #[rstest]
    #[case(JobStatus::Queued, false, true)]
    #[case(JobStatus::InProgress, false, false)]
    #[case(JobStatus::Success, true, false)]
    #[case(JobStatus::Failed, true, false)]
    fn status_predicates(#[case] s: JobStatus, #[case] terminal: bool, #[case] claimable: bool) {
        assert_eq!(s.is_terminal(), terminal);
        assert_eq!(s.is_claimable(), claimable);
    }
}
