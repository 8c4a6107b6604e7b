//! Logging setup and status counts.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::domain::JobStatus;

/// Initialize tracing for the process, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub queued: usize,
    pub in_progress: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Queued => self.queued += 1,
            JobStatus::InProgress => self.in_progress += 1,
            JobStatus::Success => self.succeeded += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.queued + self.in_progress + self.succeeded + self.failed
    }

    /// Jobs not yet in a terminal state.
    pub fn pending(&self) -> usize {
        self.queued + self.in_progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_tally_by_status() {
        let mut counts = JobCounts::default();
        for s in [
            JobStatus::Queued,
            JobStatus::InProgress,
            JobStatus::Success,
            JobStatus::Success,
            JobStatus::Failed,
        ] {
            counts.record(s);
        }
        assert_eq!(counts.succeeded, 2);
        assert_eq!(counts.pending(), 2);
        assert_eq!(counts.total(), 5);
    }

    #[test]
    fn init_twice_is_harmless() {
        init(false);
        init(true);
    }
}
