//! Per-job outcomes and the batch report they fold into.

use serde::{Deserialize, Serialize};

use crate::job::Recipients;

/// Result of attempting one job of a batch.
///
/// Serializes as `{to, success: true, messageId}` or
/// `{to, success: false, error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    /// Recipients of the job, in the shape the caller supplied.
    pub to: Recipients,
    /// Whether the message was accepted.
    pub success: bool,
    /// Message id, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Error message, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    /// A successful outcome.
    pub fn sent(to: Recipients, message_id: impl Into<String>) -> Self {
        Self {
            to,
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    /// A failed outcome.
    pub fn failed(to: Recipients, error: impl Into<String>) -> Self {
        Self {
            to,
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Summary of a bulk send.
///
/// `success` means the batch *ran*, not that every job succeeded. It is true
/// whenever dispatch completed, even if every job failed; inspect `failed`
/// to learn whether any job failed.
///
/// `successful + failed == total == results.len()` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// The batch executed to completion.
    pub success: bool,
    /// One outcome per job, index-aligned with the request.
    pub results: Vec<JobOutcome>,
    /// Number of jobs.
    pub total: usize,
    /// Jobs that were accepted.
    pub successful: usize,
    /// Jobs that failed.
    pub failed: usize,
}

impl BatchReport {
    /// Fold outcomes into a report. Order is preserved.
    pub fn from_outcomes(results: Vec<JobOutcome>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        let total = results.len();
        Self {
            success: true,
            total,
            successful,
            failed: total - successful,
            results,
        }
    }

    /// Whether every job was accepted.
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Outcomes of failed jobs with their request index.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &JobOutcome)> {
        self.results.iter().enumerate().filter(|(_, r)| !r.success)
    }
}
