use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle states of a job.
///
/// Transitions only move forward: `Queued` is the initial state, everything
/// else is terminal. `FailedClone` is reserved for workspace acquisition
/// failures; `Failed` covers every other pipeline fault (provisioning I/O,
/// runner launch, timeout, cancellation). A suite that ran and reported
/// failing tests still finishes as `Done` - test failures are data, not
/// pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    FailedClone,
    Failed,
    Done,
}

impl JobStatus {
    /// Wire/storage representation, matching the serde encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::FailedClone => "failed_clone",
            JobStatus::Failed => "failed",
            JobStatus::Done => "done",
        }
    }

    /// Parse the wire/storage representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "failed_clone" => Some(JobStatus::FailedClone),
            "failed" => Some(JobStatus::Failed),
            "done" => Some(JobStatus::Done),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Queued)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user-initiated request to provision and run tests against a repository.
///
/// Ids are assigned by the store. The record is created with status `queued`
/// and mutated only by the worker pipeline; the pipeline never deletes jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    /// Clone URL or absolute local path.
    pub repo_ref: String,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
    /// HEAD commit of the acquired workspace, resolved best-effort.
    pub commit: Option<String>,
    /// Selects the runner profile; profiles default to `python`.
    pub language: Option<String>,
}

/// The recorded outcome of one test-execution attempt for a job.
///
/// Written exactly once after the runner completes, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub job_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tests_total: u32,
    pub tests_failed: u32,
    /// Percentage in [0, 100]; 0.0 when the report had no parseable total.
    pub coverage: f64,
    /// Retained workspace directory, when one was kept.
    pub artifacts_path: Option<String>,
}

/// Metrics extracted from raw runner output by the report parser.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunMetrics {
    pub tests_total: u32,
    pub tests_failed: u32,
    pub coverage: f64,
}

/// Input for persisting a run record; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub job_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub metrics: RunMetrics,
    pub artifacts_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_values() {
        assert_eq!(JobStatus::Queued.as_str(), "queued");
        assert_eq!(JobStatus::FailedClone.as_str(), "failed_clone");
        assert_eq!(JobStatus::Failed.as_str(), "failed");
        assert_eq!(JobStatus::Done.as_str(), "done");
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::FailedClone,
            JobStatus::Failed,
            JobStatus::Done,
        ] {
            assert_eq!(JobStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::from_str("running"), None);
    }

    #[test]
    fn test_terminality() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(JobStatus::FailedClone.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Done.is_terminal());
    }

    #[test]
    fn test_status_serde_matches_as_str() {
        let encoded = serde_json::to_string(&JobStatus::FailedClone).unwrap();
        assert_eq!(encoded, "\"failed_clone\"");
    }
}
