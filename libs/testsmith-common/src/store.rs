//! Job store semantics and adapters.
//!
//! Key construction lives here so the API, worker and CLI never drift on
//! where records live. Every record is a Redis hash addressed by a
//! store-assigned integer id; every mutation is a single Redis command, which
//! gives the per-call atomicity the pipeline relies on (jobs are only ever
//! written by one worker at a time).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;

use crate::error::StoreError;
use crate::types::{Job, JobStatus, NewRun, Run};

pub const JOB_PREFIX: &str = "testsmith:job";
pub const RUN_PREFIX: &str = "testsmith:run";
pub const CANCEL_PREFIX: &str = "testsmith:cancel";

/// LPUSH'd on job creation; LRANGE of the head is the recency listing.
pub const JOB_INDEX_KEY: &str = "testsmith:jobs:index";
pub const JOB_SEQ_KEY: &str = "testsmith:seq:job";
pub const RUN_SEQ_KEY: &str = "testsmith:seq:run";

/// How many jobs the recency listing returns.
pub const RECENT_JOBS_LIMIT: usize = 20;

pub fn job_key(id: i64) -> String {
    format!("{}:{}", JOB_PREFIX, id)
}

pub fn job_runs_key(job_id: i64) -> String {
    format!("{}:{}:runs", JOB_PREFIX, job_id)
}

pub fn run_key(id: i64) -> String {
    format!("{}:{}", RUN_PREFIX, id)
}

pub fn cancel_key(job_id: i64) -> String {
    format!("{}:{}", CANCEL_PREFIX, job_id)
}

/// Persistence port for jobs and runs; the single source of truth for
/// status. Production uses [`RedisStore`], tests use
/// [`crate::memory::MemoryStore`].
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job with status `queued` and return it with its assigned id.
    async fn create_job(&self, repo_ref: &str, language: Option<&str>) -> Result<Job, StoreError>;

    async fn get_job(&self, id: i64) -> Result<Option<Job>, StoreError>;

    /// Most recently created jobs, newest first.
    async fn recent_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError>;

    async fn update_status(&self, id: i64, status: JobStatus) -> Result<(), StoreError>;

    /// Record the resolved workspace HEAD on the job.
    async fn set_commit(&self, id: i64, commit: &str) -> Result<(), StoreError>;

    /// Insert a run record and return it with its assigned id.
    async fn create_run(&self, run: NewRun) -> Result<Run, StoreError>;

    async fn runs_for_job(&self, job_id: i64) -> Result<Vec<Run>, StoreError>;

    /// Flag a job for best-effort cancellation.
    async fn request_cancel(&self, id: i64) -> Result<(), StoreError>;

    async fn cancel_requested(&self, id: i64) -> Result<bool, StoreError>;
}

/// Redis-backed [`JobStore`].
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl JobStore for RedisStore {
    async fn create_job(&self, repo_ref: &str, language: Option<&str>) -> Result<Job, StoreError> {
        let mut conn = self.conn.clone();
        let id: i64 = conn.incr(JOB_SEQ_KEY, 1).await?;

        let job = Job {
            id,
            repo_ref: repo_ref.to_string(),
            created_at: Utc::now(),
            status: JobStatus::Queued,
            commit: None,
            language: language.map(str::to_string),
        };

        let fields = job_fields(&job);
        let _: () = conn.hset_multiple(job_key(id), &fields).await?;
        let _: () = conn.lpush(JOB_INDEX_KEY, id).await?;

        Ok(job)
    }

    async fn get_job(&self, id: i64) -> Result<Option<Job>, StoreError> {
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> = conn.hgetall(job_key(id)).await?;
        if map.is_empty() {
            return Ok(None);
        }
        job_from_fields(id, &map).map(Some)
    }

    async fn recent_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let stop = limit as isize - 1;
        let ids: Vec<i64> = conn.lrange(JOB_INDEX_KEY, 0, stop).await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            // The index is written after the hash, so a listed id normally
            // resolves; skip rather than fail the whole listing if not.
            if let Some(job) = self.get_job(id).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    async fn update_status(&self, id: i64, status: JobStatus) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(job_key(id), "status", status.as_str()).await?;
        Ok(())
    }

    async fn set_commit(&self, id: i64, commit: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(job_key(id), "commit", commit).await?;
        Ok(())
    }

    async fn create_run(&self, new: NewRun) -> Result<Run, StoreError> {
        let mut conn = self.conn.clone();
        let id: i64 = conn.incr(RUN_SEQ_KEY, 1).await?;

        let run = Run {
            id,
            job_id: new.job_id,
            started_at: new.started_at,
            finished_at: new.finished_at,
            tests_total: new.metrics.tests_total,
            tests_failed: new.metrics.tests_failed,
            coverage: new.metrics.coverage,
            artifacts_path: new.artifacts_path,
        };

        let fields = run_fields(&run);
        let _: () = conn.hset_multiple(run_key(id), &fields).await?;
        let _: () = conn.rpush(job_runs_key(run.job_id), id).await?;

        Ok(run)
    }

    async fn runs_for_job(&self, job_id: i64) -> Result<Vec<Run>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<i64> = conn.lrange(job_runs_key(job_id), 0, -1).await?;

        let mut runs = Vec::with_capacity(ids.len());
        for id in ids {
            let map: HashMap<String, String> = conn.hgetall(run_key(id)).await?;
            if map.is_empty() {
                continue;
            }
            runs.push(run_from_fields(id, &map)?);
        }
        Ok(runs)
    }

    async fn request_cancel(&self, id: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        // Flags expire after 24h rather than accumulate forever.
        let _: () = conn.set_ex(cancel_key(id), 1, 86400).await?;
        Ok(())
    }

    async fn cancel_requested(&self, id: i64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let flagged: bool = conn.exists(cancel_key(id)).await?;
        Ok(flagged)
    }
}

fn corrupt(key: String, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        key,
        reason: reason.into(),
    }
}

fn parse_timestamp(key: &str, field: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(key.to_string(), format!("bad {}: {}", field, e)))
}

fn required<'a>(
    key: &str,
    map: &'a HashMap<String, String>,
    field: &str,
) -> Result<&'a String, StoreError> {
    map.get(field)
        .ok_or_else(|| corrupt(key.to_string(), format!("missing {}", field)))
}

fn job_fields(job: &Job) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("repo_ref", job.repo_ref.clone()),
        ("created_at", job.created_at.to_rfc3339()),
        ("status", job.status.as_str().to_string()),
    ];
    if let Some(commit) = &job.commit {
        fields.push(("commit", commit.clone()));
    }
    if let Some(language) = &job.language {
        fields.push(("language", language.clone()));
    }
    fields
}

fn job_from_fields(id: i64, map: &HashMap<String, String>) -> Result<Job, StoreError> {
    let key = job_key(id);
    let status_raw = required(&key, map, "status")?;
    let status = JobStatus::from_str(status_raw)
        .ok_or_else(|| corrupt(key.clone(), format!("unknown status '{}'", status_raw)))?;

    Ok(Job {
        id,
        repo_ref: required(&key, map, "repo_ref")?.clone(),
        created_at: parse_timestamp(&key, "created_at", required(&key, map, "created_at")?)?,
        status,
        commit: map.get("commit").cloned(),
        language: map.get("language").cloned(),
    })
}

fn run_fields(run: &Run) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("job_id", run.job_id.to_string()),
        ("started_at", run.started_at.to_rfc3339()),
        ("finished_at", run.finished_at.to_rfc3339()),
        ("tests_total", run.tests_total.to_string()),
        ("tests_failed", run.tests_failed.to_string()),
        ("coverage", run.coverage.to_string()),
    ];
    if let Some(path) = &run.artifacts_path {
        fields.push(("artifacts_path", path.clone()));
    }
    fields
}

fn run_from_fields(id: i64, map: &HashMap<String, String>) -> Result<Run, StoreError> {
    let key = run_key(id);

    let job_id = required(&key, map, "job_id")?
        .parse::<i64>()
        .map_err(|e| corrupt(key.clone(), format!("bad job_id: {}", e)))?;
    let tests_total = required(&key, map, "tests_total")?
        .parse::<u32>()
        .map_err(|e| corrupt(key.clone(), format!("bad tests_total: {}", e)))?;
    let tests_failed = required(&key, map, "tests_failed")?
        .parse::<u32>()
        .map_err(|e| corrupt(key.clone(), format!("bad tests_failed: {}", e)))?;
    let coverage = required(&key, map, "coverage")?
        .parse::<f64>()
        .map_err(|e| corrupt(key.clone(), format!("bad coverage: {}", e)))?;

    Ok(Run {
        id,
        job_id,
        started_at: parse_timestamp(&key, "started_at", required(&key, map, "started_at")?)?,
        finished_at: parse_timestamp(&key, "finished_at", required(&key, map, "finished_at")?)?,
        tests_total,
        tests_failed,
        coverage,
        artifacts_path: map.get("artifacts_path").cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_naming() {
        assert_eq!(job_key(7), "testsmith:job:7");
        assert_eq!(job_runs_key(7), "testsmith:job:7:runs");
        assert_eq!(run_key(3), "testsmith:run:3");
        assert_eq!(cancel_key(7), "testsmith:cancel:7");
    }

    #[test]
    fn test_keys_deterministic() {
        assert_eq!(job_key(42), job_key(42));
        assert!(run_key(42).starts_with("testsmith:run:"));
    }

    #[test]
    fn test_job_fields_round_trip() {
        let job = Job {
            id: 9,
            repo_ref: "https://example.com/repo.git".to_string(),
            created_at: Utc::now(),
            status: JobStatus::Queued,
            commit: Some("abc123".to_string()),
            language: Some("python".to_string()),
        };

        let map: HashMap<String, String> = job_fields(&job)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let parsed = job_from_fields(9, &map).unwrap();

        assert_eq!(parsed.repo_ref, job.repo_ref);
        assert_eq!(parsed.status, JobStatus::Queued);
        assert_eq!(parsed.commit.as_deref(), Some("abc123"));
        assert_eq!(parsed.language.as_deref(), Some("python"));
        assert_eq!(parsed.created_at, job.created_at);
    }

    #[test]
    fn test_job_optional_fields_absent() {
        let job = Job {
            id: 1,
            repo_ref: "/srv/code".to_string(),
            created_at: Utc::now(),
            status: JobStatus::Done,
            commit: None,
            language: None,
        };

        let map: HashMap<String, String> = job_fields(&job)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let parsed = job_from_fields(1, &map).unwrap();

        assert!(parsed.commit.is_none());
        assert!(parsed.language.is_none());
    }

    #[test]
    fn test_job_missing_field_is_corrupt() {
        let map = HashMap::from([("status".to_string(), "queued".to_string())]);
        let err = job_from_fields(2, &map).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_job_unknown_status_is_corrupt() {
        let mut map = HashMap::new();
        map.insert("repo_ref".to_string(), "x".to_string());
        map.insert("created_at".to_string(), Utc::now().to_rfc3339());
        map.insert("status".to_string(), "exploded".to_string());
        let err = job_from_fields(2, &map).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_run_fields_round_trip() {
        let run = Run {
            id: 4,
            job_id: 9,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            tests_total: 12,
            tests_failed: 3,
            coverage: 81.5,
            artifacts_path: None,
        };

        let map: HashMap<String, String> = run_fields(&run)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let parsed = run_from_fields(4, &map).unwrap();

        assert_eq!(parsed.job_id, 9);
        assert_eq!(parsed.tests_total, 12);
        assert_eq!(parsed.tests_failed, 3);
        assert_eq!(parsed.coverage, 81.5);
        assert!(parsed.artifacts_path.is_none());
    }
}
