//! In-memory adapters for the store and queue ports.
//!
//! Used by the test suites and by embedded setups that run submission and
//! worker in one process. Behavior mirrors the Redis adapters: ids are
//! monotonic from 1, listings are newest first, pops are FIFO.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{QueueError, StoreError};
use crate::queue::JobQueue;
use crate::store::JobStore;
use crate::types::{Job, JobStatus, NewRun, Run};

#[derive(Default)]
struct StoreInner {
    jobs: BTreeMap<i64, Job>,
    runs: BTreeMap<i64, Run>,
    cancels: HashSet<i64>,
    next_job_id: i64,
    next_run_id: i64,
}

/// In-memory [`JobStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A poisoned lock only means another test thread panicked; the data
        // itself is still consistent enough to keep serving.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, repo_ref: &str, language: Option<&str>) -> Result<Job, StoreError> {
        let mut inner = self.lock();
        inner.next_job_id += 1;
        let job = Job {
            id: inner.next_job_id,
            repo_ref: repo_ref.to_string(),
            created_at: Utc::now(),
            status: JobStatus::Queued,
            commit: None,
            language: language.map(str::to_string),
        };
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: i64) -> Result<Option<Job>, StoreError> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    async fn recent_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        // Ids are assigned in creation order, so descending id is newest
        // first, same as the Redis index.
        Ok(self
            .lock()
            .jobs
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: i64, status: JobStatus) -> Result<(), StoreError> {
        if let Some(job) = self.lock().jobs.get_mut(&id) {
            job.status = status;
        }
        Ok(())
    }

    async fn set_commit(&self, id: i64, commit: &str) -> Result<(), StoreError> {
        if let Some(job) = self.lock().jobs.get_mut(&id) {
            job.commit = Some(commit.to_string());
        }
        Ok(())
    }

    async fn create_run(&self, new: NewRun) -> Result<Run, StoreError> {
        let mut inner = self.lock();
        inner.next_run_id += 1;
        let run = Run {
            id: inner.next_run_id,
            job_id: new.job_id,
            started_at: new.started_at,
            finished_at: new.finished_at,
            tests_total: new.metrics.tests_total,
            tests_failed: new.metrics.tests_failed,
            coverage: new.metrics.coverage,
            artifacts_path: new.artifacts_path,
        };
        inner.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn runs_for_job(&self, job_id: i64) -> Result<Vec<Run>, StoreError> {
        Ok(self
            .lock()
            .runs
            .values()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn request_cancel(&self, id: i64) -> Result<(), StoreError> {
        self.lock().cancels.insert(id);
        Ok(())
    }

    async fn cancel_requested(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.lock().cancels.contains(&id))
    }
}

/// In-memory FIFO [`JobQueue`].
#[derive(Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<i64>>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<i64>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn push(&self, job_id: i64) -> Result<(), QueueError> {
        self.lock().push_back(job_id);
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<i64>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(id) = self.lock().pop_front() {
                return Ok(Some(id));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wait = tokio::time::timeout_at(deadline, self.notify.notified());
            if wait.await.is_err() {
                // Timed out while waiting; one last check in case of a push
                // racing the deadline.
                return Ok(self.lock().pop_front());
            }
        }
    }

    async fn depth(&self) -> Result<usize, QueueError> {
        Ok(self.lock().len())
    }
}
