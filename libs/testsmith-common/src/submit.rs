//! Submission service shared by the API and the CLI.
//!
//! Creating the job record and enqueueing its id happen here, behind the
//! queue-depth admission check, so every entry point rejects the same way
//! once the backlog is full.

use crate::error::SubmitError;
use crate::queue::JobQueue;
use crate::store::JobStore;
use crate::types::Job;

/// Create a `queued` job and push its id onto the work queue.
///
/// Rejects with [`SubmitError::QueueFull`] before creating anything when the
/// backlog has reached `max_queue_depth`. On success the caller already holds
/// the job id; pipeline progress is observed by polling the store.
pub async fn submit_job(
    store: &dyn JobStore,
    queue: &dyn JobQueue,
    repo_ref: &str,
    language: Option<&str>,
    max_queue_depth: usize,
) -> Result<Job, SubmitError> {
    let depth = queue.depth().await?;
    if depth >= max_queue_depth {
        return Err(SubmitError::QueueFull {
            depth,
            limit: max_queue_depth,
        });
    }

    let job = store.create_job(repo_ref, language).await?;
    queue.push(job.id).await?;
    Ok(job)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::memory::{MemoryQueue, MemoryStore};
    use crate::types::JobStatus;

    #[tokio::test]
    async fn test_submit_creates_and_enqueues() {
        let store = MemoryStore::new();
        let queue = MemoryQueue::new();

        let job = submit_job(&store, &queue, "https://example.com/r.git", None, 8)
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.repo_ref, "https://example.com/r.git");

        let popped = queue.pop(Duration::from_millis(10)).await.unwrap();
        assert_eq!(popped, Some(job.id));
    }

    #[tokio::test]
    async fn test_submit_rejects_when_queue_full() {
        let store = MemoryStore::new();
        let queue = MemoryQueue::new();

        submit_job(&store, &queue, "a", None, 2).await.unwrap();
        submit_job(&store, &queue, "b", None, 2).await.unwrap();
        let err = submit_job(&store, &queue, "c", None, 2).await.unwrap_err();

        assert!(matches!(
            err,
            SubmitError::QueueFull { depth: 2, limit: 2 }
        ));
        // Rejected submissions must not leave a half-created job behind.
        assert!(store.get_job(3).await.unwrap().is_none());
        assert_eq!(queue.depth().await.unwrap(), 2);
    }
}
