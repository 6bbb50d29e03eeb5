//! Work queue semantics and the Redis adapter.
//!
//! The queue carries job ids only; the store stays the single source of
//! truth for job state. RPUSH/BLPOP gives FIFO ordering, and the pop timeout
//! keeps worker loops responsive to shutdown.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::QueueError;

/// Single FIFO for all jobs; the language hint selects a runner profile at
/// execution time rather than a queue at submission time.
pub const WORK_QUEUE_KEY: &str = "testsmith:queue:jobs";

/// Transport port between submission and the worker pool.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn push(&self, job_id: i64) -> Result<(), QueueError>;

    /// Block up to `timeout` for the next job id; `None` on timeout.
    async fn pop(&self, timeout: Duration) -> Result<Option<i64>, QueueError>;

    /// Current number of queued ids, for admission control.
    async fn depth(&self) -> Result<usize, QueueError>;
}

/// Redis-backed [`JobQueue`].
#[derive(Clone)]
pub struct RedisQueue {
    conn: redis::aio::ConnectionManager,
}

impl RedisQueue {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn push(&self, job_id: i64) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(WORK_QUEUE_KEY, job_id).await?;
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<i64>, QueueError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, i64)> =
            conn.blpop(WORK_QUEUE_KEY, timeout.as_secs_f64()).await?;
        Ok(popped.map(|(_key, id)| id))
    }

    async fn depth(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(WORK_QUEUE_KEY).await?;
        Ok(len)
    }
}
