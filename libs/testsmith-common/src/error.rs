use thiserror::Error;

/// Persistence failures from a [`crate::store::JobStore`] adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored record is missing required fields or holds values that no
    /// longer parse. Surfaced instead of silently dropping the record.
    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Transport failures from a [`crate::queue::JobQueue`] adapter.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Failures on the submission path.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Admission control: the work queue already holds `limit` jobs.
    #[error("work queue is full ({depth} waiting, limit {limit})")]
    QueueFull { depth: usize, limit: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
