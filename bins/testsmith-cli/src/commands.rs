// CLI commands operating on the shared store and queue
use anyhow::{bail, Context, Result};

use testsmith_common::config;
use testsmith_common::error::SubmitError;
use testsmith_common::queue::RedisQueue;
use testsmith_common::store::{JobStore, RedisStore, RECENT_JOBS_LIMIT};
use testsmith_common::submit;

async fn open() -> Result<(RedisStore, RedisQueue)> {
    let url = config::redis_url();
    let conn = config::connect(&url)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", url))?;
    Ok((RedisStore::new(conn.clone()), RedisQueue::new(conn)))
}

/// Submit a repository reference and print the assigned job id.
pub async fn submit(repo_ref: &str, language: Option<&str>) -> Result<()> {
    let (store, queue) = open().await?;
    let max_depth = config::env_usize("MAX_QUEUE_DEPTH", 64);

    match submit::submit_job(&store, &queue, repo_ref, language, max_depth).await {
        Ok(job) => {
            println!("✓ Job {} queued", job.id);
            println!("  repo:   {}", job.repo_ref);
            if let Some(language) = &job.language {
                println!("  runner: {}", language);
            }
            println!("  poll with: testsmith-cli status {}", job.id);
            Ok(())
        }
        Err(SubmitError::QueueFull { depth, limit }) => {
            bail!("work queue is full ({} waiting, limit {}); retry later", depth, limit)
        }
        Err(e) => Err(e).context("Failed to submit job"),
    }
}

/// Print one job and its runs as pretty JSON.
pub async fn status(job_id: i64) -> Result<()> {
    let (store, _queue) = open().await?;

    let Some(job) = store.get_job(job_id).await? else {
        bail!("job {} not found", job_id);
    };
    println!("{}", serde_json::to_string_pretty(&job)?);

    let runs = store.runs_for_job(job_id).await?;
    if runs.is_empty() {
        println!("(no runs recorded yet)");
    } else {
        println!("{}", serde_json::to_string_pretty(&runs)?);
    }
    Ok(())
}

/// List recent jobs, newest first.
pub async fn recent() -> Result<()> {
    let (store, _queue) = open().await?;

    let jobs = store.recent_jobs(RECENT_JOBS_LIMIT).await?;
    if jobs.is_empty() {
        println!("No jobs submitted yet");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{:>6}  {:<12}  {}",
            job.id,
            job.status.as_str(),
            job.repo_ref
        );
    }
    Ok(())
}

/// Flag a queued job for cancellation.
pub async fn cancel(job_id: i64) -> Result<()> {
    let (store, _queue) = open().await?;

    if store.get_job(job_id).await?.is_none() {
        bail!("job {} not found", job_id);
    }

    store.request_cancel(job_id).await?;
    println!("✓ Cancellation requested for job {}", job_id);
    println!("  takes effect before execution starts");
    Ok(())
}
