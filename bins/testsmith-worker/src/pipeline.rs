/// Job Pipeline - One Job, Start to Terminal Status
///
/// **Core Responsibility:**
/// Drive a single job through workspace acquisition, test provisioning,
/// suite execution and report parsing, persisting the run and the terminal
/// status.
///
/// **State machine:**
/// `queued` -> `failed_clone` | `failed` | `done`, strictly forward, no
/// automatic retries. Failing suites still finish `done`; only the pipeline
/// itself failing produces a failure status.
///
/// **Failure policy:**
/// Nothing escapes `process_job`. Every fault is converted into a terminal
/// status update so a job can never be left dangling by a background unit
/// that died silently.
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use testsmith_common::store::JobStore;
use testsmith_common::types::{Job, JobStatus, NewRun};

use crate::provision::Provisioner;
use crate::report;
use crate::runner::TestRunner;
use crate::workspace::{Workspace, WorkspaceManager};

pub struct Pipeline {
    store: Arc<dyn JobStore>,
    workspaces: Arc<WorkspaceManager>,
    provisioner: Arc<Provisioner>,
    runner: Arc<dyn TestRunner>,
    cleanup_workspaces: bool,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        workspaces: Arc<WorkspaceManager>,
        provisioner: Arc<Provisioner>,
        runner: Arc<dyn TestRunner>,
        cleanup_workspaces: bool,
    ) -> Self {
        Self {
            store,
            workspaces,
            provisioner,
            runner,
            cleanup_workspaces,
        }
    }

    /// Run one job to a terminal status. Infallible by design: errors become
    /// status updates, not return values.
    pub async fn process_job(&self, job_id: i64) {
        let job = match self.store.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id, "queued id has no job record, skipping");
                return;
            }
            Err(e) => {
                error!(job_id, error = %e, "could not load job, skipping");
                return;
            }
        };

        // Re-delivery of a finished job (restart, duplicate enqueue) is a
        // no-op; status never moves backwards.
        if job.status.is_terminal() {
            warn!(job_id, status = %job.status, "job already terminal, skipping");
            return;
        }

        info!(job_id, repo_ref = %job.repo_ref, "starting pipeline");

        let workspace = match self.acquire_workspace(&job).await {
            Some(ws) => ws,
            None => {
                self.finish(job_id, JobStatus::FailedClone).await;
                return;
            }
        };

        if let Some(commit) = &workspace.commit {
            if let Err(e) = self.store.set_commit(job_id, commit).await {
                warn!(job_id, error = %e, "could not record workspace commit");
            }
        }

        if self.cancelled(job_id).await {
            info!(job_id, "cancellation requested, aborting before execution");
            self.workspaces.cleanup(&workspace);
            self.finish(job_id, JobStatus::Failed).await;
            return;
        }

        let provisioned = {
            let provisioner = self.provisioner.clone();
            let path = workspace.path.clone();
            tokio::task::spawn_blocking(move || provisioner.provision(&path)).await
        };
        let test_file = match provisioned {
            Ok(Ok(path)) => path,
            Ok(Err(e)) => {
                warn!(job_id, error = %e, "test provisioning failed");
                self.workspaces.cleanup(&workspace);
                self.finish(job_id, JobStatus::Failed).await;
                return;
            }
            Err(e) => {
                error!(job_id, error = %e, "provisioning task panicked");
                self.workspaces.cleanup(&workspace);
                self.finish(job_id, JobStatus::Failed).await;
                return;
            }
        };
        debug!(job_id, test_file = %test_file.display(), "suite ready");

        let started_at = Utc::now();
        let output = match self
            .runner
            .run(&workspace.path, job.language.as_deref())
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(job_id, error = %e, "test run could not be executed");
                self.workspaces.cleanup(&workspace);
                self.finish(job_id, JobStatus::Failed).await;
                return;
            }
        };
        let finished_at = Utc::now();

        // Exit status is data: a red suite is still a completed run.
        debug!(job_id, exit_code = ?output.exit_code, "runner finished");
        let metrics = report::parse(&output.text);

        let retain_workspace = !workspace.ephemeral || !self.cleanup_workspaces;
        let artifacts_path = retain_workspace
            .then(|| workspace.path.display().to_string());

        let persisted = self
            .store
            .create_run(NewRun {
                job_id,
                started_at,
                finished_at,
                metrics,
                artifacts_path,
            })
            .await;

        match persisted {
            Ok(run) => {
                info!(
                    job_id,
                    run_id = run.id,
                    tests_total = run.tests_total,
                    tests_failed = run.tests_failed,
                    coverage = run.coverage,
                    "run recorded"
                );
                self.finish(job_id, JobStatus::Done).await;
            }
            Err(e) => {
                error!(job_id, error = %e, "could not persist run");
                self.finish(job_id, JobStatus::Failed).await;
            }
        }

        if !retain_workspace {
            self.workspaces.cleanup(&workspace);
        }
    }

    /// Clone/resolve on the blocking pool; `None` already means the job must
    /// finish as `failed_clone`.
    async fn acquire_workspace(&self, job: &Job) -> Option<Workspace> {
        let manager = self.workspaces.clone();
        let reference = job.repo_ref.clone();
        let job_id = job.id;

        match tokio::task::spawn_blocking(move || manager.acquire(&reference)).await {
            Ok(Ok(ws)) => {
                debug!(job_id, path = %ws.path.display(), "workspace ready");
                Some(ws)
            }
            Ok(Err(e)) => {
                warn!(job_id, error = %e, "workspace acquisition failed");
                None
            }
            Err(e) => {
                error!(job_id, error = %e, "workspace task panicked");
                None
            }
        }
    }

    async fn cancelled(&self, job_id: i64) -> bool {
        match self.store.cancel_requested(job_id).await {
            Ok(flag) => flag,
            Err(e) => {
                // Keep going on a flaky flag read; a false negative only
                // means the job completes normally.
                warn!(job_id, error = %e, "could not read cancellation flag");
                false
            }
        }
    }

    async fn finish(&self, job_id: i64, status: JobStatus) {
        match self.store.update_status(job_id, status).await {
            Ok(()) => info!(job_id, status = %status, "job finished"),
            Err(e) => {
                error!(job_id, status = %status, error = %e, "could not record terminal status");
            }
        }
    }
}
