/// Test Runner - Sandboxed Suite Execution
///
/// **Core Responsibility:**
/// Run the provisioned suite as a subprocess in the workspace and hand the
/// combined output to the report parser.
///
/// **Rules:**
/// - The workspace is the working directory, so relative imports resolve.
/// - The exit status is informational only: a suite with failing tests is a
///   successful run. Only failure to execute at all (launch error, timeout)
///   is a runner error.
/// - A hard wall-clock timeout bounds the run; on expiry the child is
///   killed and the run reported as timed out.
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RunnerRegistry;

#[derive(Debug, Error)]
pub enum ExecError {
    /// The runner process could not be started at all (missing tool,
    /// permission error). Maps to job status `failed`.
    #[error("failed to launch test runner '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("test run exceeded {timeout_secs}s and was killed")]
    TimedOut { timeout_secs: u64 },

    #[error("i/o error while capturing runner output: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw result of one suite execution.
#[derive(Debug)]
pub struct RunOutput {
    /// Stdout followed by stderr, as one blob for the parser.
    pub text: String,
    pub exit_code: Option<i32>,
}

/// Execution seam; production uses [`CoverageRunner`], tests substitute
/// canned implementations.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, workspace: &Path, language: Option<&str>)
        -> Result<RunOutput, ExecError>;
}

/// Spawns the coverage-instrumented test command selected by the job's
/// language hint.
pub struct CoverageRunner {
    registry: RunnerRegistry,
    timeout: Duration,
}

impl CoverageRunner {
    pub fn new(registry: RunnerRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }
}

#[async_trait]
impl TestRunner for CoverageRunner {
    async fn run(
        &self,
        workspace: &Path,
        language: Option<&str>,
    ) -> Result<RunOutput, ExecError> {
        let profile = self.registry.profile_for(language);
        debug!(
            program = %profile.program,
            language = %profile.language,
            workspace = %workspace.display(),
            "launching test runner"
        );

        let child = tokio::process::Command::new(&profile.program)
            .args(&profile.args)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: profile.program.clone(),
                source,
            })?;

        // kill_on_drop reaps the child when the timeout drops the future.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                if !output.stderr.is_empty() {
                    if !text.is_empty() && !text.ends_with('\n') {
                        text.push('\n');
                    }
                    text.push_str(&String::from_utf8_lossy(&output.stderr));
                }
                Ok(RunOutput {
                    text,
                    exit_code: output.status.code(),
                })
            }
            Ok(Err(source)) => Err(ExecError::Io(source)),
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs(),
                    workspace = %workspace.display(),
                    "test run timed out, child killed"
                );
                Err(ExecError::TimedOut {
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerProfile;
    use tempfile::TempDir;

    fn runner_with(program: &str, args: &[&str], timeout: Duration) -> CoverageRunner {
        let registry = RunnerRegistry::new(vec![RunnerProfile {
            language: "python".to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }])
        .unwrap();
        CoverageRunner::new(registry, timeout)
    }

    #[tokio::test]
    async fn test_captures_output() {
        let ws = TempDir::new().unwrap();
        let runner = runner_with("echo", &["3 passed in 0.01s"], Duration::from_secs(5));

        let out = runner.run(ws.path(), None).await.unwrap();

        assert!(out.text.contains("3 passed"));
        assert_eq!(out.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_runs_in_workspace_directory() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("marker.txt"), "from-workspace").unwrap();
        let runner = runner_with("cat", &["marker.txt"], Duration::from_secs(5));

        let out = runner.run(ws.path(), None).await.unwrap();
        assert!(out.text.contains("from-workspace"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let ws = TempDir::new().unwrap();
        // sh -c "exit 1" == a suite that ran and had failures.
        let runner = runner_with("sh", &["-c", "echo '1 failed'; exit 1"], Duration::from_secs(5));

        let out = runner.run(ws.path(), None).await.unwrap();
        assert_eq!(out.exit_code, Some(1));
        assert!(out.text.contains("1 failed"));
    }

    #[tokio::test]
    async fn test_stderr_is_appended() {
        let ws = TempDir::new().unwrap();
        let runner = runner_with(
            "sh",
            &["-c", "echo on-stdout; echo on-stderr >&2"],
            Duration::from_secs(5),
        );

        let out = runner.run(ws.path(), None).await.unwrap();
        assert!(out.text.contains("on-stdout"));
        assert!(out.text.contains("on-stderr"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let ws = TempDir::new().unwrap();
        let runner = runner_with("testsmith-no-such-runner", &[], Duration::from_secs(5));

        let err = runner.run(ws.path(), None).await.unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_run() {
        let ws = TempDir::new().unwrap();
        let runner = runner_with("sleep", &["5"], Duration::from_millis(100));

        let err = runner.run(ws.path(), None).await.unwrap_err();
        assert!(matches!(err, ExecError::TimedOut { .. }));
    }
}
