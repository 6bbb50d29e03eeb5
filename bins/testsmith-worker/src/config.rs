// Worker configuration: env-driven settings plus the runner profile registry.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use testsmith_common::config::{env_bool, env_u64, env_usize, redis_url};

/// Profile picked when a job carries no language hint.
pub const DEFAULT_LANGUAGE: &str = "python";

/// Settings for one worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    /// Fixed pool size; every worker runs one job at a time.
    pub worker_count: usize,
    /// Root under which cloned workspaces are created, one unique
    /// subdirectory per job.
    pub scratch_root: PathBuf,
    /// Hard wall-clock bound on one test run; the subprocess is killed on
    /// expiry.
    pub exec_timeout: Duration,
    /// Remove cloned workspaces after their run has been persisted.
    pub cleanup_workspaces: bool,
    /// External test-generation command, invoked as
    /// `<cmd...> <workspace> <spec_path>`. Whitespace-separated; unset means
    /// no hook.
    pub testgen_cmd: Option<Vec<String>>,
    /// Workspace-relative path handed to the hook as its specification.
    pub testgen_spec: String,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let scratch_root = std::env::var("SCRATCH_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("testsmith-workspaces"));

        let testgen_cmd = std::env::var("TESTGEN_CMD").ok().and_then(|raw| {
            let parts: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts)
            }
        });

        Self {
            redis_url: redis_url(),
            worker_count: env_usize("WORKER_COUNT", 4),
            scratch_root,
            exec_timeout: Duration::from_secs(env_u64("EXEC_TIMEOUT_SECS", 300)),
            cleanup_workspaces: env_bool("CLEANUP_WORKSPACES", false),
            testgen_cmd,
            testgen_spec: std::env::var("TESTGEN_SPEC")
                .unwrap_or_else(|_| ".testsmith/generate_tests.yaml".to_string()),
        }
    }
}

/// How to invoke the coverage-instrumented test command for one language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerProfile {
    pub language: String,
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunnersJson {
    runners: Vec<RunnerProfile>,
}

/// Registry of runner profiles keyed by language hint.
#[derive(Debug, Clone)]
pub struct RunnerRegistry {
    profiles: HashMap<String, RunnerProfile>,
    default: RunnerProfile,
}

impl RunnerRegistry {
    pub fn new(profiles: Vec<RunnerProfile>) -> Result<Self> {
        if profiles.is_empty() {
            bail!("runner registry needs at least one profile");
        }

        let mut by_language = HashMap::new();
        for profile in profiles {
            by_language.insert(profile.language.clone(), profile);
        }

        let default = by_language
            .get(DEFAULT_LANGUAGE)
            .or_else(|| by_language.values().next())
            .cloned()
            .context("runner registry needs at least one profile")?;

        Ok(Self {
            profiles: by_language,
            default,
        })
    }

    /// Load runner profiles from a runners.json file.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("runner config file not found: {}", config_path.display());
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read runners.json")?;
        let parsed: RunnersJson =
            serde_json::from_str(&content).context("Failed to parse runners.json")?;

        Self::new(parsed.runners)
    }

    /// Load with default path (config/runners.json).
    pub fn load_default() -> Result<Self> {
        Self::load(Path::new("config/runners.json"))
    }

    /// The compiled-in fallback: pytest with line coverage.
    pub fn builtin() -> Self {
        let pytest = RunnerProfile {
            language: DEFAULT_LANGUAGE.to_string(),
            program: "pytest".to_string(),
            args: vec![
                "--maxfail=1".to_string(),
                "--disable-warnings".to_string(),
                "--cov=.".to_string(),
                "--cov-report=term-missing".to_string(),
            ],
        };
        // new() cannot fail with a non-empty profile list.
        Self::new(vec![pytest]).unwrap_or_else(|_| unreachable!())
    }

    /// Profile for a job's language hint; unknown or absent hints fall back
    /// to the default profile.
    pub fn profile_for(&self, language: Option<&str>) -> &RunnerProfile {
        language
            .and_then(|hint| self.profiles.get(hint))
            .unwrap_or(&self.default)
    }

    pub fn list_languages(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_has_pytest() {
        let registry = RunnerRegistry::builtin();
        let profile = registry.profile_for(None);
        assert_eq!(profile.language, "python");
        assert_eq!(profile.program, "pytest");
        assert!(profile.args.iter().any(|a| a.starts_with("--cov")));
    }

    #[test]
    fn test_unknown_hint_falls_back_to_default() {
        let registry = RunnerRegistry::builtin();
        let profile = registry.profile_for(Some("cobol"));
        assert_eq!(profile.language, "python");
    }

    #[test]
    fn test_known_hint_selects_profile() {
        let registry = RunnerRegistry::new(vec![
            RunnerProfile {
                language: "python".to_string(),
                program: "pytest".to_string(),
                args: vec![],
            },
            RunnerProfile {
                language: "javascript".to_string(),
                program: "npx".to_string(),
                args: vec!["jest".to_string(), "--coverage".to_string()],
            },
        ])
        .unwrap();

        assert_eq!(registry.profile_for(Some("javascript")).program, "npx");
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert!(RunnerRegistry::new(Vec::new()).is_err());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = RunnerRegistry::load(Path::new("/definitely/not/here/runners.json"));
        assert!(result.is_err());
    }
}
