//! Run validation of a compiled candidate
//!
//! The executable gets one fixed line on stdin. A clean exit passes; any
//! other exit hands its stderr back as the corrective signal.

use super::{run_captured, Finished, RunValidator};
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Standard input fed to the program
    pub input: String,
    pub timeout: Duration,
}

impl RunSettings {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::new("5\n")
    }
}

/// Result of executing one compiled candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Exited cleanly
    Passed { stdout: String, stderr: String },
    /// Non-clean exit, or killed at the deadline
    Failed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        timed_out: bool,
    },
    /// Compile reported success but no binary exists
    Missing { path: PathBuf },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Passed { .. })
    }

    pub fn stdout(&self) -> &str {
        match self {
            RunOutcome::Passed { stdout, .. } | RunOutcome::Failed { stdout, .. } => stdout,
            RunOutcome::Missing { .. } => "",
        }
    }

    /// Text describing a failed run for the next corrective prompt
    pub fn error_text(&self) -> String {
        match self {
            RunOutcome::Passed { .. } => String::new(),
            RunOutcome::Failed { stderr, exit_code, .. } if stderr.trim().is_empty() => match exit_code {
                Some(code) => format!("program exited with status {} and no error output", code),
                None => "program was terminated by a signal".to_string(),
            },
            RunOutcome::Failed { stderr, .. } => stderr.clone(),
            RunOutcome::Missing { path } => format!("executable not found at {}", path.display()),
        }
    }
}

/// Runs candidates as real processes
#[derive(Debug, Clone, Default)]
pub struct ExecutableRunner {
    settings: RunSettings,
}

impl ExecutableRunner {
    pub fn new(settings: RunSettings) -> Self {
        Self { settings }
    }
}

impl RunValidator for ExecutableRunner {
    async fn run(&mut self, executable: &Path) -> Result<RunOutcome> {
        let exists = tokio::fs::try_exists(executable).await.unwrap_or(false);
        if !exists {
            return Ok(RunOutcome::Missing {
                path: executable.to_path_buf(),
            });
        }

        tracing::debug!(executable = %executable.display(), "running candidate");
        let finished = run_captured(
            Command::new(executable),
            Some(self.settings.input.as_str()),
            self.settings.timeout,
        )
        .await
        .map_err(|e| {
            Error::spawn_failed(executable.display().to_string(), e.to_string())
                .with_operation("run::run")
                .set_source(e)
        })?;

        Ok(match finished {
            Finished::Exited(c) if c.success => RunOutcome::Passed {
                stdout: c.stdout,
                stderr: c.stderr,
            },
            Finished::Exited(c) => RunOutcome::Failed {
                exit_code: c.exit_code,
                stdout: c.stdout,
                stderr: c.stderr,
                timed_out: false,
            },
            Finished::TimedOut(_) => RunOutcome::Failed {
                exit_code: None,
                stdout: String::new(),
                stderr: format!("execution timed out after {}s", self.settings.timeout.as_secs()),
                timed_out: true,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_text() {
        let failed = RunOutcome::Failed {
            exit_code: Some(2),
            stdout: String::new(),
            stderr: "At line 7: Fortran runtime error: Array bound mismatch".into(),
            timed_out: false,
        };
        assert!(!failed.is_success());
        assert!(failed.error_text().contains("Array bound mismatch"));

        let silent = RunOutcome::Failed {
            exit_code: Some(1),
            stdout: "partial".into(),
            stderr: String::new(),
            timed_out: false,
        };
        assert_eq!(silent.error_text(), "program exited with status 1 and no error output");
        assert_eq!(silent.stdout(), "partial");
    }

    #[tokio::test]
    async fn test_missing_executable_is_not_attempted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope");
        let outcome = ExecutableRunner::default().run(&path).await.unwrap();

        assert_eq!(outcome, RunOutcome::Missing { path });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_with_fixed_input() {
        let outcome = ExecutableRunner::default().run(Path::new("/bin/cat")).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.stdout(), "5\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        // sh reads its script from stdin.
        let mut runner = ExecutableRunner::new(RunSettings::new("echo boom >&2; exit 1\n"));
        let outcome = runner.run(Path::new("/bin/sh")).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Failed { exit_code: Some(1), timed_out: false, .. }));
        assert_eq!(outcome.error_text(), "boom\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_program_is_killed_at_deadline() {
        let settings = RunSettings::new("sleep 5\n").with_timeout(Duration::from_millis(100));
        let outcome = ExecutableRunner::new(settings).run(Path::new("/bin/sh")).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Failed { exit_code: None, timed_out: true, .. }));
        assert!(outcome.error_text().starts_with("execution timed out after"));
    }
}
