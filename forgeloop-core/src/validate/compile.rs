//! Compile validation against a real compiler
//!
//! Invocation is `<compiler> <options...> -o <base> <source>`. Success is
//! the compiler's exit status alone; nothing checks the produced binary.

use super::{render_command, run_captured, CompileValidator, Finished};
use crate::archive::Archiver;
use crate::error::{self, Error, Result};
use crate::workspace::Workspace;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub compiler: String,
    pub options: Vec<String>,
    /// Append compiler stdout to the diagnostic instead of stderr alone
    pub merge_output: bool,
    pub timeout: Duration,
}

impl CompilerSettings {
    pub fn new(compiler: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
            options: Vec::new(),
            merge_output: false,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_merged_output(mut self, merge: bool) -> Self {
        self.merge_output = merge;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of compiling one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileOutcome {
    pub attempt: usize,
    pub success: bool,
    /// Compiler diagnostics, captured whether or not they are displayed
    pub diagnostic: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Where the previous candidate was archived before this write
    pub archived: Option<PathBuf>,
}

impl CompileOutcome {
    pub fn passed(attempt: usize) -> Self {
        Self {
            attempt,
            success: true,
            diagnostic: String::new(),
            exit_code: Some(0),
            timed_out: false,
            archived: None,
        }
    }

    pub fn failed(attempt: usize, diagnostic: impl Into<String>) -> Self {
        Self {
            attempt,
            success: false,
            diagnostic: diagnostic.into(),
            exit_code: Some(1),
            timed_out: false,
            archived: None,
        }
    }

    pub fn with_archived(mut self, archived: Option<PathBuf>) -> Self {
        self.archived = archived;
        self
    }
}

/// Compiles candidates with an external compiler at the workspace's fixed paths
#[derive(Debug)]
pub struct CompilerValidator {
    settings: CompilerSettings,
    workspace: Workspace,
    archiver: Archiver,
}

impl CompilerValidator {
    pub fn new(settings: CompilerSettings, workspace: Workspace) -> Self {
        let archiver = Archiver::new(workspace.clone());
        Self {
            settings,
            workspace,
            archiver,
        }
    }

    pub fn archiver(&self) -> &Archiver {
        &self.archiver
    }

    fn args(&self) -> Vec<String> {
        let mut args = self.settings.options.clone();
        args.push("-o".to_string());
        args.push(self.workspace.base_name().display().to_string());
        args.push(self.workspace.source_path().display().to_string());
        args
    }
}

impl CompileValidator for CompilerValidator {
    async fn compile(&mut self, code: &str, attempt: usize) -> Result<CompileOutcome> {
        let archived = self
            .archiver
            .archive(attempt)
            .await
            .map_err(|e| e.with_operation("compile::compile").with_context("attempt", attempt.to_string()))?;

        let source = self.workspace.source_path();
        tokio::fs::write(source, code)
            .await
            .map_err(|e| error::io_at(e, "compile::write_source", source))?;

        let args = self.args();
        tracing::debug!(command = %render_command(&self.settings.compiler, &args), attempt, "compiling");

        let mut cmd = Command::new(&self.settings.compiler);
        cmd.args(&args);

        let finished = run_captured(cmd, None, self.settings.timeout)
            .await
            .map_err(|e| {
                Error::spawn_failed(&self.settings.compiler, e.to_string())
                    .with_operation("compile::compile")
                    .set_source(e)
            })?;

        let outcome = match finished {
            Finished::Exited(captured) => {
                let diagnostic = if self.settings.merge_output && !captured.stdout.is_empty() {
                    format!("{}{}", captured.stdout, captured.stderr)
                } else {
                    captured.stderr
                };
                tracing::debug!(
                    attempt,
                    success = captured.success,
                    exit_code = ?captured.exit_code,
                    elapsed_ms = captured.duration.as_millis() as u64,
                    "compiler finished"
                );
                CompileOutcome {
                    attempt,
                    success: captured.success,
                    diagnostic,
                    exit_code: captured.exit_code,
                    timed_out: false,
                    archived: None,
                }
            }
            Finished::TimedOut(_) => {
                let secs = self.settings.timeout.as_secs();
                tracing::warn!(attempt, timeout_secs = secs, "compiler timed out");
                CompileOutcome {
                    attempt,
                    success: false,
                    diagnostic: format!("compilation timed out after {}s", secs),
                    exit_code: None,
                    timed_out: true,
                    archived: None,
                }
            }
        };

        Ok(outcome.with_archived(archived))
    }

    fn command_line(&self) -> String {
        render_command(&self.settings.compiler, &self.args())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    // `sh -c <script> -o <base> <source>` binds $0=-o, $1=<base>, $2=<source>.
    fn sh_compiler(script: &str) -> CompilerSettings {
        CompilerSettings::new("sh").with_options(["-c", script])
    }

    fn workspace(dir: &tempfile::TempDir) -> Workspace {
        Workspace::new(dir.path().join("foo.f90")).unwrap()
    }

    #[tokio::test]
    async fn test_success_is_exit_status_zero() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let mut validator = CompilerValidator::new(sh_compiler("exit 0"), ws.clone());

        let outcome = validator.compile("program p\nend program p", 1).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.attempt, 1);
        assert_eq!(outcome.archived, None);
        assert_eq!(std::fs::read_to_string(ws.source_path()).unwrap(), "program p\nend program p");
    }

    #[tokio::test]
    async fn test_failure_captures_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let mut validator = CompilerValidator::new(
            sh_compiler("echo \"$2:1: Error: Unclassifiable statement\" >&2; exit 1"),
            workspace(&dir),
        );

        let outcome = validator.compile("garbage", 1).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(1));
        assert!(outcome.diagnostic.contains("Unclassifiable statement"));
        assert!(outcome.diagnostic.contains("foo.f90"));
    }

    #[tokio::test]
    async fn test_merged_output() {
        let dir = tempfile::tempdir().unwrap();
        let settings = sh_compiler("echo warning; echo error >&2; exit 1").with_merged_output(true);
        let mut validator = CompilerValidator::new(settings, workspace(&dir));

        let outcome = validator.compile("x", 1).await.unwrap();
        assert_eq!(outcome.diagnostic, "warning\nerror\n");
    }

    #[tokio::test]
    async fn test_archives_before_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        // Compiles only when the source already has an archived predecessor.
        let script = "test -f \"$(dirname \"$2\")/foo1.f90\"";
        let mut validator = CompilerValidator::new(sh_compiler(script), ws.clone());

        assert!(!validator.compile("first", 1).await.unwrap().success);
        let second = validator.compile("second", 2).await.unwrap();

        assert!(second.success);
        assert_eq!(second.archived, Some(ws.archive_path(1)));
        assert_eq!(std::fs::read_to_string(ws.archive_path(1)).unwrap(), "first");
        assert_eq!(std::fs::read_to_string(ws.source_path()).unwrap(), "second");
        assert_eq!(validator.archiver().entries().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_a_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let settings = sh_compiler("sleep 5").with_timeout(Duration::from_millis(100));
        let mut validator = CompilerValidator::new(settings, workspace(&dir));

        let outcome = validator.compile("x", 1).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.timed_out);
        assert_eq!(outcome.diagnostic, "compilation timed out after 0s");
    }

    #[tokio::test]
    async fn test_missing_compiler_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CompilerSettings::new("definitely-not-a-compiler-xyz");
        let mut validator = CompilerValidator::new(settings, workspace(&dir));

        let err = validator.compile("x", 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SpawnFailed);
        assert_eq!(err.context_value("program"), Some("definitely-not-a-compiler-xyz"));
    }

    #[test]
    fn test_command_line() {
        let ws = Workspace::new("foo.f90").unwrap();
        let settings = CompilerSettings::new("gfortran").with_options(["-O2", "-Wall"]);
        let validator = CompilerValidator::new(settings, ws);
        assert_eq!(validator.command_line(), "gfortran -O2 -Wall -o foo foo.f90");
    }
}
