//! # Validators
//!
//! Candidates are judged by a real compiler and a real execution. Both sit
//! behind traits so the refinement loop can be driven by fakes in tests.
//!
//! A failed compile or a crashing program is an *outcome*, not an error:
//! it carries the diagnostic text that feeds the next corrective prompt.
//! Errors are reserved for conditions that end the session (the compiler
//! cannot be launched, the source cannot be written or archived).

pub mod compile;
pub mod run;

pub use compile::{CompileOutcome, CompilerSettings, CompilerValidator};
pub use run::{ExecutableRunner, RunOutcome, RunSettings};

use crate::error::Result;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Writes a candidate to the fixed source path and compiles it
#[allow(async_fn_in_trait)]
pub trait CompileValidator {
    /// Archive the previous candidate (attempt > 1), write `code`, compile.
    async fn compile(&mut self, code: &str, attempt: usize) -> Result<CompileOutcome>;

    /// The literal command line used for every compile
    fn command_line(&self) -> String;
}

/// Executes a compiled candidate
#[allow(async_fn_in_trait)]
pub trait RunValidator {
    async fn run(&mut self, executable: &Path) -> Result<RunOutcome>;
}

// ============================================================================
// Subprocess plumbing
// ============================================================================

/// Output of a subprocess that ran to completion
#[derive(Debug, Clone)]
pub(crate) struct Captured {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Debug)]
pub(crate) enum Finished {
    Exited(Captured),
    TimedOut(Duration),
}

/// Spawn `cmd`, feed it `stdin`, and collect both streams within `limit`.
///
/// A child still running at the deadline is killed.
pub(crate) async fn run_captured(
    mut cmd: Command,
    stdin: Option<&str>,
    limit: Duration,
) -> std::io::Result<Finished> {
    cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        // A child that exits without reading its input closes the pipe early.
        if let Err(e) = pipe.write_all(input.as_bytes()).await {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e);
            }
        }
        drop(pipe);
    }

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(output) => {
            let output = output?;
            Ok(Finished::Exited(Captured {
                exit_code: output.status.code(),
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration: start.elapsed(),
            }))
        }
        Err(_) => Ok(Finished::TimedOut(start.elapsed())),
    }
}

/// Render a program and its arguments the way a shell user would type them
pub(crate) fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_streams_and_status() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"]);

        match run_captured(cmd, None, Duration::from_secs(10)).await.unwrap() {
            Finished::Exited(c) => {
                assert!(!c.success);
                assert_eq!(c.exit_code, Some(3));
                assert_eq!(c.stdout, "out\n");
                assert_eq!(c.stderr, "err\n");
            }
            Finished::TimedOut(_) => panic!("should not time out"),
        }
    }

    #[tokio::test]
    async fn test_feeds_stdin() {
        let cmd = Command::new("cat");
        match run_captured(cmd, Some("5\n"), Duration::from_secs(10)).await.unwrap() {
            Finished::Exited(c) => {
                assert!(c.success);
                assert_eq!(c.stdout, "5\n");
            }
            Finished::TimedOut(_) => panic!("should not time out"),
        }
    }

    #[tokio::test]
    async fn test_deadline_kills_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let finished = run_captured(cmd, None, Duration::from_millis(100)).await.unwrap();
        assert!(matches!(finished, Finished::TimedOut(_)));
    }

    #[test]
    fn test_render_command() {
        let args = vec!["-O2".to_string(), "-o".to_string(), "foo".to_string(), "foo.f90".to_string()];
        assert_eq!(render_command("gfortran", &args), "gfortran -O2 -o foo foo.f90");
    }
}
