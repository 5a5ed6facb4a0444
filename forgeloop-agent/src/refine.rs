//! The refinement state machine
//!
//! ```text
//!            +------------+   candidate    +-----------------+
//!  start --> | GENERATING | -------------> | COMPILE_CHECKING|
//!            +------------+                +-----------------+
//!                  ^   ^   fail, budget left     |        |  fail, budget spent
//!                  |   +-------------------------+        +--------------------> FAILED_BUDGET_EXHAUSTED
//!                  |                                ok    |
//!                  |   runtime fix           +-------------+
//!                  +-------------------------| RUN_CHECKING| --> SUCCEEDED
//!                                            +-------------+
//! ```
//!
//! The refiner owns every piece of session state. Collaborators are injected
//! so the same loop drives a real oracle and compiler or test fakes.

use crate::budget::{Budget, BudgetTracker, Exhaustion};
use crate::candidate::{Candidate, Header, Origin};
use crate::prompt;
use forgeloop_core::{
    CompileOutcome, CompileValidator, Error, ExistingSource, Oracle, Result, RunOutcome,
    RunValidator, Settings, TargetLanguage, Workspace,
};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one refinement session
#[derive(Debug, Clone)]
pub struct RefineConfig {
    pub budget: Budget,
    pub language: TargetLanguage,
    /// Prefix every generated candidate with a provenance comment block
    pub include_header: bool,
    /// Where the specification came from, for the header
    pub prompt_source: String,
    /// Run the program once it compiles
    pub execute: bool,
    /// Ask for fixes when the program fails at runtime
    pub runtime_fix: bool,
    /// Program input, quoted in runtime-fix prompts
    pub run_input: String,
    pub existing_source: ExistingSource,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            budget: Budget::default(),
            language: TargetLanguage::default(),
            include_header: true,
            prompt_source: "prompt.txt".to_string(),
            execute: true,
            runtime_fix: true,
            run_input: "5\n".to_string(),
            existing_source: ExistingSource::Context,
        }
    }
}

impl RefineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            budget: Budget::from_settings(settings),
            language: settings.target_language(),
            include_header: settings.include_header,
            prompt_source: settings.prompt_file.display().to_string(),
            execute: settings.run_executable,
            runtime_fix: settings.max_runtime_fix_attempts > 0,
            run_input: settings.run_input.clone(),
            existing_source: settings.existing_source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Not started
    Idle,
    Generating,
    CompileChecking,
    RunChecking,
    Succeeded,
    FailedBudgetExhausted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::FailedBudgetExhausted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::Generating => "GENERATING",
            SessionState::CompileChecking => "COMPILE_CHECKING",
            SessionState::RunChecking => "RUN_CHECKING",
            SessionState::Succeeded => "SUCCEEDED",
            SessionState::FailedBudgetExhausted => "FAILED_BUDGET_EXHAUSTED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why execution stopped short of a clean run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    RuntimeFixDisabled,
    RuntimeFixesUsed,
    GenerationTimeSpent,
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AbandonReason::RuntimeFixDisabled => "runtime fixes are disabled",
            AbandonReason::RuntimeFixesUsed => "all runtime fix attempts used",
            AbandonReason::GenerationTimeSpent => "generation time limit reached",
        })
    }
}

/// What happened after the candidate compiled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Execution {
    NotRequested,
    Passed { stdout: String },
    /// Compilation succeeded but left no binary behind
    ExecutableMissing { path: PathBuf },
    Abandoned { reason: AbandonReason, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded { execution: Execution },
    Exhausted { exhaustion: Exhaustion },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }

    pub fn state(&self) -> SessionState {
        match self {
            Outcome::Succeeded { .. } => SessionState::Succeeded,
            Outcome::Exhausted { .. } => SessionState::FailedBudgetExhausted,
        }
    }
}

/// One candidate's trip through the validators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub attempt: usize,
    pub origin: Origin,
    #[serde(rename = "latency_secs", serialize_with = "crate::serialize_secs")]
    pub latency: Duration,
    /// Cumulative oracle time after this candidate
    #[serde(rename = "total_generation_secs", serialize_with = "crate::serialize_secs")]
    pub total_generation: Duration,
    pub loc: usize,
    pub fenced: bool,
    pub compiled: bool,
    pub archived: Option<PathBuf>,
    /// `None` when the candidate was never run
    pub run_passed: Option<bool>,
}

/// Everything a caller needs to know once a session is over
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub outcome: Outcome,
    pub state: SessionState,
    pub attempts: usize,
    pub runtime_fixes: usize,
    #[serde(rename = "generation_secs", serialize_with = "crate::serialize_secs")]
    pub generation_time: Duration,
    pub archived: Vec<PathBuf>,
    /// The last candidate, kept whether or not the session succeeded
    pub final_candidate: Candidate,
    pub last_diagnostic: Option<String>,
    pub compile_command: String,
    pub records: Vec<AttemptRecord>,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Progress notifications for whoever is watching the session
#[derive(Debug)]
pub enum RefineEvent<'a> {
    Transition {
        from: SessionState,
        to: SessionState,
    },
    Generated {
        candidate: &'a Candidate,
        total_generation: Duration,
    },
    Compiled {
        candidate: &'a Candidate,
        outcome: &'a CompileOutcome,
    },
    Ran {
        attempt: usize,
        outcome: &'a RunOutcome,
    },
    Finished {
        outcome: &'a Outcome,
    },
}

type EventCallback = Box<dyn FnMut(&RefineEvent<'_>)>;

enum RunStage {
    Settled(Execution),
    FixBrokeCompile(Exhaustion),
}

/// Drives one session from specification to a terminal state
pub struct Refiner<O, C, R> {
    oracle: O,
    compiler: C,
    runner: R,
    workspace: Workspace,
    config: RefineConfig,
    tracker: BudgetTracker,
    state: SessionState,
    records: Vec<AttemptRecord>,
    archived: Vec<PathBuf>,
    last_diagnostic: Option<String>,
    on_event: Option<EventCallback>,
}

impl<O, C, R> Refiner<O, C, R>
where
    O: Oracle,
    C: CompileValidator,
    R: RunValidator,
{
    pub fn new(oracle: O, compiler: C, runner: R, workspace: Workspace, config: RefineConfig) -> Self {
        Self {
            oracle,
            compiler,
            runner,
            workspace,
            config,
            tracker: BudgetTracker::new(),
            state: SessionState::Idle,
            records: Vec::new(),
            archived: Vec::new(),
            last_diagnostic: None,
            on_event: None,
        }
    }

    /// Set a callback for progress events
    pub fn with_event_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&RefineEvent<'_>) + 'static,
    {
        self.on_event = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tracker(&self) -> &BudgetTracker {
        &self.tracker
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run the session for `spec` until it succeeds or a budget runs out.
    ///
    /// A refiner runs once. Budget exhaustion is an `Ok` report; only fatal
    /// conditions (oracle failure, filesystem or spawn errors) are `Err`.
    pub async fn run(&mut self, spec: &str) -> Result<SessionReport> {
        if self.state != SessionState::Idle {
            return Err(Error::invalid_argument("a refinement session cannot be restarted")
                .with_operation("refiner::run")
                .with_context("state", self.state.as_str()));
        }

        let existing = match self.config.existing_source {
            ExistingSource::Ignore => None,
            _ => self
                .workspace
                .existing_source()
                .map_err(|e| e.with_operation("refiner::run"))?,
        };

        let mut candidate = match (self.config.existing_source, existing) {
            (ExistingSource::Seed, Some(code)) => self.seed(code),
            (_, existing) => {
                if existing.is_some() {
                    tracing::info!(
                        source = %self.workspace.source_path().display(),
                        "using existing source as context"
                    );
                }
                let prompt = prompt::initial(spec, existing.as_deref(), &self.config.language);
                self.generate(&prompt, Origin::Initial).await?
            }
        };

        loop {
            let outcome = self.compile_check(&candidate).await?;
            if outcome.success {
                break;
            }
            // Checked before spending more oracle time, even on the call that might fix it.
            if let Some(exhaustion) = self.tracker.compile_exhaustion(&self.config.budget) {
                return Ok(self.finish(Outcome::Exhausted { exhaustion }, candidate));
            }
            let prompt = prompt::compile_fix(&candidate.code, &outcome.diagnostic, &self.config.language);
            candidate = self.generate(&prompt, Origin::CompileFix).await?;
        }

        let execution = if self.config.execute {
            match self.run_stage(&mut candidate).await? {
                RunStage::Settled(execution) => execution,
                RunStage::FixBrokeCompile(exhaustion) => {
                    return Ok(self.finish(Outcome::Exhausted { exhaustion }, candidate))
                }
            }
        } else {
            Execution::NotRequested
        };

        Ok(self.finish(Outcome::Succeeded { execution }, candidate))
    }

    fn seed(&mut self, code: String) -> Candidate {
        self.transition(SessionState::Generating);
        let attempt = self.tracker.record_generation(Duration::ZERO);
        tracing::info!(
            attempt,
            source = %self.workspace.source_path().display(),
            "seeding from existing source"
        );
        let candidate = Candidate::seeded(attempt, code);
        let total_generation = self.tracker.generation_time();
        self.emit(RefineEvent::Generated {
            candidate: &candidate,
            total_generation,
        });
        candidate
    }

    async fn generate(&mut self, prompt: &str, origin: Origin) -> Result<Candidate> {
        self.transition(SessionState::Generating);
        let next = self.tracker.attempts() + 1;
        tracing::debug!(attempt = next, ?origin, prompt_chars = prompt.len(), "asking oracle");

        let generation = self.oracle.generate(prompt).await.map_err(|e| {
            e.with_operation("refiner::generate")
                .with_context("attempt", next.to_string())
        })?;

        let attempt = self.tracker.record_generation(generation.latency);
        let header = self.config.include_header.then(|| Header {
            prompt_source: &self.config.prompt_source,
            model: self.oracle.model(),
        });
        let candidate =
            Candidate::from_generation(attempt, origin, generation, &self.config.language, header);

        let total_generation = self.tracker.generation_time();
        tracing::debug!(
            attempt,
            loc = candidate.loc,
            fenced = candidate.fenced,
            latency_ms = candidate.latency.as_millis() as u64,
            "candidate extracted"
        );
        self.emit(RefineEvent::Generated {
            candidate: &candidate,
            total_generation,
        });
        Ok(candidate)
    }

    async fn compile_check(&mut self, candidate: &Candidate) -> Result<CompileOutcome> {
        self.transition(SessionState::CompileChecking);
        let outcome = self
            .compiler
            .compile(&candidate.code, candidate.attempt)
            .await
            .map_err(|e| e.with_operation("refiner::compile_check"))?;

        if let Some(path) = &outcome.archived {
            self.archived.push(path.clone());
        }
        self.last_diagnostic = if outcome.diagnostic.trim().is_empty() {
            None
        } else {
            Some(outcome.diagnostic.clone())
        };
        self.records.push(AttemptRecord {
            attempt: candidate.attempt,
            origin: candidate.origin,
            latency: candidate.latency,
            total_generation: self.tracker.generation_time(),
            loc: candidate.loc,
            fenced: candidate.fenced,
            compiled: outcome.success,
            archived: outcome.archived.clone(),
            run_passed: None,
        });

        self.emit(RefineEvent::Compiled {
            candidate,
            outcome: &outcome,
        });
        Ok(outcome)
    }

    async fn run_stage(&mut self, candidate: &mut Candidate) -> Result<RunStage> {
        let executable = self.workspace.executable_path();

        loop {
            self.transition(SessionState::RunChecking);
            let outcome = self
                .runner
                .run(&executable)
                .await
                .map_err(|e| e.with_operation("refiner::run_stage"))?;

            if let Some(record) = self.records.last_mut() {
                record.run_passed = Some(outcome.is_success());
            }
            self.emit(RefineEvent::Ran {
                attempt: candidate.attempt,
                outcome: &outcome,
            });

            let error = match outcome {
                RunOutcome::Passed { stdout, .. } => {
                    return Ok(RunStage::Settled(Execution::Passed { stdout }))
                }
                RunOutcome::Missing { path } => {
                    tracing::warn!(
                        attempt = candidate.attempt,
                        path = %path.display(),
                        "compiler reported success but produced no executable"
                    );
                    return Ok(RunStage::Settled(Execution::ExecutableMissing { path }));
                }
                failed => failed.error_text(),
            };

            let budget = &self.config.budget;
            let abandon = if !self.config.runtime_fix {
                Some(AbandonReason::RuntimeFixDisabled)
            } else if !self.tracker.runtime_fixes_left(budget) {
                Some(AbandonReason::RuntimeFixesUsed)
            } else if self.tracker.time_exhausted(budget) {
                Some(AbandonReason::GenerationTimeSpent)
            } else {
                None
            };
            if let Some(reason) = abandon {
                tracing::info!(attempt = candidate.attempt, %reason, "execution abandoned");
                return Ok(RunStage::Settled(Execution::Abandoned { reason, error }));
            }

            self.tracker.record_runtime_fix();
            let prompt = prompt::runtime_fix(
                &candidate.code,
                &error,
                &self.config.run_input,
                &self.config.language,
            );
            *candidate = self.generate(&prompt, Origin::RuntimeFix).await?;

            let compiled = self.compile_check(candidate).await?;
            if !compiled.success {
                return Ok(RunStage::FixBrokeCompile(Exhaustion::RuntimeFixBrokeCompile {
                    attempt: candidate.attempt,
                }));
            }
        }
    }

    fn finish(&mut self, outcome: Outcome, candidate: Candidate) -> SessionReport {
        self.transition(outcome.state());
        match &outcome {
            Outcome::Succeeded { .. } => tracing::info!(
                attempts = self.tracker.attempts(),
                generation_secs = self.tracker.generation_time().as_secs_f64(),
                "session succeeded"
            ),
            Outcome::Exhausted { exhaustion } => tracing::warn!(
                attempts = self.tracker.attempts(),
                %exhaustion,
                "session stopped"
            ),
        }
        self.emit(RefineEvent::Finished { outcome: &outcome });

        SessionReport {
            state: self.state,
            attempts: self.tracker.attempts(),
            runtime_fixes: self.tracker.runtime_fixes(),
            generation_time: self.tracker.generation_time(),
            archived: self.archived.clone(),
            final_candidate: candidate,
            last_diagnostic: self.last_diagnostic.clone(),
            compile_command: self.compiler.command_line(),
            records: self.records.clone(),
            outcome,
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        tracing::info!(%from, %to, attempt = self.tracker.attempts(), "state transition");
        self.state = to;
        self.emit(RefineEvent::Transition { from, to });
    }

    fn emit(&mut self, event: RefineEvent<'_>) {
        if let Some(callback) = self.on_event.as_mut() {
            callback(&event);
        }
    }
}
