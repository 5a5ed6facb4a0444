//! # Forgeloop CLI
//!
//! Command-line interface for running a refinement session.
//!
//! Usage:
//!   forgeloop [run]
//!   forgeloop --config <file> --model <id> run
//!   forgeloop extract <response.txt>
//!   forgeloop config
//!
//! Examples:
//!   forgeloop
//!   forgeloop --prompt-file square.txt --source-file square.f90 --max-attempts 8
//!   forgeloop --no-run --json
//!   forgeloop extract saved_answer.txt --language c

use clap::{Args, Parser, Subcommand};
use forgeloop_agent::{Execution, Origin, Outcome, RefineConfig, RefineEvent, Refiner, SessionReport};
use forgeloop_core::error;
use forgeloop_core::{
    extract, CompilerValidator, ExecutableRunner, OpenAIProvider, ProviderOracle, Result,
    RunOutcome, Settings, TargetLanguage,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "config.txt";

#[derive(Parser)]
#[command(name = "forgeloop")]
#[command(author, version, about = "Forgeloop - ask a model for a program until it compiles and runs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (default: config.txt when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    /// Print the session report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output (debug logging and token usage)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - no per-attempt progress
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Values that take precedence over the configuration file
#[derive(Args, Default)]
struct Overrides {
    /// Model identifier
    #[arg(long, global = true)]
    model: Option<String>,

    /// Maximum number of generation attempts
    #[arg(long, global = true)]
    max_attempts: Option<usize>,

    /// Maximum cumulative generation time in seconds
    #[arg(long, global = true)]
    max_time: Option<f64>,

    /// File holding the program specification
    #[arg(long, global = true)]
    prompt_file: Option<PathBuf>,

    /// Where candidates are written and compiled
    #[arg(long, global = true)]
    source_file: Option<PathBuf>,

    /// Compile only, do not run the program
    #[arg(long, global = true)]
    no_run: bool,
}

impl Overrides {
    fn apply(&self, settings: &mut Settings) {
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(max_attempts) = self.max_attempts {
            settings.max_attempts = max_attempts;
        }
        if let Some(max_time) = self.max_time {
            settings.max_time = max_time;
        }
        if let Some(prompt_file) = &self.prompt_file {
            settings.prompt_file = prompt_file.clone();
        }
        if let Some(source_file) = &self.source_file {
            settings.source_file = source_file.clone();
        }
        if self.no_run {
            settings.run_executable = false;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a refinement session (default)
    Run,
    /// Extract code from a saved model response
    Extract {
        /// File holding the raw response text
        #[arg(required = true)]
        file: PathBuf,

        /// Target language preset (fortran, c)
        #[arg(short, long, default_value = "fortran")]
        language: String,
    },
    /// Show the resolved configuration
    Config,
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => Settings::from_file(DEFAULT_CONFIG)?,
        None => {
            tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG);
            Settings::default()
        }
    };
    cli.overrides.apply(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn print_event(event: &RefineEvent<'_>, print_errors: bool, fence_tag: &str) {
    match event {
        RefineEvent::Generated {
            candidate,
            total_generation,
        } => {
            println!(
                "Attempt {}: {} lines generated in {:.3}s (total {:.3}s)",
                candidate.attempt,
                candidate.loc,
                candidate.latency.as_secs_f64(),
                total_generation.as_secs_f64()
            );
            if !candidate.fenced && candidate.origin != Origin::Seeded {
                println!("   no ```{} block in the response, kept as comments", fence_tag);
            }
        }
        RefineEvent::Compiled { candidate, outcome } => {
            if let Some(path) = &outcome.archived {
                println!("   previous source archived to {}", path.display());
            }
            if outcome.success {
                println!("Attempt {}: compiled", candidate.attempt);
            } else {
                println!("Attempt {}: compilation failed", candidate.attempt);
                if print_errors && !outcome.diagnostic.trim().is_empty() {
                    println!("{}", outcome.diagnostic.trim_end());
                }
            }
        }
        RefineEvent::Ran { attempt, outcome } => match outcome {
            RunOutcome::Passed { stdout, .. } => {
                println!("Attempt {}: run succeeded", attempt);
                if !stdout.trim().is_empty() {
                    println!("{}", stdout.trim_end());
                }
            }
            RunOutcome::Failed { .. } => {
                println!("Attempt {}: run failed", attempt);
                println!("{}", outcome.error_text().trim_end());
            }
            RunOutcome::Missing { path } => {
                println!("Attempt {}: executable {} not found", attempt, path.display());
            }
        },
        RefineEvent::Transition { .. } | RefineEvent::Finished { .. } => {}
    }
}

fn print_report(report: &SessionReport, settings: &Settings) {
    println!();
    match &report.outcome {
        Outcome::Succeeded { execution } => {
            println!("Compiled after {} attempt(s).", report.attempts);
            match execution {
                Execution::NotRequested => {}
                Execution::Passed { .. } => println!("Program ran successfully."),
                Execution::ExecutableMissing { path } => {
                    println!("Warning: compiler succeeded but {} does not exist.", path.display())
                }
                Execution::Abandoned { reason, .. } => {
                    println!("Program still fails at runtime ({}).", reason)
                }
            }
        }
        Outcome::Exhausted { exhaustion } => {
            println!("Gave up after {} attempt(s): {}.", report.attempts, exhaustion);
            if settings.print_compiler_errors {
                if let Some(diagnostic) = &report.last_diagnostic {
                    println!("Last compiler output:\n{}", diagnostic.trim_end());
                }
            }
        }
    }

    if settings.print_code {
        println!("\nFinal code ({} lines):\n", report.final_candidate.loc);
        println!("{}", report.final_candidate.code);
    }

    println!("\nTotal generation time: {:.3} seconds", report.generation_time.as_secs_f64());
    println!("Compilation command: {}", report.compile_command);
}

async fn run_session(cli: &Cli) -> Result<bool> {
    let settings = load_settings(cli)?;
    let spec = std::fs::read_to_string(&settings.prompt_file)
        .map_err(|e| error::io_at(e, "cli::read_prompt", &settings.prompt_file))?;

    let api_key = settings.resolve_api_key()?;
    let provider = OpenAIProvider::new(settings.provider_config(api_key)?)?;
    let mut oracle = ProviderOracle::new(provider)
        .with_model(settings.model.clone())
        .with_max_tokens(settings.max_tokens);
    if let Some(temperature) = settings.temperature {
        oracle = oracle.with_temperature(temperature);
    }

    let workspace = settings.workspace()?;
    let compiler = CompilerValidator::new(settings.compiler_settings(), workspace.clone());
    let runner = ExecutableRunner::new(settings.run_settings());
    let config = RefineConfig::from_settings(&settings);

    let mut refiner = Refiner::new(oracle, compiler, runner, workspace, config);
    if !cli.quiet && !cli.json {
        let print_errors = settings.print_compiler_errors;
        let fence_tag = settings.target_language().fence_tag;
        refiner = refiner.with_event_callback(move |event| print_event(event, print_errors, &fence_tag));
        println!(
            "Forgeloop - {} with {} (up to {} attempts, {:.1}s of generation)\n",
            settings.prompt_file.display(),
            settings.model,
            settings.max_attempts,
            settings.max_time
        );
    }

    let report = refiner.run(&spec).await?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| error::Error::unexpected("failed to serialize report").set_source(e))?;
        println!("{}", json);
    } else {
        print_report(&report, &settings);
    }
    if cli.verbose {
        println!("Tokens used: {}", refiner.oracle().usage().total_tokens());
    }

    Ok(report.is_success())
}

fn extract_file(file: &Path, language: &str) -> Result<()> {
    let lang = TargetLanguage::preset(language).ok_or_else(|| {
        error::Error::invalid_argument(format!("unknown language '{}'", language))
            .with_operation("cli::extract")
    })?;
    let raw = std::fs::read_to_string(file).map_err(|e| error::io_at(e, "cli::extract", file))?;

    let extraction = extract(&raw, &lang);
    println!("{}", extraction.code);
    eprintln!();
    eprintln!("Lines of code: {}", extraction.loc);
    if !extraction.fenced {
        eprintln!("No ```{} block found; every line was commented out.", lang.fence_tag);
    }
    if extraction.neutralized > 0 {
        eprintln!("Commented out {} line(s) starting with a backtick.", extraction.neutralized);
    }
    Ok(())
}

fn show_config(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let api_key = settings.resolve_api_key()?;

    let mut value = serde_json::to_value(&settings)
        .map_err(|e| error::Error::unexpected("failed to serialize settings").set_source(e))?;
    if let Some(object) = value.as_object_mut() {
        let key = match api_key {
            Some(_) => serde_json::Value::from("<redacted>"),
            None => serde_json::Value::Null,
        };
        object.insert("api_key".to_string(), key);
    }
    println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Some(Commands::Extract { file, language }) => extract_file(file, language).map(|_| true),
        Some(Commands::Config) => show_config(&cli).map(|_| true),
        Some(Commands::Run) | None => run_session(&cli).await,
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(hint) = e.kind().hint() {
                eprintln!("Hint: {}", hint);
            }
            if e.is_retryable() {
                eprintln!("The failure looks temporary; running again may succeed.");
            }
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_take_precedence() {
        let cli = Cli::try_parse_from([
            "forgeloop",
            "--model",
            "llama-3.1-8b-instant",
            "--max-attempts",
            "9",
            "--max-time",
            "12.5",
            "--no-run",
            "run",
        ])
        .unwrap();

        let mut settings = Settings::parse("model: other\nmax_attempts: 2").unwrap();
        cli.overrides.apply(&mut settings);

        assert_eq!(settings.model, "llama-3.1-8b-instant");
        assert_eq!(settings.max_attempts, 9);
        assert_eq!(settings.max_time, 12.5);
        assert!(!settings.run_executable);
        assert!(matches!(cli.command, Some(Commands::Run)));
    }

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::try_parse_from(["forgeloop", "--json"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.json);
    }

    #[test]
    fn test_extract_subcommand() {
        let cli = Cli::try_parse_from(["forgeloop", "extract", "answer.txt", "--language", "c"]).unwrap();
        match cli.command {
            Some(Commands::Extract { file, language }) => {
                assert_eq!(file, PathBuf::from("answer.txt"));
                assert_eq!(language, "c");
            }
            _ => panic!("expected extract"),
        }
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let cli = Cli::try_parse_from(["forgeloop", "--config", "/nonexistent/forgeloop.txt"]).unwrap();
        assert!(load_settings(&cli).is_err());
    }
}
