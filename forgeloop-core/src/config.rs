//! Configuration file loading
//!
//! The configuration file is YAML, one `key: value` entry per line:
//!
//! ```text
//! model: llama-3.3-70b-versatile
//! max_attempts: 5
//! max_time: 10
//! prompt_file: prompt.txt
//! source_file: foo.f90
//! run_executable: yes
//! print_code: yes
//! print_compiler_error_messages: yes
//! compiler: gfortran
//! compiler_options: -O2 -Wall
//! ```
//!
//! Flags take `yes`/`no` as well as YAML booleans. Values starting with a
//! YAML indicator (`!`, `#`, `&`, `*`) must be quoted. Unknown keys are
//! rejected so a typo does not silently fall back to a default.

use crate::error::{self, Error, ErrorKind, Result};
use crate::language::TargetLanguage;
use crate::provider::{ProviderConfig, ProviderType};
use crate::validate::{CompilerSettings, RunSettings};
use crate::workspace::Workspace;
use serde::de::{self, Deserializer, Unexpected};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What to do with a non-empty source file found at session start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingSource {
    /// Append it to the initial prompt as a starting point
    Context,
    /// Use it as the first candidate without calling the oracle
    Seed,
    /// Disregard it
    Ignore,
}

/// Everything a session can be configured with
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub model: String,
    pub max_attempts: usize,
    pub max_runtime_fix_attempts: usize,
    /// Ceiling on cumulative generation time, in seconds
    pub max_time: f64,
    pub prompt_file: PathBuf,
    pub source_file: PathBuf,
    #[serde(deserialize_with = "flag")]
    pub run_executable: bool,
    #[serde(deserialize_with = "flag")]
    pub print_code: bool,
    #[serde(rename = "print_compiler_error_messages", deserialize_with = "flag")]
    pub print_compiler_errors: bool,
    pub compiler: String,
    #[serde(deserialize_with = "words")]
    pub compiler_options: Vec<String>,
    #[serde(deserialize_with = "flag")]
    pub merge_compiler_output: bool,
    /// Standard input for the candidate, always newline-terminated
    #[serde(deserialize_with = "input_line")]
    pub run_input: String,
    #[serde(deserialize_with = "flag")]
    pub include_header: bool,
    pub existing_source: ExistingSource,
    pub provider: ProviderType,
    pub base_url: Option<String>,
    pub api_key_file: PathBuf,
    pub max_tokens: usize,
    pub temperature: Option<f32>,
    pub language: String,
    pub code_fence: Option<String>,
    pub comment_token: Option<String>,
    pub compile_timeout: u64,
    pub run_timeout: u64,
    pub request_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_attempts: 5,
            max_runtime_fix_attempts: 2,
            max_time: 60.0,
            prompt_file: PathBuf::from("prompt.txt"),
            source_file: PathBuf::from("main.f90"),
            run_executable: true,
            print_code: true,
            print_compiler_errors: true,
            compiler: "gfortran".to_string(),
            compiler_options: Vec::new(),
            merge_compiler_output: false,
            run_input: "5\n".to_string(),
            include_header: true,
            existing_source: ExistingSource::Context,
            provider: ProviderType::Groq,
            base_url: None,
            api_key_file: PathBuf::from("groq_key.txt"),
            max_tokens: 1000,
            temperature: None,
            language: "fortran".to_string(),
            code_fence: None,
            comment_token: None,
            compile_timeout: 120,
            run_timeout: 30,
            request_timeout: 120,
        }
    }
}

impl Settings {
    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| error::io_at(e, "config::from_file", path))?;
        Self::parse(&text).map_err(|e| e.with_context("file", path.display().to_string()))
    }

    /// Parse configuration text on top of the defaults.
    ///
    /// Required keys are not checked here so that command-line overrides can
    /// still fill them in; call [`Settings::validate`] afterwards.
    pub fn parse(text: &str) -> Result<Self> {
        let blank = text.lines().map(str::trim).all(|l| l.is_empty() || l.starts_with('#'));
        if blank {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| yaml_error(e).with_operation("config::parse"))
    }

    /// Check required keys and value ranges
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::config_missing("model").with_operation("config::validate"));
        }
        if self.compiler.trim().is_empty() {
            return Err(Error::config_missing("compiler").with_operation("config::validate"));
        }
        if self.max_attempts == 0 {
            return Err(Error::config_invalid("max_attempts", "must be at least 1")
                .with_operation("config::validate"));
        }
        if Duration::try_from_secs_f64(self.max_time).is_err() {
            return Err(Error::config_invalid("max_time", "must be a non-negative number of seconds")
                .with_operation("config::validate")
                .with_context("value", self.max_time.to_string()));
        }
        if TargetLanguage::preset(&self.language).is_none() {
            return Err(Error::config_invalid("language", "expected fortran or c")
                .with_operation("config::validate")
                .with_context("value", self.language.clone()));
        }
        Ok(())
    }

    pub fn target_language(&self) -> TargetLanguage {
        let mut language = TargetLanguage::preset(&self.language).unwrap_or_default();
        if let Some(fence) = &self.code_fence {
            language = language.with_fence_tag(fence.clone());
        }
        if let Some(token) = &self.comment_token {
            language = language.with_comment_token(token.clone());
        }
        language
    }

    pub fn workspace(&self) -> Result<Workspace> {
        Workspace::new(self.source_file.clone())
    }

    pub fn compiler_settings(&self) -> CompilerSettings {
        CompilerSettings::new(self.compiler.clone())
            .with_options(self.compiler_options.iter().cloned())
            .with_merged_output(self.merge_compiler_output)
            .with_timeout(Duration::from_secs(self.compile_timeout))
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings::new(self.run_input.clone()).with_timeout(Duration::from_secs(self.run_timeout))
    }

    /// The generation-time ceiling; out-of-range values saturate instead of
    /// panicking, `validate` is what rejects them.
    pub fn max_generation_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_time).unwrap_or(if self.max_time > 0.0 {
            Duration::MAX
        } else {
            Duration::ZERO
        })
    }

    /// Find the API key: key file, then `FORGELOOP_API_KEY`, then the
    /// provider's conventional variable.
    pub fn resolve_api_key(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.api_key_file) {
            Ok(key) if !key.trim().is_empty() => return Ok(Some(key.trim().to_string())),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(error::io_at(e, "config::resolve_api_key", &self.api_key_file)),
        }

        let from_env = std::iter::once("FORGELOOP_API_KEY")
            .chain(self.provider.key_env_var())
            .filter_map(|var| std::env::var(var).ok())
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty());
        Ok(from_env)
    }

    /// Provider configuration for the configured backend
    pub fn provider_config(&self, api_key: Option<String>) -> Result<ProviderConfig> {
        let require_key = |key: Option<String>| {
            key.ok_or_else(|| {
                Error::config_missing("api_key")
                    .with_operation("config::provider_config")
                    .with_context("api_key_file", self.api_key_file.display().to_string())
                    .with_context("provider", self.provider.as_str())
            })
        };

        let mut config = match self.provider {
            ProviderType::Groq => ProviderConfig::groq(require_key(api_key)?),
            ProviderType::OpenAI => ProviderConfig::openai(require_key(api_key)?),
            ProviderType::Local => {
                let mut config = ProviderConfig::local("http://localhost:11434/v1", self.model.clone());
                config.api_key = api_key;
                config
            }
        };

        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.clone());
        }
        Ok(config
            .with_model(self.model.clone())
            .with_timeout(self.request_timeout))
    }
}

/// Sort a serde_yaml failure into a syntax problem or a bad value, keeping
/// the line it points at.
fn yaml_error(err: serde_yaml::Error) -> Error {
    let message = err.to_string();
    let bad_value = !message.contains("expected struct Settings")
        && ["unknown field", "unknown variant", "invalid type", "invalid value", "duplicate field"]
            .iter()
            .any(|marker| message.contains(marker));

    let mut out = if bad_value {
        Error::new(ErrorKind::ConfigInvalid, message.clone())
    } else {
        Error::parse_failed(message.clone())
    };
    if let Some(key) = message
        .split_once("unknown field `")
        .and_then(|(_, rest)| rest.split('`').next())
    {
        out = out.with_context("key", key);
    }
    if let Some(location) = err.location() {
        out = out.with_context("line", location.line().to_string());
    }
    out.set_source(err)
}

/// Scalars as they were written; YAML would otherwise turn `5` into a number
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if let Value::Bool(b) = value {
        return Ok(b);
    }
    let text = scalar_text(&value).unwrap_or_default();
    match text.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Ok(true),
        "no" | "false" | "off" | "0" => Ok(false),
        _ => Err(de::Error::invalid_value(Unexpected::Str(&text), &"yes or no")),
    }
}

/// A whitespace-separated string or a YAML sequence
fn words<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_text(item)
                    .ok_or_else(|| de::Error::custom("invalid value: compiler option must be a scalar"))
            })
            .collect(),
        other => scalar_text(&other)
            .map(|text| text.split_whitespace().map(str::to_string).collect())
            .ok_or_else(|| de::Error::custom("invalid value: expected compiler options")),
    }
}

fn input_line<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let mut input = match value {
        Value::Null => String::new(),
        other => scalar_text(&other)
            .ok_or_else(|| de::Error::custom("invalid value: run_input must be a scalar"))?,
    };
    if !input.ends_with('\n') {
        input.push('\n');
    }
    Ok(input)
}
