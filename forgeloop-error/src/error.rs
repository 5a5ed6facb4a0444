//! The main Error type for forgeloop

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The error every fallible forgeloop operation returns.
///
/// The status is derived from the kind when the error is built. Context
/// entries accumulate as the error travels up through the session, and a
/// replaced operation is kept in context under `"called"`.
///
/// # Example
///
/// ```rust
/// use forgeloop_error::{Error, ErrorKind, ErrorStatus};
///
/// let err = Error::new(ErrorKind::InferenceFailed, "model returned 503")
///     .with_operation("oracle::generate")
///     .with_context("model", "llama-3.3-70b-versatile")
///     .with_context("attempt", "3");
///
/// assert_eq!(err.kind(), ErrorKind::InferenceFailed);
/// assert_eq!(err.status(), ErrorStatus::Temporary);
/// assert_eq!(
///     err.to_string(),
///     "oracle::generate: model returned 503 [model=llama-3.3-70b-versatile, attempt=3] (InferenceFailed, temporary)"
/// );
/// ```
pub struct Error {
    kind: ErrorKind,
    status: ErrorStatus,
    message: String,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = match kind.is_retryable() {
            true => ErrorStatus::Temporary,
            false => ErrorStatus::Permanent,
        };
        Self {
            kind,
            status,
            message: message.into(),
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Innermost-last name of the operation that failed, empty if unset
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find_map(|(k, v)| (*k == key).then_some(v.as_str()))
    }

    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    /// Name the failing operation. A previously named one is pushed into
    /// context as `"called"`.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        let previous = std::mem::replace(&mut self.operation, operation);
        if !previous.is_empty() {
            self.context.push(("called", previous.to_string()));
        }
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Attach the underlying error. Only one source is kept; setting a
    /// second one trips a debug assertion.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }

    /// A configuration key holds a value that cannot be used
    pub fn config_invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, reason).with_context("key", key)
    }

    pub fn config_missing(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(ErrorKind::ConfigMissing, format!("missing required key '{}'", key))
            .with_context("key", key)
    }

    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InferenceFailed, message)
    }

    pub fn empty_response(model: impl Into<String>) -> Self {
        Self::new(ErrorKind::EmptyResponse, "oracle returned no content").with_context("model", model)
    }

    /// A subprocess could not be launched at all
    pub fn spawn_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::SpawnFailed, reason).with_context("program", program)
    }

    /// Copying a superseded candidate into the archive failed
    pub fn archive_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArchiveFailed, reason).with_context("archive", path)
    }
}

/// `op: message [k=v, ...] (Kind, status)` on one line
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.operation.is_empty() {
            write!(f, "{}: ", self.operation)?;
        }
        f.write_str(if self.message.is_empty() { "failed" } else { &self.message })?;

        if !self.context.is_empty() {
            let pairs: Vec<String> = self.context.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            write!(f, " [{}]", pairs.join(", "))?;
        }
        write!(f, " ({}, {})", self.kind, self.status)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.kind, self.status)?;
        if !self.operation.is_empty() {
            writeln!(f, "  operation: {}", self.operation)?;
        }
        if !self.message.is_empty() {
            writeln!(f, "  message:   {}", self.message)?;
        }
        for (key, value) in &self.context {
            writeln!(f, "  {:<10} {}", format!("{}:", key), value)?;
        }
        if let Some(source) = &self.source {
            writeln!(f, "  source:    {:#}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_kind() {
        let err = Error::new(ErrorKind::FileNotFound, "prompt.txt not found");
        assert_eq!(err.message(), "prompt.txt not found");
        assert_eq!(err.status(), ErrorStatus::Permanent);

        assert!(Error::new(ErrorKind::RateLimited, "slow down").is_retryable());
        assert!(!Error::archive_failed("foo1.f90", "disk full").is_retryable());
    }

    #[test]
    fn test_context_lookup() {
        let err = Error::inference_failed("timeout")
            .with_operation("oracle::generate")
            .with_context("model", "llama-3.3-70b-versatile")
            .with_context("max_tokens", "1000");

        assert_eq!(err.operation(), "oracle::generate");
        assert_eq!(err.context().len(), 2);
        assert_eq!(err.context_value("max_tokens"), Some("1000"));
        assert_eq!(err.context_value("missing"), None);
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::new(ErrorKind::IoFailed, "write failed")
            .with_operation("compile::write_source")
            .with_operation("refiner::compile_check");

        assert_eq!(err.operation(), "refiner::compile_check");
        assert_eq!(err.context_value("called"), Some("compile::write_source"));
    }

    #[test]
    fn test_display() {
        let err = Error::spawn_failed("gfortran", "No such file or directory").with_operation("compile::run");
        assert_eq!(
            err.to_string(),
            "compile::run: No such file or directory [program=gfortran] (SpawnFailed, permanent)"
        );

        let err = Error::new(ErrorKind::Unexpected, "");
        assert_eq!(err.to_string(), "failed (Unexpected, permanent)");
    }

    #[test]
    fn test_domain_constructors() {
        let err = Error::config_missing("model");
        assert_eq!(err.kind(), ErrorKind::ConfigMissing);
        assert_eq!(err.message(), "missing required key 'model'");
        assert_eq!(err.context_value("key"), Some("model"));

        let err = Error::config_invalid("max_attempts", "must be at least 1");
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let err = Error::empty_response("llama");
        assert_eq!(err.context_value("model"), Some("llama"));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: Error = io_err.into();

        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert_eq!(err.operation(), "io");
        assert!(err.source_ref().is_some());
    }
}
