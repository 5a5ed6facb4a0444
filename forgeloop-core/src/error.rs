//! Forgeloop core error types
//!
//! Re-exports forgeloop-error and provides core-specific conveniences.

pub use forgeloop_error::{Error, ErrorKind, ErrorStatus, Result};

/// Wrap an io error raised while touching `path`
pub fn io_at(err: std::io::Error, operation: &'static str, path: &std::path::Path) -> Error {
    Error::from(err)
        .with_operation(operation)
        .with_context("path", path.display().to_string())
}

