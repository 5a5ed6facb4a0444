//! # forgeloop-error
//!
//! Unified error handling for forgeloop.
//!
//! An error carries its [`ErrorKind`], an [`ErrorStatus`] saying whether
//! running again could help, the operation that failed, key/value context,
//! and the wrapped source error.
//!
//! ## Usage
//!
//! ```rust
//! use forgeloop_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::SpawnFailed, "gfortran: command not found")
//!         .with_operation("compile::run")
//!         .with_context("compiler", "gfortran")
//!         .with_context("source", "main.f90"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All fallible functions return `Result<T, forgeloop_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Recoverable loop conditions (compile or runtime failures) are values, not errors

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using forgeloop Error
pub type Result<T> = std::result::Result<T, Error>;
