//! Error kinds for forgeloop operations

use std::fmt;

/// What went wrong, coarse enough to match on.
///
/// Only conditions that end a refinement session are errors. A failed
/// compile or a crashing candidate program is reported as a value by the
/// validators and never shows up here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Catch-all for conditions nothing else describes
    Unexpected,
    InvalidArgument,
    ParseFailed,

    /// A configuration key is unknown or its value unusable
    ConfigInvalid,
    ConfigMissing,

    /// The oracle call failed for a reason not listed below
    InferenceFailed,
    /// The oracle answered with no text at all
    EmptyResponse,
    /// The provider answered with a 5xx status
    ProviderUnavailable,
    RateLimited,
    AuthenticationFailed,
    NetworkFailed,
    /// The oracle did not answer within the request timeout
    Timeout,

    FileNotFound,
    PermissionDenied,
    IoFailed,
    /// A superseded candidate could not be copied aside
    ArchiveFailed,

    /// The compiler or the candidate executable could not be launched
    SpawnFailed,
}

impl ErrorKind {
    /// Whether this kind is usually transient
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::Timeout
                | ErrorKind::ProviderUnavailable
        )
    }

    /// What the operator can do about it, when there is something obvious
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ErrorKind::ConfigInvalid | ErrorKind::ConfigMissing => {
                Some("check config.txt or the command-line overrides")
            }
            ErrorKind::AuthenticationFailed => Some("check the API key file or environment variable"),
            ErrorKind::SpawnFailed => Some("check that the compiler is installed and on PATH"),
            ErrorKind::RateLimited => Some("wait a moment before starting another session"),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
