//! # Forgeloop Core
//!
//! The collaborators of a compile-and-fix refinement session.
//!
//! ## Core Concepts
//! - **Oracle**: a text-completion service asked to write a program (`Oracle`, `LlmProvider`)
//! - **Extraction**: turning a free-text answer into a compilable artifact
//! - **Workspace**: the fixed source path, output binary and numbered archive copies
//! - **Validators**: a real compiler and a real execution, each behind a trait
//! - **Settings**: the `key: value` configuration file

pub mod error;
pub mod provider;
pub mod oracle;
pub mod language;
pub mod extract;
pub mod workspace;
pub mod archive;
pub mod validate;
pub mod config;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    LlmProvider, ProviderConfig, ProviderType, ProviderError,
    ChatMessage, Role, CompletionRequest, CompletionResponse,
    FinishReason, Usage, UsageTracker, OpenAIProvider,
};
pub use oracle::{Oracle, Generation, ProviderOracle};
pub use language::TargetLanguage;
pub use extract::{extract, Extraction};
pub use workspace::Workspace;
pub use archive::Archiver;
pub use validate::{
    CompileOutcome, CompileValidator, CompilerSettings, CompilerValidator,
    RunOutcome, RunSettings, RunValidator, ExecutableRunner,
};
pub use config::{ExistingSource, Settings};
