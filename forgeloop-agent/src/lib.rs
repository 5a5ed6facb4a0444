//! # Forgeloop Agent
//!
//! The refinement loop that turns a natural-language specification into a
//! program that compiles and runs:
//! 1. The oracle writes a candidate from the specification
//! 2. The candidate is written to the fixed source path and compiled
//! 3. On a compile error, the code and diagnostic go back to the oracle
//! 4. Once it compiles, the program is run with a fixed input
//! 5. On a runtime error, the code and error go back to the oracle, and the
//!    fix must compile again before it is re-run
//! 6. Attempt count and cumulative generation time bound the whole session
//!
//! The oracle proposes, the compiler and the process exit status decide.

mod budget;
mod candidate;
mod prompt;
mod refine;

pub use budget::{Budget, BudgetTracker, Exhaustion};
pub use candidate::{Candidate, Header, Origin};
pub use refine::{
    AbandonReason, AttemptRecord, Execution, Outcome, RefineConfig, RefineEvent, Refiner,
    SessionReport, SessionState,
};

pub(crate) fn serialize_secs<S: serde::Serializer>(
    duration: &std::time::Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
