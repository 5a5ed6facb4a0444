//! Session budgets
//!
//! Three ceilings bound a session: the number of generation attempts, the
//! number of runtime-fix rounds, and the cumulative wall-clock time spent
//! waiting on the oracle. Only oracle latency counts toward the time
//! ceiling; compilation and execution are free.

use forgeloop_core::Settings;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub max_attempts: usize,
    pub max_runtime_fixes: usize,
    pub max_generation_time: Duration,
}

impl Budget {
    pub fn new(max_attempts: usize, max_runtime_fixes: usize, max_generation_time: Duration) -> Self {
        Self {
            max_attempts,
            max_runtime_fixes,
            max_generation_time,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.max_attempts,
            settings.max_runtime_fix_attempts,
            settings.max_generation_time(),
        )
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::new(5, 2, Duration::from_secs(60))
    }
}

/// Why a session stopped without a compiling candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Exhaustion {
    /// Cumulative oracle latency reached the ceiling
    GenerationTime { spent_secs: f64, limit_secs: f64 },
    /// The attempt ceiling was reached
    Attempts { limit: usize },
    /// A runtime fix came back and no longer compiled
    RuntimeFixBrokeCompile { attempt: usize },
}

impl std::fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exhaustion::GenerationTime { spent_secs, limit_secs } => write!(
                f,
                "generation time {:.3}s reached the {:.3}s limit",
                spent_secs, limit_secs
            ),
            Exhaustion::Attempts { limit } => write!(f, "all {} attempts used", limit),
            Exhaustion::RuntimeFixBrokeCompile { attempt } => {
                write!(f, "runtime fix at attempt {} failed to compile", attempt)
            }
        }
    }
}

/// Running totals for one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetTracker {
    attempts: usize,
    runtime_fixes: usize,
    generation_time: Duration,
}

impl BudgetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one candidate and its oracle latency; returns the new attempt index.
    pub fn record_generation(&mut self, latency: Duration) -> usize {
        self.attempts += 1;
        self.generation_time += latency;
        self.attempts
    }

    pub fn record_runtime_fix(&mut self) {
        self.runtime_fixes += 1;
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn runtime_fixes(&self) -> usize {
        self.runtime_fixes
    }

    pub fn generation_time(&self) -> Duration {
        self.generation_time
    }

    fn time_spent(&self, budget: &Budget) -> Option<Exhaustion> {
        (self.generation_time >= budget.max_generation_time).then(|| Exhaustion::GenerationTime {
            spent_secs: self.generation_time.as_secs_f64(),
            limit_secs: budget.max_generation_time.as_secs_f64(),
        })
    }

    /// Checked after a failed compile, before asking for a fix.
    ///
    /// The time ceiling is reported first when both are reached.
    pub fn compile_exhaustion(&self, budget: &Budget) -> Option<Exhaustion> {
        self.time_spent(budget).or_else(|| {
            (self.attempts >= budget.max_attempts).then_some(Exhaustion::Attempts {
                limit: budget.max_attempts,
            })
        })
    }

    pub fn time_exhausted(&self, budget: &Budget) -> bool {
        self.time_spent(budget).is_some()
    }

    pub fn runtime_fixes_left(&self, budget: &Budget) -> bool {
        self.runtime_fixes < budget.max_runtime_fixes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_ceiling() {
        let budget = Budget::new(2, 0, Duration::from_secs(60));
        let mut tracker = BudgetTracker::new();

        assert_eq!(tracker.record_generation(Duration::from_millis(10)), 1);
        assert_eq!(tracker.compile_exhaustion(&budget), None);
        assert_eq!(tracker.record_generation(Duration::from_millis(10)), 2);
        assert_eq!(tracker.compile_exhaustion(&budget), Some(Exhaustion::Attempts { limit: 2 }));
    }

    #[test]
    fn test_time_ceiling_wins() {
        let budget = Budget::new(2, 0, Duration::from_secs(10));
        let mut tracker = BudgetTracker::new();
        tracker.record_generation(Duration::from_secs(6));
        tracker.record_generation(Duration::from_secs(6));

        assert_eq!(
            tracker.compile_exhaustion(&budget),
            Some(Exhaustion::GenerationTime {
                spent_secs: 12.0,
                limit_secs: 10.0
            })
        );
        assert!(tracker.time_exhausted(&budget));
    }

    #[test]
    fn test_time_ceiling_is_inclusive() {
        let budget = Budget::new(10, 0, Duration::from_secs(4));
        let mut tracker = BudgetTracker::new();
        tracker.record_generation(Duration::from_secs(4));
        assert!(tracker.time_exhausted(&budget));
    }

    #[test]
    fn test_runtime_fixes() {
        let budget = Budget::new(5, 1, Duration::from_secs(60));
        let mut tracker = BudgetTracker::new();
        assert!(tracker.runtime_fixes_left(&budget));
        tracker.record_runtime_fix();
        assert!(!tracker.runtime_fixes_left(&budget));
        assert_eq!(tracker.runtime_fixes(), 1);
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings::parse("model: m\nmax_attempts: 3\nmax_time: 1.5").unwrap();
        let budget = Budget::from_settings(&settings);
        assert_eq!(budget.max_attempts, 3);
        assert_eq!(budget.max_runtime_fixes, 2);
        assert_eq!(budget.max_generation_time, Duration::from_millis(1500));
    }
}
