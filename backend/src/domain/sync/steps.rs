//! Ordered sync steps and the runner that executes them.
//!
//! A mandatory step aborts the run on failure. An optional step's failure is
//! recorded and the run moves on.

use futures_util::future::BoxFuture;
use tracing::{debug, warn};

use crate::domain::SyncError;

/// Whether a failing step ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRequirement {
    Mandatory,
    Optional,
}

/// What a step did when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Vendor calls that returned a usable response.
    Completed { calls: u32 },
    /// The vendor reported the category as absent for this system.
    Unavailable,
}

impl StepOutcome {
    /// A step that made one successful call.
    pub const ONE_CALL: Self = Self::Completed { calls: 1 };

    fn calls(self) -> u32 {
        match self {
            Self::Completed { calls } => calls,
            Self::Unavailable => 0,
        }
    }
}

/// A named unit of sync work.
pub struct SyncStep<'a> {
    pub name: &'static str,
    pub requirement: StepRequirement,
    pub operation: BoxFuture<'a, Result<StepOutcome, SyncError>>,
}

impl<'a> SyncStep<'a> {
    pub fn mandatory(
        name: &'static str,
        operation: impl Future<Output = Result<StepOutcome, SyncError>> + Send + 'a,
    ) -> Self {
        Self {
            name,
            requirement: StepRequirement::Mandatory,
            operation: Box::pin(operation),
        }
    }

    pub fn optional(
        name: &'static str,
        operation: impl Future<Output = Result<StepOutcome, SyncError>> + Send + 'a,
    ) -> Self {
        Self {
            name,
            requirement: StepRequirement::Optional,
            operation: Box::pin(operation),
        }
    }
}

/// An optional step that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: &'static str,
    pub error: SyncError,
}

/// Totals of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepRun {
    pub api_calls: u32,
    pub failures: Vec<StepFailure>,
}

/// Run `steps` in order, one at a time.
///
/// Returns the first mandatory failure as the error. Nothing after it runs.
pub async fn run_steps(steps: Vec<SyncStep<'_>>) -> Result<StepRun, SyncError> {
    let mut run = StepRun::default();
    for step in steps {
        match step.operation.await {
            Ok(outcome) => {
                debug!(step = step.name, ?outcome, "sync step finished");
                run.api_calls += outcome.calls();
            }
            Err(error) if step.requirement == StepRequirement::Optional => {
                warn!(step = step.name, %error, "optional sync step failed");
                run.failures.push(StepFailure {
                    step: step.name,
                    error,
                });
            }
            Err(error) => {
                warn!(step = step.name, %error, "mandatory sync step failed; aborting");
                return Err(error);
            }
        }
    }
    Ok(run)
}
