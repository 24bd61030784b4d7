//! Execution domain - validation, isolation, authorization and batch execution

mod authorization;
mod batch_validator;
mod problem_isolator;
mod sweep_executor;

pub use authorization::{ensure_authorized, AuthorizationOutcome, Authorizer, NoAuthorization};
pub use batch_validator::BatchValidator;
pub use problem_isolator::{Isolation, ProblemIsolator};
pub use sweep_executor::{ExecutorConfig, SweepExecutor};

use async_trait::async_trait;

use crate::domain::plan::SwapStep;
use crate::shared::errors::SurfaceError;

/// Result of a non-mutating dry run
#[derive(Debug, Clone, PartialEq)]
pub enum DryRun {
    Valid { resource_estimate: u64 },
    Invalid { reason: String },
}

impl DryRun {
    pub fn is_valid(&self) -> bool {
        matches!(self, DryRun::Valid { .. })
    }
}

/// A submitted, not yet confirmed, atomic operation
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: String,
    pub step_count: usize,
}

/// Terminal on-chain evidence for a successful operation
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub id: String,
}

/// The atomic on-chain mechanism that runs a list of swap steps all-or-nothing.
///
/// `validate` must have the same semantics as `submit` + `confirm` for the
/// same recipient, minus the state change. A `submit` refused before the
/// operation reaches the chain reports `SurfaceError::Rejected`; `Reverted`
/// means it landed and failed. Chain-specific encoding of steps lives behind
/// this trait.
#[async_trait]
pub trait ExecutionSurface: Send + Sync {
    fn name(&self) -> &str;

    /// Hard cap on steps per atomic operation.
    fn capacity_limit(&self) -> usize;

    async fn validate(&self, steps: &[SwapStep], recipient: &str) -> Result<DryRun, SurfaceError>;

    async fn submit(
        &self,
        steps: &[SwapStep],
        recipient: &str,
        resource_limit: u64,
    ) -> Result<Submission, SurfaceError>;

    /// Wait for a terminal state. Callers bound this with their own timeout.
    async fn confirm(&self, submission: &Submission) -> Result<Receipt, SurfaceError>;
}
