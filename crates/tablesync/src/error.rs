//! Error types for convergence runs.

use std::time::Duration;

use tablesync_core::planning::PlanError;
use tablesync_core::provider::ProviderError;
use tablesync_core::seed::SeedError;
use thiserror::Error;

/// Result type alias for convergence runs.
pub type Result<T> = std::result::Result<T, RunError>;

/// Errors that stop a convergence run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Timed out after {waited:?} waiting for '{resource}' to converge (unit {unit})")]
    ConvergenceTimeout {
        resource: String,
        unit: usize,
        waited: Duration,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Another convergence run is in progress for '{0}'")]
    ResourceBusy(String),

    #[error("Convergence run for '{0}' was cancelled")]
    Cancelled(String),

    #[error(transparent)]
    Seed(#[from] SeedError),
}
