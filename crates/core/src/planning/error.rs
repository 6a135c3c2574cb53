use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::schema::ValidationErrors;

/// Reasons a plan is rejected before anything is applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Conflicting changes on '{resource}' ({}): {constraint}", .fields.join(", "))]
    ConflictingChange {
        resource: String,
        fields: Vec<String>,
        constraint: String,
    },

    #[error(
        "Rate limit on '{resource}': {field} last changed at {last_changed}, next change allowed after {retry_after}"
    )]
    RateLimitViolation {
        resource: String,
        field: String,
        last_changed: DateTime<Utc>,
        retry_after: DateTime<Utc>,
    },

    #[error("Cannot replicate '{resource}' to [{}]: {constraint}", .regions.join(", "))]
    ReplicationPrerequisite {
        resource: String,
        regions: Vec<String>,
        constraint: String,
    },
}

/// Result type for planning operations.
pub type Result<T> = std::result::Result<T, PlanError>;
