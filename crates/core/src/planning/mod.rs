//! Convergence planning: diff observed against desired state, classify each
//! change, and order the result into execution units.

mod change;
mod classify;
mod diff;
mod error;
mod format;
mod planner;
mod schedule;

pub use change::{Change, ChangeKind, ChangeSet, FieldPath};
pub use classify::{classify, classify_changes, ClassificationContext, ClassifiedChange, Strategy};
pub use diff::{diff, DiffOptions};
pub use error::{PlanError, Result};
pub use format::format_plan;
pub use planner::{Planner, PlannerConfig};
pub use schedule::{
    CooldownLedger, ExecutionUnit, Operation, Plan, Scheduler, UnitKind,
    DEFAULT_BILLING_MODE_COOLDOWN_SECS,
};
