//! Applies convergence plans against a table provider.

mod cancel;
mod locks;
mod report;
mod runner;

pub use cancel::CancelHandle;
pub use locks::ResourceLocks;
pub use report::{RunReport, UnitOutcome};
pub use runner::{ConvergenceEngine, EngineSettings};
