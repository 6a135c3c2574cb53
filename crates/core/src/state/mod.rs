mod types;

pub use types::{IndexStatus, ObservedState, ReplicaPhase, ReplicaStatus, TableStatus};
