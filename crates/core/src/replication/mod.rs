mod coordinator;

pub use coordinator::{plan_replication, ReplicaOperation};
