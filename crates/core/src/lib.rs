//! Functional core of tablesync: table declarations, observed state, and the
//! pure planning pipeline that turns the difference between them into
//! ordered execution units.

pub mod autoscaling;
pub mod planning;
pub mod provider;
pub mod replication;
pub mod schema;
pub mod seed;
pub mod state;
