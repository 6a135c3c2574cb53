use async_trait::async_trait;

use crate::autoscaling::{AutoscalingPolicy, ScalingDimension, ScalingTarget};
use crate::schema::TableSpec;
use crate::seed::Item;
use crate::state::ObservedState;

use super::{Result, TableUpdate};

/// The target system holding the table. Every mutating call is accepted
/// asynchronously: the change is complete only once `describe_table` reports
/// the affected resources as settled.
#[async_trait]
pub trait TableProvider: Send + Sync {
    /// Describes a table, or None if it does not exist.
    async fn describe_table(&self, name: &str) -> Result<Option<ObservedState>>;

    /// Creates a table from a declaration with a concrete name. Replicas
    /// in the declaration are ignored.
    async fn create_table(&self, spec: &TableSpec) -> Result<ObservedState>;

    /// Deletes a table and all of its items.
    async fn delete_table(&self, name: &str) -> Result<()>;

    /// Applies one in-place modification.
    async fn update_table(&self, name: &str, update: &TableUpdate) -> Result<()>;

    /// Creates or replaces a scaling policy.
    async fn put_scaling_policy(&self, name: &str, policy: &AutoscalingPolicy) -> Result<()>;

    /// Removes the scaling policy for one target dimension.
    async fn delete_scaling_policy(
        &self,
        name: &str,
        target: &ScalingTarget,
        dimension: ScalingDimension,
    ) -> Result<()>;

    /// Starts replicating the table to a region.
    async fn create_replica(&self, name: &str, region: &str) -> Result<()>;

    /// Removes the replica in a region.
    async fn delete_replica(&self, name: &str, region: &str) -> Result<()>;

    /// Writes a batch of items.
    async fn put_items(&self, name: &str, items: &[Item]) -> Result<()>;
}
