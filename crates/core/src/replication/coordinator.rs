//! Plans the replica operations for a table.
//!
//! Replicas propagate through the table's change stream and require capacity
//! management to be active before they are added. The coordinator only emits
//! the operations; the scheduler places additions after the base table and
//! its policies have converged, one region per unit.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::autoscaling::{PolicyOperation, ScalingTarget};
use crate::planning::{PlanError, Result};
use crate::schema::TableSpec;
use crate::state::ObservedState;

/// A change to the replica set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicaOperation {
    Add { region: String },
    Remove { region: String },
}

impl ReplicaOperation {
    pub fn region(&self) -> &str {
        match self {
            ReplicaOperation::Add { region } | ReplicaOperation::Remove { region } => region,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self, ReplicaOperation::Add { .. })
    }
}

/// Returns true if table-level capacity management will be in place once
/// `policy_ops` are applied.
fn table_capacity_managed(
    observed: Option<&ObservedState>,
    desired: &TableSpec,
    policy_ops: &[PolicyOperation],
) -> bool {
    if !desired.is_provisioned() || desired.autoscaling.is_some() {
        return true;
    }
    let live = observed.is_some_and(|state| state.has_table_policy());
    let removed = policy_ops
        .iter()
        .any(|op| op.is_delete() && op.target() == &ScalingTarget::Table);
    live && !removed
}

/// Plans replica removals (unstaged) followed by additions.
///
/// Fails closed with `ReplicationPrerequisite` when replicas are declared on
/// a PROVISIONED table that has no table-level autoscaling policy, declared
/// or live.
pub fn plan_replication(
    observed: Option<&ObservedState>,
    desired: &TableSpec,
    policy_ops: &[PolicyOperation],
) -> Result<Vec<ReplicaOperation>> {
    let resource = observed
        .map(ObservedState::name)
        .unwrap_or_else(|| desired.display_name());

    if !desired.replica_regions.is_empty() && !table_capacity_managed(observed, desired, policy_ops)
    {
        return Err(PlanError::ReplicationPrerequisite {
            resource: resource.to_string(),
            regions: desired.replica_regions.iter().cloned().collect(),
            constraint: "a PROVISIONED table needs a table-level autoscaling policy before replicas can be added"
                .to_string(),
        });
    }

    let live: BTreeSet<&str> = observed
        .map(|state| state.replicas.iter().map(|r| r.region.as_str()).collect())
        .unwrap_or_default();

    let removals = live
        .iter()
        .filter(|region| !desired.replica_regions.contains(**region))
        .map(|region| ReplicaOperation::Remove {
            region: region.to_string(),
        });
    let additions = desired
        .replica_regions
        .iter()
        .filter(|region| !live.contains(region.as_str()))
        .map(|region| ReplicaOperation::Add {
            region: region.clone(),
        });

    Ok(removals.chain(additions).collect())
}
