//! Derives the autoscaling policies a table declaration implies and
//! reconciles them against the live policy set.

use std::collections::{BTreeMap, BTreeSet};

use crate::schema::{ScalingBounds, TableSpec};
use crate::state::ObservedState;

use super::policy::{AutoscalingPolicy, PolicyOperation, ScalingDimension, ScalingTarget};

/// Default utilization a target-tracking policy aims for.
pub const DEFAULT_TARGET_UTILIZATION: u32 = 70;

/// Engine-wide autoscaling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoscalingDefaults {
    pub target_utilization_percent: u32,
}

impl Default for AutoscalingDefaults {
    fn default() -> Self {
        Self {
            target_utilization_percent: DEFAULT_TARGET_UTILIZATION,
        }
    }
}

fn policies_for(
    target: ScalingTarget,
    bounds: &ScalingBounds,
    defaults: &AutoscalingDefaults,
) -> [AutoscalingPolicy; 2] {
    let utilization = bounds
        .target_utilization_percent
        .unwrap_or(defaults.target_utilization_percent);
    [
        AutoscalingPolicy {
            target: target.clone(),
            dimension: ScalingDimension::Read,
            min_capacity: bounds.read.min,
            max_capacity: bounds.read.max,
            target_utilization_percent: utilization,
        },
        AutoscalingPolicy {
            target,
            dimension: ScalingDimension::Write,
            min_capacity: bounds.write.min,
            max_capacity: bounds.write.max,
            target_utilization_percent: utilization,
        },
    ]
}

/// Every policy the declaration requires: one READ and one WRITE policy per
/// PROVISIONED target that declares scaling bounds. ON_DEMAND tables have none.
pub fn desired_policies(spec: &TableSpec, defaults: &AutoscalingDefaults) -> Vec<AutoscalingPolicy> {
    if !spec.is_provisioned() {
        return Vec::new();
    }

    let mut policies = Vec::new();
    if let Some(bounds) = &spec.autoscaling {
        policies.extend(policies_for(ScalingTarget::Table, bounds, defaults));
    }
    for index in &spec.global_indexes {
        if let Some(bounds) = &index.autoscaling {
            policies.extend(policies_for(
                ScalingTarget::index(&index.name),
                bounds,
                defaults,
            ));
        }
    }
    policies
}

/// Computes the policy operations that take the live policy set to the
/// declared one.
///
/// Deletes come first, then puts, each in target order. Removing a global
/// index shows up here as deletes of its policies; the scheduler places those
/// before the index deletion.
pub fn reconcile_policies(
    desired: &TableSpec,
    observed: Option<&ObservedState>,
    defaults: &AutoscalingDefaults,
) -> Vec<PolicyOperation> {
    let wanted: BTreeMap<_, _> = desired_policies(desired, defaults)
        .into_iter()
        .map(|policy| (policy.key(), policy))
        .collect();
    let live: BTreeMap<_, _> = observed
        .map(|state| state.policies.as_slice())
        .unwrap_or_default()
        .iter()
        .map(|policy| (policy.key(), policy))
        .collect();

    let deletes = live
        .iter()
        .filter(|(key, _)| !wanted.contains_key(*key))
        .map(|(_, policy)| PolicyOperation::Delete((*policy).clone()));
    let puts = wanted
        .iter()
        .filter(|(key, policy)| live.get(*key) != Some(policy))
        .map(|(_, policy)| PolicyOperation::Put(policy.clone()));

    deletes.chain(puts).collect()
}

/// Targets whose live capacity is controlled by autoscaling and therefore
/// must not be reported as drift: targets the declaration autoscales plus
/// targets with a live policy.
pub fn drift_ignored_targets(
    desired: &TableSpec,
    observed: Option<&ObservedState>,
) -> BTreeSet<ScalingTarget> {
    let mut targets = BTreeSet::new();
    if desired.is_provisioned() {
        if desired.autoscaling.is_some() {
            targets.insert(ScalingTarget::Table);
        }
        for index in desired.global_indexes.iter().filter(|i| i.autoscaling.is_some()) {
            targets.insert(ScalingTarget::index(&index.name));
        }
    }
    if let Some(state) = observed {
        targets.extend(state.policies.iter().map(|p| p.target.clone()));
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CapacityRange, GlobalIndex};

    fn bounds(min: u64, max: u64) -> ScalingBounds {
        ScalingBounds {
            read: CapacityRange { min, max },
            write: CapacityRange { min, max },
            target_utilization_percent: None,
        }
    }

    fn autoscaled_table() -> TableSpec {
        TableSpec::new("events", "userId")
            .provisioned(5, 2)
            .with_autoscaling(bounds(5, 50))
    }

    #[test]
    fn test_one_read_and_one_write_policy_per_target() {
        let spec = autoscaled_table().with_global_index(
            GlobalIndex::new("by_user", "userId")
                .with_capacity(1, 1)
                .with_autoscaling(bounds(1, 10)),
        );

        let policies = desired_policies(&spec, &AutoscalingDefaults::default());

        assert_eq!(policies.len(), 4);
        let keys: Vec<_> = policies.iter().map(|p| p.key()).collect();
        assert_eq!(
            keys,
            vec![
                (ScalingTarget::Table, ScalingDimension::Read),
                (ScalingTarget::Table, ScalingDimension::Write),
                (ScalingTarget::index("by_user"), ScalingDimension::Read),
                (ScalingTarget::index("by_user"), ScalingDimension::Write),
            ]
        );
        assert!(policies
            .iter()
            .all(|p| p.target_utilization_percent == DEFAULT_TARGET_UTILIZATION));
    }

    #[test]
    fn test_target_utilization_is_configurable() {
        let mut spec = autoscaled_table();
        let defaults = AutoscalingDefaults {
            target_utilization_percent: 50,
        };
        assert!(desired_policies(&spec, &defaults)
            .iter()
            .all(|p| p.target_utilization_percent == 50));

        spec.autoscaling.as_mut().unwrap().target_utilization_percent = Some(80);
        assert!(desired_policies(&spec, &defaults)
            .iter()
            .all(|p| p.target_utilization_percent == 80));
    }

    #[test]
    fn test_on_demand_tables_have_no_policies() {
        let mut spec = autoscaled_table();
        spec.billing_mode = crate::schema::BillingMode::OnDemand;
        assert!(desired_policies(&spec, &AutoscalingDefaults::default()).is_empty());
    }

    #[test]
    fn test_reconcile_creates_missing_policies() {
        let ops = reconcile_policies(&autoscaled_table(), None, &AutoscalingDefaults::default());
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| matches!(op, PolicyOperation::Put(_))));
    }

    #[test]
    fn test_reconcile_is_empty_when_policies_match() {
        let spec = autoscaled_table();
        let mut observed = ObservedState::active("arn:events", spec.clone());
        observed.policies = desired_policies(&spec, &AutoscalingDefaults::default());

        let ops = reconcile_policies(&spec, Some(&observed), &AutoscalingDefaults::default());

        assert!(ops.is_empty());
    }

    #[test]
    fn test_reconcile_deletes_policies_of_removed_index_first() {
        let with_index = autoscaled_table().with_global_index(
            GlobalIndex::new("by_user", "userId")
                .with_capacity(1, 1)
                .with_autoscaling(bounds(1, 10)),
        );
        let mut observed = ObservedState::active("arn:events", with_index.clone());
        observed.policies = desired_policies(&with_index, &AutoscalingDefaults::default());

        let mut desired = autoscaled_table();
        desired.autoscaling = Some(bounds(5, 100));

        let ops = reconcile_policies(&desired, Some(&observed), &AutoscalingDefaults::default());

        assert_eq!(ops.len(), 4);
        assert!(ops[0].is_delete() && ops[1].is_delete());
        assert_eq!(ops[0].target(), &ScalingTarget::index("by_user"));
        assert!(matches!(&ops[2], PolicyOperation::Put(p) if p.max_capacity == 100));
    }

    #[test]
    fn test_drift_ignored_targets_include_declared_and_live_policies() {
        let spec = autoscaled_table().with_global_index(
            GlobalIndex::new("by_user", "userId").with_capacity(1, 1),
        );
        let mut observed = ObservedState::active("arn:events", spec.clone());
        observed.policies.push(AutoscalingPolicy {
            target: ScalingTarget::index("by_user"),
            dimension: ScalingDimension::Read,
            min_capacity: 1,
            max_capacity: 5,
            target_utilization_percent: 70,
        });

        let targets = drift_ignored_targets(&spec, Some(&observed));

        assert_eq!(
            targets,
            BTreeSet::from([ScalingTarget::Table, ScalingTarget::index("by_user")])
        );
    }
}
