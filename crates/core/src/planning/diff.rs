//! Pure function: compare observed and desired table state.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::autoscaling::{drift_ignored_targets, ScalingTarget};
use crate::schema::{GlobalIndex, LocalIndex, TableSpec, Throughput};
use crate::state::ObservedState;

use super::change::{Change, ChangeKind, ChangeSet, FieldPath};

/// Differ settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffOptions {
    /// Compare autoscaled global index capacity against the last applied
    /// value instead of the live one. Off by default: index-level drift
    /// suppression is not confirmed to be supported by the target system.
    pub suppress_index_capacity_drift: bool,
}

/// Calculates the changes needed to take `observed` to `desired`.
///
/// A missing table yields a single CREATE entry for the whole table (without
/// replicas, which are bootstrapped separately). Otherwise only differing
/// fields are reported, in a fixed order, so diffing the same pair twice
/// yields identical changesets.
pub fn diff(observed: Option<&ObservedState>, desired: &TableSpec, options: &DiffOptions) -> ChangeSet {
    let Some(observed) = observed else {
        return vec![create_table_entry(desired)];
    };

    let current = &observed.table;
    let ignored = drift_ignored_targets(desired, Some(observed));
    let mut changes = ChangeSet::new();

    diff_identity(current, desired, &mut changes);
    let billing_changed = diff_billing(observed, desired, &ignored, &mut changes);
    if let Some(change) = Change::between(
        FieldPath::TableClass,
        Some(json!(current.table_class)),
        Some(json!(desired.table_class)),
    ) {
        changes.push(change);
    }
    diff_local_indexes(current, desired, &mut changes);
    diff_global_indexes(observed, desired, &ignored, billing_changed, options, &mut changes);
    diff_stream(current, desired, &mut changes);
    diff_ttl(current, desired, &mut changes);
    changes.extend(Change::between(
        FieldPath::PointInTimeRecovery,
        Some(json!(current.point_in_time_recovery)),
        Some(json!(desired.point_in_time_recovery)),
    ));
    diff_tags(current, desired, &mut changes);

    changes
}

fn create_table_entry(desired: &TableSpec) -> Change {
    let mut table = desired.clone();
    table.replica_regions.clear();
    Change::new(
        FieldPath::Table,
        ChangeKind::Create,
        None,
        Some(serde_json::to_value(&table).unwrap_or_default()),
    )
}

fn key_value(spec: &TableSpec, attribute: Option<&str>) -> Option<Value> {
    attribute.map(|name| {
        json!({
            "name": name,
            "type": spec.declared_attribute(name).map(|a| a.attribute_type),
        })
    })
}

fn diff_identity(current: &TableSpec, desired: &TableSpec, changes: &mut ChangeSet) {
    if let Some(name) = &desired.name {
        changes.extend(Change::between(
            FieldPath::Name,
            current.name.as_ref().map(|n| json!(n)),
            Some(json!(name)),
        ));
    }
    changes.extend(Change::between(
        FieldPath::HashKey,
        key_value(current, Some(&current.primary_key.hash_attribute)),
        key_value(desired, Some(&desired.primary_key.hash_attribute)),
    ));
    changes.extend(Change::between(
        FieldPath::RangeKey,
        key_value(current, current.primary_key.range_attribute.as_deref()),
        key_value(desired, desired.primary_key.range_attribute.as_deref()),
    ));
}

fn billing_value(spec: &TableSpec) -> Value {
    json!({
        "billingMode": spec.billing_mode,
        "readCapacity": spec.read_capacity,
        "writeCapacity": spec.write_capacity,
    })
}

/// Capacity the desired value is compared against: the last applied desired
/// value for autoscaled targets, the live value otherwise.
fn capacity_baseline(
    observed: &ObservedState,
    target: &ScalingTarget,
    use_last_applied: bool,
) -> Option<Throughput> {
    let live = observed.live_throughput(target);
    if use_last_applied {
        observed
            .last_applied_capacity
            .get(target)
            .copied()
            .or(live)
    } else {
        live
    }
}

/// Returns true if the billing mode changed. Capacity travels with a billing
/// mode change, so no separate capacity entries are emitted in that case.
fn diff_billing(
    observed: &ObservedState,
    desired: &TableSpec,
    ignored: &BTreeSet<ScalingTarget>,
    changes: &mut ChangeSet,
) -> bool {
    let current = &observed.table;
    if current.billing_mode != desired.billing_mode {
        changes.push(Change::new(
            FieldPath::BillingMode,
            ChangeKind::Update,
            Some(billing_value(current)),
            Some(billing_value(desired)),
        ));
        return true;
    }

    if desired.is_provisioned() {
        let baseline = capacity_baseline(
            observed,
            &ScalingTarget::Table,
            ignored.contains(&ScalingTarget::Table),
        );
        changes.extend(Change::between(
            FieldPath::ReadCapacity,
            baseline.map(|t| json!(t.read)),
            desired.read_capacity.map(|v| json!(v)),
        ));
        changes.extend(Change::between(
            FieldPath::WriteCapacity,
            baseline.map(|t| json!(t.write)),
            desired.write_capacity.map(|v| json!(v)),
        ));
    }
    false
}

fn local_shape(spec: &TableSpec, index: &LocalIndex) -> Value {
    json!({
        "name": index.name,
        "rangeAttribute": key_value(spec, Some(&index.range_attribute)),
        "projection": index.projection,
    })
}

fn diff_local_indexes(current: &TableSpec, desired: &TableSpec, changes: &mut ChangeSet) {
    for index in &desired.local_indexes {
        let path = FieldPath::LocalIndex(index.name.clone());
        let new = local_shape(desired, index);
        match current.local_indexes.iter().find(|i| i.name == index.name) {
            None => changes.push(Change::new(path, ChangeKind::Create, None, Some(new))),
            Some(old) => {
                let old = local_shape(current, old);
                if old != new {
                    changes.push(Change::new(path, ChangeKind::Replace, Some(old), Some(new)));
                }
            }
        }
    }
    for index in &current.local_indexes {
        if !desired.local_indexes.iter().any(|i| i.name == index.name) {
            changes.push(Change::new(
                FieldPath::LocalIndex(index.name.clone()),
                ChangeKind::Delete,
                Some(local_shape(current, index)),
                None,
            ));
        }
    }
}

/// Properties of a global index that cannot change once it exists.
fn global_shape(spec: &TableSpec, index: &GlobalIndex) -> Value {
    json!({
        "hashAttribute": key_value(spec, Some(&index.hash_attribute)),
        "rangeAttribute": key_value(spec, index.range_attribute.as_deref()),
        "projection": index.projection,
    })
}

fn diff_global_indexes(
    observed: &ObservedState,
    desired: &TableSpec,
    ignored: &BTreeSet<ScalingTarget>,
    billing_changed: bool,
    options: &DiffOptions,
    changes: &mut ChangeSet,
) {
    let current = &observed.table;
    for index in &desired.global_indexes {
        let Some(old) = current.global_index(&index.name) else {
            changes.push(Change::new(
                FieldPath::GlobalIndex(index.name.clone()),
                ChangeKind::Create,
                None,
                Some(serde_json::to_value(index).unwrap_or_default()),
            ));
            continue;
        };

        if global_shape(current, old) != global_shape(desired, index) {
            changes.push(Change::new(
                FieldPath::GlobalIndex(index.name.clone()),
                ChangeKind::Replace,
                Some(serde_json::to_value(old).unwrap_or_default()),
                Some(serde_json::to_value(index).unwrap_or_default()),
            ));
            continue;
        }

        if billing_changed || !desired.is_provisioned() {
            continue;
        }
        let target = ScalingTarget::index(&index.name);
        // TODO: confirm the target system honours index-level drift suppression,
        // then enable it by default.
        let suppress = options.suppress_index_capacity_drift && ignored.contains(&target);
        changes.extend(Change::between(
            FieldPath::GlobalIndexCapacity(index.name.clone()),
            capacity_baseline(observed, &target, suppress).map(|t| json!(t)),
            index.capacity.map(|t| json!(t)),
        ));
    }

    for index in &current.global_indexes {
        if desired.global_index(&index.name).is_none() {
            changes.push(Change::new(
                FieldPath::GlobalIndex(index.name.clone()),
                ChangeKind::Delete,
                Some(serde_json::to_value(index).unwrap_or_default()),
                None,
            ));
        }
    }
}

fn diff_stream(current: &TableSpec, desired: &TableSpec, changes: &mut ChangeSet) {
    changes.extend(Change::between(
        FieldPath::StreamEnabled,
        Some(json!(current.stream_enabled)),
        Some(json!(desired.stream_enabled)),
    ));
    if desired.stream_enabled && desired.stream_view_type.is_some() {
        changes.extend(Change::between(
            FieldPath::StreamViewType,
            current.stream_view_type.map(|v| json!(v)),
            desired.stream_view_type.map(|v| json!(v)),
        ));
    }
}

fn diff_ttl(current: &TableSpec, desired: &TableSpec, changes: &mut ChangeSet) {
    match (current.ttl_attribute(), desired.ttl_attribute()) {
        (Some(old), Some(new)) => changes.extend(Change::between(
            FieldPath::TtlAttribute,
            Some(json!(old)),
            Some(json!(new)),
        )),
        (old, new) => changes.extend(Change::between(
            FieldPath::TtlEnabled,
            Some(json!(old.is_some())),
            Some(json!(new.is_some())),
        )),
    }
}

fn diff_tags(current: &TableSpec, desired: &TableSpec, changes: &mut ChangeSet) {
    let keys: BTreeSet<&String> = current.tags.keys().chain(desired.tags.keys()).collect();
    for key in keys {
        changes.extend(Change::between(
            FieldPath::Tag(key.clone()),
            current.tags.get(key).map(|v| json!(v)),
            desired.tags.get(key).map(|v| json!(v)),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeType, CapacityRange, Projection, ScalingBounds, TableClass};

    fn bounds() -> ScalingBounds {
        ScalingBounds {
            read: CapacityRange { min: 1, max: 100 },
            write: CapacityRange { min: 1, max: 100 },
            target_utilization_percent: None,
        }
    }

    fn table() -> TableSpec {
        TableSpec::new("events", "userId").with_range_key("epochS", AttributeType::Number)
    }

    fn paths(changes: &ChangeSet) -> Vec<String> {
        changes.iter().map(|c| c.path.to_string()).collect()
    }

    #[test]
    fn test_missing_table_is_a_single_create_without_replicas() {
        let desired = table()
            .with_stream(crate::schema::StreamViewType::NewAndOldImages)
            .with_replica("eu-west-1");

        let changes = diff(None, &desired, &DiffOptions::default());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, FieldPath::Table);
        assert_eq!(changes[0].kind, ChangeKind::Create);
        let created = changes[0].new.as_ref().unwrap();
        assert!(created.get("replicaRegions").is_none());
    }

    #[test]
    fn test_identical_state_has_no_changes() {
        let observed = ObservedState::active("arn", table());
        assert!(diff(Some(&observed), &table(), &DiffOptions::default()).is_empty());
    }

    #[test]
    fn test_diff_is_idempotent() {
        let observed = ObservedState::active("arn", table());
        let desired = table()
            .provisioned(5, 2)
            .with_table_class(TableClass::StandardInfrequentAccess)
            .with_ttl("expiry", true)
            .with_tag("env", "prod")
            .with_global_index(GlobalIndex::new("by_user", "userId").with_capacity(1, 1));

        let first = diff(Some(&observed), &desired, &DiffOptions::default());
        let second = diff(Some(&observed), &desired, &DiffOptions::default());

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_billing_mode_change_folds_capacity() {
        let observed = ObservedState::active("arn", table());
        let desired = table().provisioned(5, 2);

        let changes = diff(Some(&observed), &desired, &DiffOptions::default());

        assert_eq!(paths(&changes), vec!["billingMode"]);
        assert_eq!(
            changes[0].new,
            Some(json!({ "billingMode": "PROVISIONED", "readCapacity": 5, "writeCapacity": 2 }))
        );
    }

    #[test]
    fn test_capacity_change_on_unmanaged_table_is_reported() {
        let observed = ObservedState::active("arn", table().provisioned(5, 2));
        let desired = table().provisioned(10, 2);

        let changes = diff(Some(&observed), &desired, &DiffOptions::default());

        assert_eq!(paths(&changes), vec!["readCapacity"]);
        assert_eq!(changes[0].old, Some(json!(5)));
        assert_eq!(changes[0].new, Some(json!(10)));
    }

    #[test]
    fn test_autoscaling_drift_on_table_is_suppressed() {
        let desired = table().provisioned(5, 2).with_autoscaling(bounds());
        // Autoscaling moved live capacity to 40/17; last applied is still 5/2.
        let mut observed = ObservedState::active("arn", table().provisioned(40, 17).with_autoscaling(bounds()));
        observed
            .last_applied_capacity
            .insert(ScalingTarget::Table, Throughput::new(5, 2));

        let changes = diff(Some(&observed), &desired, &DiffOptions::default());

        assert!(changes.iter().all(|c| !c.path.is_table_capacity()), "{changes:?}");
    }

    #[test]
    fn test_drift_suppression_uses_live_policy_when_not_declared() {
        let desired = table().provisioned(5, 2);
        let mut observed = ObservedState::active("arn", table().provisioned(40, 17));
        observed.policies = crate::autoscaling::desired_policies(
            &table().provisioned(5, 2).with_autoscaling(bounds()),
            &Default::default(),
        );
        observed
            .last_applied_capacity
            .insert(ScalingTarget::Table, Throughput::new(5, 2));

        let changes = diff(Some(&observed), &desired, &DiffOptions::default());

        assert!(changes.is_empty(), "{changes:?}");
    }

    #[test]
    fn test_index_capacity_drift_is_reported_unless_suppression_enabled() {
        let index = GlobalIndex::new("by_user", "userId")
            .with_capacity(1, 1)
            .with_autoscaling(bounds());
        let desired = table().provisioned(5, 2).with_global_index(index.clone());
        let mut observed = ObservedState::active(
            "arn",
            table()
                .provisioned(5, 2)
                .with_global_index(GlobalIndex {
                    capacity: Some(Throughput::new(9, 9)),
                    ..index
                }),
        );
        observed
            .last_applied_capacity
            .insert(ScalingTarget::index("by_user"), Throughput::new(1, 1));

        let reported = diff(Some(&observed), &desired, &DiffOptions::default());
        assert_eq!(paths(&reported), vec!["globalIndexes[by_user].capacity"]);

        let suppressed = diff(
            Some(&observed),
            &desired,
            &DiffOptions {
                suppress_index_capacity_drift: true,
            },
        );
        assert!(suppressed.is_empty());
    }

    #[test]
    fn test_key_change_is_reported() {
        let observed = ObservedState::active("arn", table());
        let desired = TableSpec::new("events", "deviceId").with_range_key("epochS", AttributeType::Number);

        let changes = diff(Some(&observed), &desired, &DiffOptions::default());

        assert_eq!(paths(&changes), vec!["primaryKey.hashAttribute"]);
    }

    #[test]
    fn test_key_type_change_is_reported() {
        let observed = ObservedState::active("arn", table());
        let desired = TableSpec::new("events", "userId").with_range_key("epochS", AttributeType::String);

        let changes = diff(Some(&observed), &desired, &DiffOptions::default());

        assert_eq!(paths(&changes), vec!["primaryKey.rangeAttribute"]);
    }

    #[test]
    fn test_global_index_added_and_removed() {
        let observed = ObservedState::active(
            "arn",
            table().with_global_index(GlobalIndex::new("old", "userId")),
        );
        let desired = table().with_global_index(GlobalIndex::new("by_user", "userId"));

        let changes = diff(Some(&observed), &desired, &DiffOptions::default());

        assert_eq!(paths(&changes), vec!["globalIndexes[by_user]", "globalIndexes[old]"]);
        assert_eq!(changes[0].kind, ChangeKind::Create);
        assert_eq!(changes[1].kind, ChangeKind::Delete);
    }

    #[test]
    fn test_structural_global_index_change_is_a_replace() {
        let observed = ObservedState::active(
            "arn",
            table().with_global_index(GlobalIndex::new("by_user", "userId")),
        );
        let desired = table().with_global_index(GlobalIndex {
            projection: Projection::KeysOnly,
            ..GlobalIndex::new("by_user", "userId")
        });

        let changes = diff(Some(&observed), &desired, &DiffOptions::default());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Replace);
    }

    #[test]
    fn test_local_index_changes() {
        let observed = ObservedState::active(
            "arn",
            table()
                .with_attribute("tempC", AttributeType::Number)
                .with_local_index("by_temp", "tempC"),
        );
        let desired = table()
            .with_attribute("tempC", AttributeType::Number)
            .with_attribute("deviceId", AttributeType::String)
            .with_local_index("by_temp", "deviceId");

        let changes = diff(Some(&observed), &desired, &DiffOptions::default());

        assert_eq!(paths(&changes), vec!["localIndexes[by_temp]"]);
        assert_eq!(changes[0].kind, ChangeKind::Replace);
    }

    #[test]
    fn test_ttl_and_table_class() {
        let observed = ObservedState::active("arn", table().with_ttl("expiry", false));
        let desired = table()
            .with_ttl("expiry", true)
            .with_table_class(TableClass::StandardInfrequentAccess);

        let changes = diff(Some(&observed), &desired, &DiffOptions::default());

        assert_eq!(paths(&changes), vec!["tableClass", "ttl.enabled"]);
    }

    #[test]
    fn test_ttl_attribute_rename() {
        let observed = ObservedState::active("arn", table().with_ttl("expiry", true));
        let desired = table().with_ttl("expiresAt", true);

        let changes = diff(Some(&observed), &desired, &DiffOptions::default());

        assert_eq!(paths(&changes), vec!["ttl.attributeName"]);
    }

    #[test]
    fn test_tags_are_diffed_per_key() {
        let observed = ObservedState::active("arn", table().with_tag("env", "dev").with_tag("team", "iot"));
        let desired = table().with_tag("env", "prod").with_tag("owner", "ops");

        let changes = diff(Some(&observed), &desired, &DiffOptions::default());

        assert_eq!(paths(&changes), vec!["tags.env", "tags.owner", "tags.team"]);
        let kinds: Vec<_> = changes.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Update, ChangeKind::Create, ChangeKind::Delete]);
    }

    #[test]
    fn test_unnamed_desired_keeps_observed_name() {
        let observed = ObservedState::active("arn", table());
        let mut desired = table();
        desired.name = None;

        assert!(diff(Some(&observed), &desired, &DiffOptions::default()).is_empty());
    }
}
