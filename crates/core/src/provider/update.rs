//! Translates classified table changes into provider update requests.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::planning::{ChangeKind, ClassifiedChange, FieldPath};
use crate::schema::{
    AttributeDefinition, BillingMode, GlobalIndex, StreamViewType, TableClass, TableSpec,
    Throughput,
};

/// One in-place table modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TableUpdate {
    /// Switches billing mode. Table and index capacities travel with it.
    BillingMode {
        billing_mode: BillingMode,
        throughput: Option<Throughput>,
        index_throughput: BTreeMap<String, Throughput>,
    },
    Throughput {
        throughput: Throughput,
    },
    IndexThroughput {
        index: String,
        throughput: Throughput,
    },
    CreateGlobalIndex {
        index: GlobalIndex,
        attributes: Vec<AttributeDefinition>,
    },
    DeleteGlobalIndex {
        index: String,
    },
    Stream {
        enabled: bool,
        view_type: Option<StreamViewType>,
    },
    /// Enables expiry on the attribute, or disables it when None.
    TimeToLive {
        attribute_name: Option<String>,
    },
    PointInTimeRecovery {
        enabled: bool,
    },
    TableClass {
        table_class: TableClass,
    },
    Tags {
        set: BTreeMap<String, String>,
        remove: Vec<String>,
    },
}

fn create_index(desired: &TableSpec, name: &str) -> Option<TableUpdate> {
    let index = desired.global_index(name)?;
    let attributes = index
        .key_attributes()
        .filter_map(|attr| desired.declared_attribute(attr).cloned())
        .collect();
    Some(TableUpdate::CreateGlobalIndex {
        index: index.clone(),
        attributes,
    })
}

fn push_unique(updates: &mut Vec<TableUpdate>, update: TableUpdate) {
    if !updates.contains(&update) {
        updates.push(update);
    }
}

/// Builds the update requests for the table changes of one execution unit,
/// reading target values from `desired`.
///
/// Changes that require creating or replacing the whole table produce no
/// update. A replaced global index yields a delete followed by a create.
pub fn table_updates<'a>(
    changes: impl IntoIterator<Item = &'a ClassifiedChange>,
    desired: &TableSpec,
) -> Vec<TableUpdate> {
    let mut updates = Vec::new();
    let mut tags_set = BTreeMap::new();
    let mut tags_removed = Vec::new();

    for change in changes {
        match change.path() {
            FieldPath::BillingMode => push_unique(
                &mut updates,
                TableUpdate::BillingMode {
                    billing_mode: desired.billing_mode,
                    throughput: desired.throughput(),
                    index_throughput: desired
                        .global_indexes
                        .iter()
                        .filter_map(|i| i.capacity.map(|c| (i.name.clone(), c)))
                        .collect(),
                },
            ),
            FieldPath::ReadCapacity | FieldPath::WriteCapacity => {
                if let Some(throughput) = desired.throughput() {
                    push_unique(&mut updates, TableUpdate::Throughput { throughput });
                }
            }
            FieldPath::GlobalIndexCapacity(name) => {
                if let Some(throughput) = desired.global_index(name).and_then(|i| i.capacity) {
                    push_unique(
                        &mut updates,
                        TableUpdate::IndexThroughput {
                            index: name.clone(),
                            throughput,
                        },
                    );
                }
            }
            FieldPath::GlobalIndex(name) => {
                if matches!(change.kind(), ChangeKind::Delete | ChangeKind::Replace) {
                    updates.push(TableUpdate::DeleteGlobalIndex {
                        index: name.clone(),
                    });
                }
                if change.kind() != ChangeKind::Delete {
                    updates.extend(create_index(desired, name));
                }
            }
            FieldPath::StreamEnabled | FieldPath::StreamViewType => push_unique(
                &mut updates,
                TableUpdate::Stream {
                    enabled: desired.stream_enabled,
                    view_type: desired.stream_view_type,
                },
            ),
            FieldPath::TtlEnabled | FieldPath::TtlAttribute => push_unique(
                &mut updates,
                TableUpdate::TimeToLive {
                    attribute_name: desired.ttl_attribute().map(str::to_string),
                },
            ),
            FieldPath::PointInTimeRecovery => updates.push(TableUpdate::PointInTimeRecovery {
                enabled: desired.point_in_time_recovery,
            }),
            FieldPath::TableClass => updates.push(TableUpdate::TableClass {
                table_class: desired.table_class,
            }),
            FieldPath::Tag(key) => match desired.tags.get(key) {
                Some(value) => {
                    tags_set.insert(key.clone(), value.clone());
                }
                None => tags_removed.push(key.clone()),
            },
            FieldPath::Table
            | FieldPath::Name
            | FieldPath::HashKey
            | FieldPath::RangeKey
            | FieldPath::LocalIndex(_) => {}
        }
    }

    if !tags_set.is_empty() || !tags_removed.is_empty() {
        updates.push(TableUpdate::Tags {
            set: tags_set,
            remove: tags_removed,
        });
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::{classify_changes, diff, ClassificationContext, DiffOptions};
    use crate::schema::AttributeType;
    use crate::state::ObservedState;

    fn updates_between(current: TableSpec, desired: &TableSpec) -> Vec<TableUpdate> {
        let observed = ObservedState::active("arn", current);
        let changes = diff(Some(&observed), desired, &DiffOptions::default());
        let classified =
            classify_changes("events", changes, &ClassificationContext::default()).unwrap();
        table_updates(&classified, desired)
    }

    fn base() -> TableSpec {
        TableSpec::new("events", "userId")
    }

    #[test]
    fn test_billing_mode_carries_capacity() {
        let desired = base().provisioned(5, 2);

        let updates = updates_between(base(), &desired);

        assert_eq!(
            updates,
            vec![TableUpdate::BillingMode {
                billing_mode: BillingMode::Provisioned,
                throughput: Some(Throughput::new(5, 2)),
                index_throughput: BTreeMap::new(),
            }]
        );
    }

    #[test]
    fn test_both_capacities_become_one_update() {
        let current = base().provisioned(5, 2);
        let desired = base().provisioned(10, 4);

        let updates = updates_between(current, &desired);

        assert_eq!(
            updates,
            vec![TableUpdate::Throughput {
                throughput: Throughput::new(10, 4)
            }]
        );
    }

    #[test]
    fn test_new_index_includes_key_attribute_definitions() {
        let desired = base()
            .with_attribute("deviceId", AttributeType::String)
            .with_global_index(GlobalIndex::new("by_device", "deviceId"));

        let updates = updates_between(base(), &desired);

        match &updates[..] {
            [TableUpdate::CreateGlobalIndex { index, attributes }] => {
                assert_eq!(index.name, "by_device");
                assert_eq!(attributes, &vec![AttributeDefinition::new("deviceId", AttributeType::String)]);
            }
            other => panic!("unexpected updates: {other:?}"),
        }
    }

    #[test]
    fn test_replaced_index_is_deleted_then_created() {
        let current = base()
            .with_attribute("deviceId", AttributeType::String)
            .with_global_index(GlobalIndex::new("by_device", "deviceId"));
        let desired = base()
            .with_attribute("siteId", AttributeType::String)
            .with_global_index(GlobalIndex::new("by_device", "siteId"));

        let updates = updates_between(current, &desired);

        assert!(matches!(
            &updates[..],
            [TableUpdate::DeleteGlobalIndex { .. }, TableUpdate::CreateGlobalIndex { .. }]
        ));
    }

    #[test]
    fn test_ttl_and_tags() {
        let current = base().with_tag("team", "iot").with_tag("old", "x");
        let desired = base().with_tag("team", "data").with_ttl("expiry", true);

        let updates = updates_between(current, &desired);

        assert!(updates.contains(&TableUpdate::TimeToLive {
            attribute_name: Some("expiry".to_string())
        }));
        assert!(updates.contains(&TableUpdate::Tags {
            set: BTreeMap::from([("team".to_string(), "data".to_string())]),
            remove: vec!["old".to_string()],
        }));
    }

    #[test]
    fn test_key_changes_produce_no_update() {
        let desired = TableSpec::new("events", "tenantId");
        assert!(updates_between(base(), &desired).is_empty());
    }
}
