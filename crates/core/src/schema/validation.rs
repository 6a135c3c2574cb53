use std::collections::HashSet;

use super::error::{ValidationClass, ValidationError, ValidationErrors};
use super::types::{BillingMode, ScalingBounds, StreamViewType, TableSpec};

/// Lowest and highest utilization a target-tracking policy accepts.
pub const MIN_TARGET_UTILIZATION: u32 = 20;
pub const MAX_TARGET_UTILIZATION: u32 = 90;

type Check = fn(&TableSpec, &str) -> Vec<ValidationError>;

/// Validates a desired-state document before it is diffed.
///
/// Invariant classes are evaluated in a fixed order. The first class with any
/// violation is returned with *all* of its violations, so a caller can fix a
/// whole category at once; later classes are not evaluated.
pub fn validate_table_spec(spec: &TableSpec) -> Result<(), ValidationErrors> {
    let checks: [(ValidationClass, Check); 6] = [
        (ValidationClass::PrimaryKey, check_primary_key),
        (ValidationClass::IndexKeys, check_index_keys),
        (ValidationClass::LocalIndexRange, check_local_index_ranges),
        (ValidationClass::Capacity, check_capacity),
        (ValidationClass::Replication, check_replication),
        (ValidationClass::TimeToLive, check_ttl),
    ];

    let resource = spec.display_name();
    for (class, check) in checks {
        let errors = check(spec, resource);
        if !errors.is_empty() {
            return Err(ValidationErrors { class, errors });
        }
    }
    Ok(())
}

fn undeclared(
    spec: &TableSpec,
    class: ValidationClass,
    resource: &str,
    field: String,
    attribute: &str,
) -> Option<ValidationError> {
    if spec.declared_attribute(attribute).is_some() {
        return None;
    }
    Some(ValidationError::new(
        class,
        resource,
        field,
        format!("attribute '{attribute}' is not declared in attributes"),
    ))
}

fn check_primary_key(spec: &TableSpec, resource: &str) -> Vec<ValidationError> {
    let class = ValidationClass::PrimaryKey;
    let key = &spec.primary_key;
    let mut errors = Vec::new();

    if key.hash_attribute.trim().is_empty() {
        errors.push(ValidationError::new(
            class,
            resource,
            "primaryKey.hashAttribute",
            "must not be empty",
        ));
    } else {
        errors.extend(undeclared(
            spec,
            class,
            resource,
            "primaryKey.hashAttribute".to_string(),
            &key.hash_attribute,
        ));
    }

    if let Some(range) = &key.range_attribute {
        errors.extend(undeclared(
            spec,
            class,
            resource,
            "primaryKey.rangeAttribute".to_string(),
            range,
        ));
    }
    errors
}

fn check_index_keys(spec: &TableSpec, resource: &str) -> Vec<ValidationError> {
    let class = ValidationClass::IndexKeys;
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for index in &spec.local_indexes {
        if !names.insert(index.name.as_str()) {
            errors.push(ValidationError::new(
                class,
                resource,
                format!("localIndexes[{}]", index.name),
                "index names must be unique across local and global indexes",
            ));
        }
        errors.extend(undeclared(
            spec,
            class,
            resource,
            format!("localIndexes[{}].rangeAttribute", index.name),
            &index.range_attribute,
        ));
    }

    for index in &spec.global_indexes {
        if !names.insert(index.name.as_str()) {
            errors.push(ValidationError::new(
                class,
                resource,
                format!("globalIndexes[{}]", index.name),
                "index names must be unique across local and global indexes",
            ));
        }
        errors.extend(undeclared(
            spec,
            class,
            resource,
            format!("globalIndexes[{}].hashAttribute", index.name),
            &index.hash_attribute,
        ));
        if let Some(range) = &index.range_attribute {
            errors.extend(undeclared(
                spec,
                class,
                resource,
                format!("globalIndexes[{}].rangeAttribute", index.name),
                range,
            ));
        }
    }
    errors
}

fn check_local_index_ranges(spec: &TableSpec, resource: &str) -> Vec<ValidationError> {
    let class = ValidationClass::LocalIndexRange;
    let table_range = spec.primary_key.range_attribute.as_deref();

    spec.local_indexes
        .iter()
        .filter_map(|index| {
            let field = format!("localIndexes[{}].rangeAttribute", index.name);
            match table_range {
                None => Some(ValidationError::new(
                    class,
                    resource,
                    field,
                    "local indexes require the table to declare a range key",
                )),
                Some(range) if range == index.range_attribute => Some(ValidationError::new(
                    class,
                    resource,
                    field,
                    format!("must differ from the table range attribute '{range}'"),
                )),
                Some(_) => None,
            }
        })
        .collect()
}

fn check_bounds(
    bounds: &ScalingBounds,
    resource: &str,
    prefix: &str,
    errors: &mut Vec<ValidationError>,
) {
    let class = ValidationClass::Capacity;
    for (dimension, range) in [("read", bounds.read), ("write", bounds.write)] {
        if range.min == 0 || range.min > range.max {
            errors.push(ValidationError::new(
                class,
                resource,
                format!("{prefix}.{dimension}"),
                format!(
                    "requires 1 <= min <= max (got min {}, max {})",
                    range.min, range.max
                ),
            ));
        }
    }
    if let Some(target) = bounds.target_utilization_percent {
        if !(MIN_TARGET_UTILIZATION..=MAX_TARGET_UTILIZATION).contains(&target) {
            errors.push(ValidationError::new(
                class,
                resource,
                format!("{prefix}.targetUtilizationPercent"),
                format!(
                    "must be between {MIN_TARGET_UTILIZATION} and {MAX_TARGET_UTILIZATION} (got {target})"
                ),
            ));
        }
    }
}

fn check_capacity(spec: &TableSpec, resource: &str) -> Vec<ValidationError> {
    let class = ValidationClass::Capacity;
    let mut errors = Vec::new();

    match spec.billing_mode {
        BillingMode::Provisioned => {
            for (field, value) in [
                ("readCapacity", spec.read_capacity),
                ("writeCapacity", spec.write_capacity),
            ] {
                match value {
                    None => errors.push(ValidationError::new(
                        class,
                        resource,
                        field,
                        "is required when billingMode is PROVISIONED",
                    )),
                    Some(0) => errors.push(ValidationError::new(
                        class,
                        resource,
                        field,
                        "must be greater than zero",
                    )),
                    Some(_) => {}
                }
            }
            for index in &spec.global_indexes {
                let field = format!("globalIndexes[{}].capacity", index.name);
                match index.capacity {
                    None => errors.push(ValidationError::new(
                        class,
                        resource,
                        field,
                        "is required when billingMode is PROVISIONED",
                    )),
                    Some(capacity) if capacity.read == 0 || capacity.write == 0 => {
                        errors.push(ValidationError::new(
                            class,
                            resource,
                            field,
                            "read and write must be greater than zero",
                        ))
                    }
                    Some(_) => {}
                }
            }
        }
        BillingMode::OnDemand => {
            if spec.read_capacity.is_some() || spec.write_capacity.is_some() {
                errors.push(ValidationError::new(
                    class,
                    resource,
                    "readCapacity",
                    "must be omitted when billingMode is ON_DEMAND",
                ));
            }
            if spec.autoscaling.is_some() {
                errors.push(ValidationError::new(
                    class,
                    resource,
                    "autoscaling",
                    "requires billingMode PROVISIONED",
                ));
            }
            for index in spec.global_indexes.iter().filter(|i| i.autoscaling.is_some()) {
                errors.push(ValidationError::new(
                    class,
                    resource,
                    format!("globalIndexes[{}].autoscaling", index.name),
                    "requires billingMode PROVISIONED",
                ));
            }
        }
    }

    if let Some(bounds) = &spec.autoscaling {
        check_bounds(bounds, resource, "autoscaling", &mut errors);
    }
    for index in &spec.global_indexes {
        if let Some(bounds) = &index.autoscaling {
            let prefix = format!("globalIndexes[{}].autoscaling", index.name);
            check_bounds(bounds, resource, &prefix, &mut errors);
        }
    }
    errors
}

fn check_replication(spec: &TableSpec, resource: &str) -> Vec<ValidationError> {
    let class = ValidationClass::Replication;
    let mut errors = Vec::new();
    if spec.replica_regions.is_empty() {
        return errors;
    }

    if !spec.stream_enabled {
        errors.push(ValidationError::new(
            class,
            resource,
            "streamEnabled",
            "must be true when replicaRegions is not empty",
        ));
    }
    if let Some(view) = spec.stream_view_type {
        if view != StreamViewType::NewAndOldImages {
            errors.push(ValidationError::new(
                class,
                resource,
                "streamViewType",
                "replicas require NEW_AND_OLD_IMAGES",
            ));
        }
    }
    if spec.is_provisioned() {
        if spec.autoscaling.is_none() {
            errors.push(ValidationError::new(
                class,
                resource,
                "autoscaling",
                "replicas on a PROVISIONED table require a table autoscaling policy",
            ));
        }
        for index in spec.global_indexes.iter().filter(|i| i.autoscaling.is_none()) {
            errors.push(ValidationError::new(
                class,
                resource,
                format!("globalIndexes[{}].autoscaling", index.name),
                "replicas on a PROVISIONED table require an autoscaling policy on every global index",
            ));
        }
    }
    errors
}

fn check_ttl(spec: &TableSpec, resource: &str) -> Vec<ValidationError> {
    let class = ValidationClass::TimeToLive;
    let Some(ttl) = &spec.ttl else {
        return Vec::new();
    };

    if ttl.attribute_name.trim().is_empty() {
        if ttl.enabled {
            return vec![ValidationError::new(
                class,
                resource,
                "ttl.attributeName",
                "must not be empty when ttl is enabled",
            )];
        }
        return Vec::new();
    }

    if spec.declared_attribute(&ttl.attribute_name).is_some() {
        return vec![ValidationError::new(
            class,
            resource,
            "ttl.attributeName",
            format!(
                "attribute '{}' must not be declared in attributes",
                ttl.attribute_name
            ),
        )];
    }
    Vec::new()
}
