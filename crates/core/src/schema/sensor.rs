//! Canonical declaration of the environment sensor-event table.

use super::types::{
    AttributeType, CapacityRange, GlobalIndex, Projection, ScalingBounds, StreamViewType,
    TableSpec, Throughput,
};

/// Hash key of the sensor-event table.
pub const USER_ID: &str = "userId";
/// Range key of the sensor-event table.
pub const EVENT_ID: &str = "eventId";
pub const DEVICE_ID: &str = "deviceId";
pub const EPOCH_S: &str = "epochS";
pub const GEO_LOCATION: &str = "geoLocation";
/// Untyped epoch-seconds attribute used for TTL expiry.
pub const EXPIRY: &str = "expiry";

/// Returns the table configuration used to log environment sensor events.
///
/// Events are partitioned by user and sorted by event id, with a local index
/// ordering a user's events by time and global indexes for per-device and
/// per-location queries. This is a pure function.
pub fn sensor_events_table() -> TableSpec {
    let mut spec = TableSpec::new("environment-events", USER_ID)
        .with_range_key(EVENT_ID, AttributeType::String)
        .with_attribute(DEVICE_ID, AttributeType::String)
        .with_attribute(EPOCH_S, AttributeType::Number)
        .with_attribute(GEO_LOCATION, AttributeType::String)
        .with_local_index("by_time", EPOCH_S)
        .with_global_index(GlobalIndex::new("by_device", DEVICE_ID).with_range(EPOCH_S))
        .with_global_index(GlobalIndex {
            projection: Projection::KeysOnly,
            ..GlobalIndex::new("by_location", GEO_LOCATION).with_range(EPOCH_S)
        })
        .with_stream(StreamViewType::NewAndOldImages)
        .with_ttl(EXPIRY, true)
        .with_tag("workload", "sensor-events");
    spec.point_in_time_recovery = true;
    spec
}

/// The sensor-event table in provisioned mode with autoscaling on the table
/// and on every global index.
pub fn provisioned_sensor_events_table(read: u64, write: u64) -> TableSpec {
    let bounds = ScalingBounds {
        read: CapacityRange {
            min: read,
            max: read * 10,
        },
        write: CapacityRange {
            min: write,
            max: write * 10,
        },
        target_utilization_percent: None,
    };

    let mut spec = sensor_events_table()
        .provisioned(read, write)
        .with_autoscaling(bounds.clone());
    for index in &mut spec.global_indexes {
        index.capacity = Some(Throughput::new(read, write));
        index.autoscaling = Some(bounds.clone());
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate_table_spec;

    #[test]
    fn test_sensor_table_is_valid() {
        assert_eq!(validate_table_spec(&sensor_events_table()), Ok(()));
    }

    #[test]
    fn test_provisioned_sensor_table_is_valid_with_replicas() {
        let spec = provisioned_sensor_events_table(5, 2).with_replica("eu-west-1");
        assert_eq!(validate_table_spec(&spec), Ok(()));
    }

    #[test]
    fn test_ttl_attribute_is_not_schema_declared() {
        let spec = sensor_events_table();
        assert!(spec.declared_attribute(EXPIRY).is_none());
        assert_eq!(spec.ttl_attribute(), Some(EXPIRY));
    }
}
