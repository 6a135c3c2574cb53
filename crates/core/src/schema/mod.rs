mod error;
mod sensor;
mod types;
mod validation;

pub use error::{ValidationClass, ValidationError, ValidationErrors};
pub use sensor::{
    provisioned_sensor_events_table, sensor_events_table, DEVICE_ID, EPOCH_S, EVENT_ID, EXPIRY,
    GEO_LOCATION, USER_ID,
};
pub use types::{
    AttributeDefinition, AttributeType, BillingMode, CapacityRange, GlobalIndex, LocalIndex,
    PrimaryKey, Projection, ScalingBounds, StreamViewType, TableClass, TableSpec, Throughput,
    TimeToLive,
};
pub use validation::{validate_table_spec, MAX_TARGET_UTILIZATION, MIN_TARGET_UTILIZATION};
