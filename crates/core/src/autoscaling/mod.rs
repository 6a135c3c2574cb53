mod manager;
mod policy;

pub use manager::{
    desired_policies, drift_ignored_targets, reconcile_policies, AutoscalingDefaults,
    DEFAULT_TARGET_UTILIZATION,
};
pub use policy::{AutoscalingPolicy, PolicyOperation, ScalingDimension, ScalingTarget};
