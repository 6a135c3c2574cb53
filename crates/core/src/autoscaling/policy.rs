use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Resource an autoscaling policy is bound to.
///
/// Serialized as `table` or `table/index/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ScalingTarget {
    Table,
    Index(String),
}

impl ScalingTarget {
    pub fn index(name: impl Into<String>) -> Self {
        ScalingTarget::Index(name.into())
    }

    pub fn index_name(&self) -> Option<&str> {
        match self {
            ScalingTarget::Table => None,
            ScalingTarget::Index(name) => Some(name),
        }
    }
}

impl fmt::Display for ScalingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingTarget::Table => f.write_str("table"),
            ScalingTarget::Index(name) => write!(f, "table/index/{name}"),
        }
    }
}

impl From<ScalingTarget> for String {
    fn from(target: ScalingTarget) -> Self {
        target.to_string()
    }
}

impl FromStr for ScalingTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "table" {
            return Ok(ScalingTarget::Table);
        }
        match s.strip_prefix("table/index/") {
            Some(name) if !name.is_empty() => Ok(ScalingTarget::Index(name.to_string())),
            _ => Err(format!("invalid scaling target '{s}'")),
        }
    }
}

impl TryFrom<String> for ScalingTarget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Throughput dimension a policy tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScalingDimension {
    Read,
    Write,
}

impl fmt::Display for ScalingDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingDimension::Read => f.write_str("READ"),
            ScalingDimension::Write => f.write_str("WRITE"),
        }
    }
}

/// A target-tracking policy holding utilization near a set point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingPolicy {
    pub target: ScalingTarget,
    pub dimension: ScalingDimension,
    pub min_capacity: u64,
    pub max_capacity: u64,
    pub target_utilization_percent: u32,
}

impl AutoscalingPolicy {
    /// Identity of the policy: one per target and dimension.
    pub fn key(&self) -> (ScalingTarget, ScalingDimension) {
        (self.target.clone(), self.dimension)
    }
}

/// A change to the set of autoscaling policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "policy", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyOperation {
    /// Create or replace the policy for its target and dimension.
    Put(AutoscalingPolicy),
    /// Deregister the policy. Never deletes the target itself.
    Delete(AutoscalingPolicy),
}

impl PolicyOperation {
    pub fn policy(&self) -> &AutoscalingPolicy {
        match self {
            PolicyOperation::Put(policy) | PolicyOperation::Delete(policy) => policy,
        }
    }

    pub fn target(&self) -> &ScalingTarget {
        &self.policy().target
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, PolicyOperation::Delete(_))
    }
}
