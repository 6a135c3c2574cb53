use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::autoscaling::{AutoscalingPolicy, ScalingTarget};
use crate::schema::{TableSpec, Throughput};

/// Table status as reported by the target system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    Creating,
    Updating,
    Deleting,
    #[default]
    Active,
}

/// Global index status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexStatus {
    Creating,
    Updating,
    Deleting,
    #[default]
    Active,
}

/// Bootstrap phase of a cross-region replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicaPhase {
    Pending,
    StreamingEnabled,
    Replicating,
    Active,
}

impl ReplicaPhase {
    /// The phase that follows this one, or None once active.
    pub fn next(self) -> Option<ReplicaPhase> {
        match self {
            ReplicaPhase::Pending => Some(ReplicaPhase::StreamingEnabled),
            ReplicaPhase::StreamingEnabled => Some(ReplicaPhase::Replicating),
            ReplicaPhase::Replicating => Some(ReplicaPhase::Active),
            ReplicaPhase::Active => None,
        }
    }

    /// Returns true if moving from `self` to `to` is a legal single step (or
    /// no movement at all).
    pub fn can_transition_to(self, to: ReplicaPhase) -> bool {
        self == to || self.next() == Some(to)
    }
}

impl fmt::Display for ReplicaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplicaPhase::Pending => "PENDING",
            ReplicaPhase::StreamingEnabled => "STREAMING_ENABLED",
            ReplicaPhase::Replicating => "REPLICATING",
            ReplicaPhase::Active => "ACTIVE",
        };
        f.write_str(name)
    }
}

/// Live status of one replica region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStatus {
    pub region: String,
    pub phase: ReplicaPhase,
}

/// The provisioned state of a table as last observed.
///
/// `table` mirrors the declaration shape; its `name` is always set. The
/// remaining fields are assigned by the target system, except
/// `last_applied_capacity`, which the engine's snapshot step merges in from
/// its own record of the capacity it last applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedState {
    pub arn: String,
    #[serde(default)]
    pub status: TableStatus,
    pub table: TableSpec,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub index_status: BTreeMap<String, IndexStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replicas: Vec<ReplicaStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<AutoscalingPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_mode_updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub last_applied_capacity: BTreeMap<ScalingTarget, Throughput>,
}

impl ObservedState {
    /// An ACTIVE table whose live configuration equals `table`, with replicas
    /// ACTIVE and no policies.
    pub fn active(arn: impl Into<String>, table: TableSpec) -> Self {
        let index_status = table
            .global_indexes
            .iter()
            .map(|index| (index.name.clone(), IndexStatus::Active))
            .collect();
        let replicas = table
            .replica_regions
            .iter()
            .map(|region| ReplicaStatus {
                region: region.clone(),
                phase: ReplicaPhase::Active,
            })
            .collect();
        Self {
            arn: arn.into(),
            status: TableStatus::Active,
            table,
            index_status,
            replicas,
            policies: Vec::new(),
            billing_mode_updated_at: None,
            last_applied_capacity: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.table.display_name()
    }

    pub fn replica(&self, region: &str) -> Option<&ReplicaStatus> {
        self.replicas.iter().find(|r| r.region == region)
    }

    /// Returns true if any live policy targets the table itself.
    pub fn has_table_policy(&self) -> bool {
        self.policies
            .iter()
            .any(|p| p.target == ScalingTarget::Table)
    }

    /// Live throughput of a scaling target.
    pub fn live_throughput(&self, target: &ScalingTarget) -> Option<Throughput> {
        match target {
            ScalingTarget::Table => self.table.throughput(),
            ScalingTarget::Index(name) => self.table.global_index(name).and_then(|i| i.capacity),
        }
    }

    /// Returns true once the table, all of its global indexes and all of its
    /// replicas have reached a terminal ACTIVE state.
    pub fn is_settled(&self) -> bool {
        self.status == TableStatus::Active
            && self.index_status.values().all(|s| *s == IndexStatus::Active)
            && self.replicas.iter().all(|r| r.phase == ReplicaPhase::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::GlobalIndex;

    #[test]
    fn test_replica_phases_advance_one_step_at_a_time() {
        assert_eq!(ReplicaPhase::Pending.next(), Some(ReplicaPhase::StreamingEnabled));
        assert_eq!(ReplicaPhase::Active.next(), None);
        assert!(ReplicaPhase::StreamingEnabled.can_transition_to(ReplicaPhase::Replicating));
        assert!(ReplicaPhase::Replicating.can_transition_to(ReplicaPhase::Replicating));
        assert!(!ReplicaPhase::Pending.can_transition_to(ReplicaPhase::Active));
        assert!(!ReplicaPhase::Active.can_transition_to(ReplicaPhase::Pending));
    }

    #[test]
    fn test_active_state_mirrors_table() {
        let table = TableSpec::new("events", "userId")
            .with_global_index(GlobalIndex::new("by_user", "userId"))
            .with_replica("eu-west-1");

        let state = ObservedState::active("arn:events", table);

        assert_eq!(state.name(), "events");
        assert_eq!(state.index_status.get("by_user"), Some(&IndexStatus::Active));
        assert_eq!(
            state.replica("eu-west-1").map(|r| r.phase),
            Some(ReplicaPhase::Active)
        );
        assert!(state.is_settled());
    }

    #[test]
    fn test_pending_replica_is_not_settled() {
        let mut state =
            ObservedState::active("arn:events", TableSpec::new("events", "userId").with_replica("eu-west-1"));
        state.replicas[0].phase = ReplicaPhase::Replicating;
        assert!(!state.is_settled());
    }

    #[test]
    fn test_observed_state_deserializes_with_defaults() {
        let json = r#"{
            "arn": "arn:aws:dynamodb:us-east-1:000000000000:table/events",
            "table": {
                "name": "events",
                "billingMode": "ON_DEMAND",
                "primaryKey": { "hashAttribute": "userId" },
                "attributes": [{ "name": "userId", "type": "STRING" }]
            },
            "lastAppliedCapacity": { "table": { "read": 5, "write": 2 } }
        }"#;

        let state: ObservedState = serde_json::from_str(json).unwrap();

        assert_eq!(state.status, TableStatus::Active);
        assert!(state.policies.is_empty());
        assert_eq!(
            state.last_applied_capacity.get(&ScalingTarget::Table),
            Some(&Throughput::new(5, 2))
        );
    }
}
