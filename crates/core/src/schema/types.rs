use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Capacity mode of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMode {
    /// Fully on-demand throughput.
    #[default]
    OnDemand,
    /// Fixed read/write throughput, optionally managed by autoscaling.
    Provisioned,
}

impl BillingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingMode::OnDemand => "ON_DEMAND",
            BillingMode::Provisioned => "PROVISIONED",
        }
    }
}

/// Storage tier class of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TableClass {
    #[default]
    #[serde(rename = "STANDARD")]
    Standard,
    #[serde(rename = "STANDARD_IA")]
    StandardInfrequentAccess,
}

impl TableClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableClass::Standard => "STANDARD",
            TableClass::StandardInfrequentAccess => "STANDARD_IA",
        }
    }
}

/// Scalar types allowed for key attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeType {
    String,
    Number,
    Binary,
}

/// A declared (typed) attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }
}

/// The table's primary key shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKey {
    pub hash_attribute: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_attribute: Option<String>,
}

/// Which attributes an index copies from the base table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Projection {
    #[default]
    All,
    KeysOnly,
    #[serde(rename_all = "camelCase")]
    Include { non_key_attributes: Vec<String> },
}

/// Fixed read/write throughput.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Throughput {
    pub read: u64,
    pub write: u64,
}

impl Throughput {
    pub fn new(read: u64, write: u64) -> Self {
        Self { read, write }
    }
}

/// Inclusive capacity range an autoscaling policy may move within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapacityRange {
    pub min: u64,
    pub max: u64,
}

/// Autoscaling bounds declared on a table or a global index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingBounds {
    pub read: CapacityRange,
    pub write: CapacityRange,
    /// Overrides the engine-wide default utilization target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_utilization_percent: Option<u32>,
}

/// A local secondary index. Fixed at table creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalIndex {
    pub name: String,
    pub range_attribute: String,
    #[serde(default)]
    pub projection: Projection,
}

/// A global secondary index with its own key and capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalIndex {
    pub name: String,
    pub hash_attribute: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Throughput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<ScalingBounds>,
    #[serde(default)]
    pub projection: Projection,
}

impl GlobalIndex {
    /// Creates an index keyed only by a hash attribute, projecting everything.
    pub fn new(name: impl Into<String>, hash_attribute: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash_attribute: hash_attribute.into(),
            range_attribute: None,
            capacity: None,
            autoscaling: None,
            projection: Projection::All,
        }
    }

    pub fn with_range(mut self, range_attribute: impl Into<String>) -> Self {
        self.range_attribute = Some(range_attribute.into());
        self
    }

    pub fn with_capacity(mut self, read: u64, write: u64) -> Self {
        self.capacity = Some(Throughput::new(read, write));
        self
    }

    pub fn with_autoscaling(mut self, bounds: ScalingBounds) -> Self {
        self.autoscaling = Some(bounds);
        self
    }

    /// Key attribute names used by this index, hash first.
    pub fn key_attributes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.hash_attribute.as_str()).chain(self.range_attribute.as_deref())
    }
}

/// What a change stream record contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamViewType {
    KeysOnly,
    NewImage,
    OldImage,
    NewAndOldImages,
}

/// Time-to-live expiry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeToLive {
    pub enabled: bool,
    pub attribute_name: String,
}

/// Desired configuration of a table resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSpec {
    /// Explicit table name. When absent a name is generated at creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Prefix for generated names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    #[serde(default)]
    pub billing_mode: BillingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_capacity: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_capacity: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<ScalingBounds>,
    #[serde(default)]
    pub table_class: TableClass,
    pub primary_key: PrimaryKey,
    #[serde(default)]
    pub attributes: BTreeSet<AttributeDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_indexes: Vec<LocalIndex>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_indexes: Vec<GlobalIndex>,
    #[serde(default)]
    pub stream_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_view_type: Option<StreamViewType>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub replica_regions: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<TimeToLive>,
    #[serde(default)]
    pub point_in_time_recovery: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl TableSpec {
    /// Creates an on-demand table keyed by a single string hash attribute.
    pub fn new(name: impl Into<String>, hash_attribute: impl Into<String>) -> Self {
        let hash_attribute = hash_attribute.into();
        Self {
            name: Some(name.into()),
            name_prefix: None,
            billing_mode: BillingMode::OnDemand,
            read_capacity: None,
            write_capacity: None,
            autoscaling: None,
            table_class: TableClass::Standard,
            primary_key: PrimaryKey {
                hash_attribute: hash_attribute.clone(),
                range_attribute: None,
            },
            attributes: BTreeSet::from([AttributeDefinition::new(
                hash_attribute,
                AttributeType::String,
            )]),
            local_indexes: Vec::new(),
            global_indexes: Vec::new(),
            stream_enabled: false,
            stream_view_type: None,
            replica_regions: BTreeSet::new(),
            ttl: None,
            point_in_time_recovery: false,
            tags: BTreeMap::new(),
        }
    }

    /// Sets the range attribute and declares it with the given type.
    pub fn with_range_key(mut self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        let name = name.into();
        self.attributes
            .insert(AttributeDefinition::new(name.clone(), attribute_type));
        self.primary_key.range_attribute = Some(name);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        self.attributes
            .insert(AttributeDefinition::new(name, attribute_type));
        self
    }

    /// Switches to provisioned billing with the given throughput.
    pub fn provisioned(mut self, read: u64, write: u64) -> Self {
        self.billing_mode = BillingMode::Provisioned;
        self.read_capacity = Some(read);
        self.write_capacity = Some(write);
        self
    }

    pub fn with_autoscaling(mut self, bounds: ScalingBounds) -> Self {
        self.autoscaling = Some(bounds);
        self
    }

    pub fn with_global_index(mut self, index: GlobalIndex) -> Self {
        self.global_indexes.push(index);
        self
    }

    pub fn with_local_index(
        mut self,
        name: impl Into<String>,
        range_attribute: impl Into<String>,
    ) -> Self {
        self.local_indexes.push(LocalIndex {
            name: name.into(),
            range_attribute: range_attribute.into(),
            projection: Projection::All,
        });
        self
    }

    pub fn with_table_class(mut self, table_class: TableClass) -> Self {
        self.table_class = table_class;
        self
    }

    pub fn with_stream(mut self, view_type: StreamViewType) -> Self {
        self.stream_enabled = true;
        self.stream_view_type = Some(view_type);
        self
    }

    pub fn with_replica(mut self, region: impl Into<String>) -> Self {
        self.replica_regions.insert(region.into());
        self
    }

    pub fn with_ttl(mut self, attribute_name: impl Into<String>, enabled: bool) -> Self {
        self.ttl = Some(TimeToLive {
            enabled,
            attribute_name: attribute_name.into(),
        });
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Name used in errors and logs before a name has been assigned.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.name_prefix.as_deref())
            .unwrap_or("<generated>")
    }

    /// Provisioned table throughput, if both capacities are set.
    pub fn throughput(&self) -> Option<Throughput> {
        match (self.read_capacity, self.write_capacity) {
            (Some(read), Some(write)) => Some(Throughput::new(read, write)),
            _ => None,
        }
    }

    pub fn is_provisioned(&self) -> bool {
        self.billing_mode == BillingMode::Provisioned
    }

    pub fn declared_attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn global_index(&self, name: &str) -> Option<&GlobalIndex> {
        self.global_indexes.iter().find(|i| i.name == name)
    }

    /// Returns the TTL attribute when expiry is enabled.
    pub fn ttl_attribute(&self) -> Option<&str> {
        self.ttl
            .as_ref()
            .filter(|ttl| ttl.enabled)
            .map(|ttl| ttl.attribute_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_spec_deserializes_from_camel_case_document() {
        let json = r#"{
            "name": "events",
            "billingMode": "PROVISIONED",
            "readCapacity": 5,
            "writeCapacity": 2,
            "tableClass": "STANDARD_IA",
            "primaryKey": { "hashAttribute": "userId", "rangeAttribute": "epochS" },
            "attributes": [
                { "name": "userId", "type": "STRING" },
                { "name": "epochS", "type": "NUMBER" }
            ],
            "globalIndexes": [
                { "name": "by_device", "hashAttribute": "userId", "projection": { "type": "KEYS_ONLY" } }
            ],
            "ttl": { "enabled": true, "attributeName": "expiry" }
        }"#;

        let spec: TableSpec = serde_json::from_str(json).unwrap();

        assert_eq!(spec.billing_mode, BillingMode::Provisioned);
        assert_eq!(spec.throughput(), Some(Throughput::new(5, 2)));
        assert_eq!(spec.table_class, TableClass::StandardInfrequentAccess);
        assert_eq!(spec.primary_key.range_attribute.as_deref(), Some("epochS"));
        assert_eq!(spec.global_indexes[0].projection, Projection::KeysOnly);
        assert_eq!(spec.ttl_attribute(), Some("expiry"));
        assert!(!spec.stream_enabled);
    }

    #[test]
    fn test_include_projection_roundtrips_non_key_attributes() {
        let projection = Projection::Include {
            non_key_attributes: vec!["tempC".to_string()],
        };
        let json = serde_json::to_value(&projection).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "INCLUDE", "nonKeyAttributes": ["tempC"] })
        );
    }

    #[test]
    fn test_display_name_falls_back_to_prefix() {
        let mut spec = TableSpec::new("events", "userId");
        spec.name = None;
        assert_eq!(spec.display_name(), "<generated>");

        spec.name_prefix = Some("sensor".to_string());
        assert_eq!(spec.display_name(), "sensor");
    }

    #[test]
    fn test_disabled_ttl_has_no_attribute() {
        let spec = TableSpec::new("events", "userId").with_ttl("expiry", false);
        assert_eq!(spec.ttl_attribute(), None);
    }
}
