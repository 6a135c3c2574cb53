use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Address of a changed field inside a table declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub enum FieldPath {
    /// The whole table; used when it does not exist yet.
    Table,
    Name,
    HashKey,
    RangeKey,
    BillingMode,
    TableClass,
    ReadCapacity,
    WriteCapacity,
    LocalIndex(String),
    GlobalIndex(String),
    GlobalIndexCapacity(String),
    StreamEnabled,
    StreamViewType,
    TtlEnabled,
    TtlAttribute,
    PointInTimeRecovery,
    Tag(String),
}

impl FieldPath {
    /// Returns true for table throughput fields (not index throughput).
    pub fn is_table_capacity(&self) -> bool {
        matches!(self, FieldPath::ReadCapacity | FieldPath::WriteCapacity)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Table => f.write_str("table"),
            FieldPath::Name => f.write_str("name"),
            FieldPath::HashKey => f.write_str("primaryKey.hashAttribute"),
            FieldPath::RangeKey => f.write_str("primaryKey.rangeAttribute"),
            FieldPath::BillingMode => f.write_str("billingMode"),
            FieldPath::TableClass => f.write_str("tableClass"),
            FieldPath::ReadCapacity => f.write_str("readCapacity"),
            FieldPath::WriteCapacity => f.write_str("writeCapacity"),
            FieldPath::LocalIndex(name) => write!(f, "localIndexes[{name}]"),
            FieldPath::GlobalIndex(name) => write!(f, "globalIndexes[{name}]"),
            FieldPath::GlobalIndexCapacity(name) => write!(f, "globalIndexes[{name}].capacity"),
            FieldPath::StreamEnabled => f.write_str("streamEnabled"),
            FieldPath::StreamViewType => f.write_str("streamViewType"),
            FieldPath::TtlEnabled => f.write_str("ttl.enabled"),
            FieldPath::TtlAttribute => f.write_str("ttl.attributeName"),
            FieldPath::PointInTimeRecovery => f.write_str("pointInTimeRecovery"),
            FieldPath::Tag(key) => write!(f, "tags.{key}"),
        }
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

/// How a field differs between observed and desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// Absent in observed state.
    Create,
    /// Present in both with a different value.
    Update,
    /// Absent in desired state.
    Delete,
    /// An immutable structure that must be dropped and recreated.
    Replace,
}

impl ChangeKind {
    /// Diff-style marker used in rendered plans.
    pub fn symbol(&self) -> char {
        match self {
            ChangeKind::Create => '+',
            ChangeKind::Update => '~',
            ChangeKind::Delete => '-',
            ChangeKind::Replace => '!',
        }
    }
}

/// One field-level difference, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub path: FieldPath,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

impl Change {
    pub fn new(path: FieldPath, kind: ChangeKind, old: Option<Value>, new: Option<Value>) -> Self {
        Self {
            path,
            kind,
            old,
            new,
        }
    }

    /// Builds an UPDATE/CREATE/DELETE entry from two optional values, or None
    /// when they are equal.
    pub fn between(path: FieldPath, old: Option<Value>, new: Option<Value>) -> Option<Self> {
        let kind = match (&old, &new) {
            (None, None) => return None,
            (Some(a), Some(b)) if a == b => return None,
            (None, Some(_)) => ChangeKind::Create,
            (Some(_), None) => ChangeKind::Delete,
            (Some(_), Some(_)) => ChangeKind::Update,
        };
        Some(Self::new(path, kind, old, new))
    }
}

/// Ordered field-level differences between observed and desired state.
pub type ChangeSet = Vec<Change>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_path_display() {
        assert_eq!(FieldPath::BillingMode.to_string(), "billingMode");
        assert_eq!(
            FieldPath::GlobalIndexCapacity("by_user".to_string()).to_string(),
            "globalIndexes[by_user].capacity"
        );
        assert_eq!(FieldPath::Tag("env".to_string()).to_string(), "tags.env");
    }

    #[test]
    fn test_between_detects_kind() {
        assert_eq!(Change::between(FieldPath::Name, None, None), None);
        assert_eq!(
            Change::between(FieldPath::Name, Some(json!("a")), Some(json!("a"))),
            None
        );
        assert_eq!(
            Change::between(FieldPath::Name, None, Some(json!("a"))).map(|c| c.kind),
            Some(ChangeKind::Create)
        );
        assert_eq!(
            Change::between(FieldPath::Name, Some(json!("a")), None).map(|c| c.kind),
            Some(ChangeKind::Delete)
        );
        assert_eq!(
            Change::between(FieldPath::Name, Some(json!("a")), Some(json!("b"))).map(|c| c.kind),
            Some(ChangeKind::Update)
        );
    }

    #[test]
    fn test_change_serializes_path_as_string() {
        let change = Change::between(FieldPath::TtlEnabled, Some(json!(false)), Some(json!(true)))
            .unwrap();
        assert_eq!(
            serde_json::to_value(&change).unwrap(),
            json!({ "path": "ttl.enabled", "kind": "UPDATE", "old": false, "new": true })
        );
    }
}
