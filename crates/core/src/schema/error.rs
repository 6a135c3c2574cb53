use std::fmt;

use thiserror::Error;

/// Invariant classes checked by the validator, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationClass {
    PrimaryKey,
    IndexKeys,
    LocalIndexRange,
    Capacity,
    Replication,
    TimeToLive,
}

impl fmt::Display for ValidationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationClass::PrimaryKey => "primary key",
            ValidationClass::IndexKeys => "index keys",
            ValidationClass::LocalIndexRange => "local index range",
            ValidationClass::Capacity => "capacity",
            ValidationClass::Replication => "replication",
            ValidationClass::TimeToLive => "time to live",
        };
        f.write_str(name)
    }
}

/// A single violated schema invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{resource}: {field}: {constraint}")]
pub struct ValidationError {
    pub class: ValidationClass,
    pub resource: String,
    pub field: String,
    pub constraint: String,
}

impl ValidationError {
    pub fn new(
        class: ValidationClass,
        resource: impl Into<String>,
        field: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self {
            class,
            resource: resource.into(),
            field: field.into(),
            constraint: constraint.into(),
        }
    }
}

/// All violations of the first invariant class that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} {} violation(s): {}", .errors.len(), .class, join(.errors))]
pub struct ValidationErrors {
    pub class: ValidationClass,
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// Returns true if any violation mentions the given field path or attribute.
    pub fn mentions(&self, needle: &str) -> bool {
        self.errors
            .iter()
            .any(|e| e.field.contains(needle) || e.constraint.contains(needle))
    }
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
