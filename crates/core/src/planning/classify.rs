use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::autoscaling::ScalingTarget;

use super::change::{Change, ChangeKind, ChangeSet, FieldPath};
use super::error::{PlanError, Result};

/// How a change must be applied to the target system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Create the table from scratch.
    Create,
    /// Destroy and recreate the whole table. All stored items are lost.
    Replacement,
    /// Independent global index operation, one index per unit.
    Staged,
    /// In-place, but at most one per cooldown window.
    RateLimited,
    /// In-place, and must be the only change in its unit.
    Exclusive,
    /// Externally controlled; reported but never applied.
    Ignored,
    InPlace,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Create => "CREATE",
            Strategy::Replacement => "REPLACEMENT",
            Strategy::Staged => "STAGED",
            Strategy::RateLimited => "RATE_LIMITED",
            Strategy::Exclusive => "EXCLUSIVE",
            Strategy::Ignored => "IGNORED",
            Strategy::InPlace => "IN_PLACE",
        };
        f.write_str(name)
    }
}

/// Facts about the resource the classifier needs beyond the change itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationContext {
    /// Targets whose capacity is controlled by autoscaling.
    pub autoscaled: BTreeSet<ScalingTarget>,
}

/// A change with its strategy. The strategy is fixed at classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedChange {
    #[serde(flatten)]
    change: Change,
    strategy: Strategy,
}

impl ClassifiedChange {
    pub fn change(&self) -> &Change {
        &self.change
    }

    pub fn path(&self) -> &FieldPath {
        &self.change.path
    }

    pub fn kind(&self) -> ChangeKind {
        self.change.kind
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }
}

/// Assigns an update strategy to a single change. Rules are evaluated
/// highest priority first.
pub fn classify(change: &Change, context: &ClassificationContext) -> Strategy {
    match &change.path {
        FieldPath::Table => Strategy::Create,
        FieldPath::Name | FieldPath::HashKey | FieldPath::RangeKey => Strategy::Replacement,
        FieldPath::LocalIndex(_) => Strategy::Replacement,
        FieldPath::GlobalIndex(_) => Strategy::Staged,
        FieldPath::BillingMode => Strategy::RateLimited,
        FieldPath::TableClass => Strategy::Exclusive,
        FieldPath::ReadCapacity | FieldPath::WriteCapacity
            if context.autoscaled.contains(&ScalingTarget::Table) =>
        {
            Strategy::Ignored
        }
        FieldPath::GlobalIndexCapacity(name)
            if context.autoscaled.contains(&ScalingTarget::index(name)) =>
        {
            Strategy::Ignored
        }
        _ => Strategy::InPlace,
    }
}

/// Classifies a whole changeset.
///
/// A table replacement recreates the table with the desired configuration,
/// so it cannot also be split around an EXCLUSIVE change in the same plan;
/// that combination has no safe ordering and is rejected.
pub fn classify_changes(
    resource: &str,
    changes: ChangeSet,
    context: &ClassificationContext,
) -> Result<Vec<ClassifiedChange>> {
    let classified: Vec<ClassifiedChange> = changes
        .into_iter()
        .map(|change| {
            let strategy = classify(&change, context);
            ClassifiedChange { change, strategy }
        })
        .collect();

    let fields_with = |strategy: Strategy| -> Vec<String> {
        classified
            .iter()
            .filter(|c| c.strategy == strategy)
            .map(|c| c.path().to_string())
            .collect()
    };
    let replacements = fields_with(Strategy::Replacement);
    let exclusives = fields_with(Strategy::Exclusive);
    if !replacements.is_empty() && !exclusives.is_empty() {
        return Err(PlanError::ConflictingChange {
            resource: resource.to_string(),
            fields: replacements.into_iter().chain(exclusives).collect(),
            constraint: "a table replacement cannot be combined with an exclusive table class change"
                .to_string(),
        });
    }

    Ok(classified)
}
