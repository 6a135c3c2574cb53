use serde::{Serialize, Serializer};

use tablesync_core::planning::{Plan, UnitKind};
use tablesync_core::state::ObservedState;

use crate::error::RunError;

/// What happened to one execution unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitOutcome {
    Applied,
    Failed { error: String },
    NotAttempted,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReport {
    pub index: usize,
    pub kind: UnitKind,
    #[serde(flatten)]
    pub outcome: UnitOutcome,
}

fn serialize_failure<S: Serializer>(
    failure: &Option<RunError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match failure {
        Some(error) => serializer.serialize_some(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Result of one convergence run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub resource: String,
    pub plan: Plan,
    pub units: Vec<UnitReport>,
    /// Items written after the table was created.
    pub seeded_items: usize,
    /// The error that halted the run, if any.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_failure"
    )]
    pub failure: Option<RunError>,
    /// State observed after the last unit, for exporting the name and ARN.
    pub final_state: Option<ObservedState>,
}

impl RunReport {
    /// A report with every unit of `plan` not yet attempted.
    pub fn pending(plan: Plan) -> Self {
        let units = plan
            .units
            .iter()
            .map(|unit| UnitReport {
                index: unit.index,
                kind: unit.kind,
                outcome: UnitOutcome::NotAttempted,
            })
            .collect();
        Self {
            resource: plan.resource.clone(),
            plan,
            units,
            seeded_items: 0,
            failure: None,
            final_state: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub(crate) fn set_outcome(&mut self, position: usize, outcome: UnitOutcome) {
        if let Some(unit) = self.units.get_mut(position) {
            unit.outcome = outcome;
        }
    }

    /// Marks every unit from `position` on as cancelled.
    pub(crate) fn cancel_from(&mut self, position: usize) {
        for unit in self.units.iter_mut().skip(position) {
            unit.outcome = UnitOutcome::Cancelled;
        }
    }

    pub fn count(&self, outcome: &UnitOutcome) -> usize {
        self.units.iter().filter(|u| &u.outcome == outcome).count()
    }
}
