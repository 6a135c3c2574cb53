//! Orders classified changes into execution units.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::autoscaling::PolicyOperation;
use crate::replication::ReplicaOperation;
use crate::state::ObservedState;

use super::change::ChangeKind;
use super::classify::{ClassifiedChange, Strategy};
use super::error::{PlanError, Result};

/// Default minimum interval between two billing mode transitions.
pub const DEFAULT_BILLING_MODE_COOLDOWN_SECS: i64 = 24 * 60 * 60;

/// What an execution unit does. Units of one plan appear in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitKind {
    CreateTable,
    Replacement,
    PolicyRemoval,
    ReplicaRemoval,
    InPlace,
    BillingMode,
    GlobalIndex,
    PolicyAttachment,
    ReplicaAddition,
    TableClass,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitKind::PolicyRemoval => "policy-removal",
            UnitKind::CreateTable => "create-table",
            UnitKind::Replacement => "replacement",
            UnitKind::ReplicaRemoval => "replica-removal",
            UnitKind::InPlace => "in-place",
            UnitKind::BillingMode => "billing-mode",
            UnitKind::GlobalIndex => "global-index",
            UnitKind::PolicyAttachment => "policy-attachment",
            UnitKind::ReplicaAddition => "replica-addition",
            UnitKind::TableClass => "table-class",
        };
        f.write_str(name)
    }
}

/// A single operation inside an execution unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    Table(ClassifiedChange),
    Policy(PolicyOperation),
    Replica(ReplicaOperation),
}

/// A batch of operations submitted together. The next unit starts only
/// after this one has converged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionUnit {
    /// 1-based position in the plan.
    pub index: usize,
    pub kind: UnitKind,
    pub operations: Vec<Operation>,
}

impl ExecutionUnit {
    pub fn table_changes(&self) -> impl Iterator<Item = &ClassifiedChange> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Table(change) => Some(change),
            _ => None,
        })
    }

    pub fn policy_operations(&self) -> impl Iterator<Item = &PolicyOperation> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Policy(policy) => Some(policy),
            _ => None,
        })
    }

    pub fn replica_operations(&self) -> impl Iterator<Item = &ReplicaOperation> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Replica(replica) => Some(replica),
            _ => None,
        })
    }
}

/// Ordered execution units for one table resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub resource: String,
    pub units: Vec<ExecutionUnit>,
    /// Changes on externally controlled fields. Reported, never applied.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<ClassifiedChange>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Per-resource record of billing mode transitions applied by this engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooldownLedger {
    last_billing_change: HashMap<String, DateTime<Utc>>,
}

impl CooldownLedger {
    pub fn record(&mut self, resource: &str, at: DateTime<Utc>) {
        self.last_billing_change.insert(resource.to_string(), at);
    }

    pub fn last_change(&self, resource: &str) -> Option<DateTime<Utc>> {
        self.last_billing_change.get(resource).copied()
    }
}

/// Orders classified changes, policy operations and replica operations into
/// execution units.
#[derive(Debug, Clone)]
pub struct Scheduler {
    cooldown: Duration,
    ledger: CooldownLedger,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_BILLING_MODE_COOLDOWN_SECS))
    }
}

struct UnitBuilder {
    units: Vec<ExecutionUnit>,
}

impl UnitBuilder {
    fn push(&mut self, kind: UnitKind, operations: Vec<Operation>) {
        if operations.is_empty() {
            return;
        }
        self.units.push(ExecutionUnit {
            index: self.units.len() + 1,
            kind,
            operations,
        });
    }

    /// One unit per operation.
    fn push_each(&mut self, kind: UnitKind, operations: Vec<Operation>) {
        for operation in operations {
            self.push(kind, vec![operation]);
        }
    }
}

fn table_ops<'a>(
    changes: impl IntoIterator<Item = &'a ClassifiedChange>,
) -> Vec<Operation> {
    changes.into_iter().cloned().map(Operation::Table).collect()
}

impl Scheduler {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            ledger: CooldownLedger::default(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn ledger(&self) -> &CooldownLedger {
        &self.ledger
    }

    /// Records a billing mode transition applied at `at`. A later plan for the
    /// same resource inside the cooldown window is rejected.
    pub fn record_billing_change(&mut self, resource: &str, at: DateTime<Utc>) {
        self.ledger.record(resource, at);
    }

    fn check_rate_limit(
        &self,
        resource: &str,
        observed: Option<&ObservedState>,
        change: &ClassifiedChange,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let last = [
            observed.and_then(|state| state.billing_mode_updated_at),
            self.ledger.last_change(resource),
        ]
        .into_iter()
        .flatten()
        .max();

        if let Some(last) = last {
            let retry_after = last + self.cooldown;
            if now < retry_after {
                return Err(PlanError::RateLimitViolation {
                    resource: resource.to_string(),
                    field: change.path().to_string(),
                    last_changed: last,
                    retry_after,
                });
            }
        }
        Ok(())
    }

    /// Builds the plan.
    ///
    /// Order: table creation or replacement; policy removals; replica
    /// removals; in-place changes; the billing mode change alone; global
    /// index deletions then creations, one index per unit; policy
    /// attachments; replica additions, one region per unit; the table class
    /// change alone, last. Empty groups produce no unit.
    pub fn schedule(
        &self,
        resource: &str,
        observed: Option<&ObservedState>,
        changes: Vec<ClassifiedChange>,
        policy_ops: Vec<PolicyOperation>,
        replica_ops: Vec<ReplicaOperation>,
        now: DateTime<Utc>,
    ) -> Result<Plan> {
        let (ignored, changes): (Vec<_>, Vec<_>) = changes
            .into_iter()
            .partition(|c| c.strategy() == Strategy::Ignored);

        if let Some(change) = changes.iter().find(|c| c.strategy() == Strategy::RateLimited) {
            self.check_rate_limit(resource, observed, change, now)?;
        }

        let with = |strategy: Strategy| changes.iter().filter(move |c| c.strategy() == strategy);

        let (policy_removals, policy_attachments): (Vec<_>, Vec<_>) = policy_ops
            .into_iter()
            .map(Operation::Policy)
            .partition(|op| matches!(op, Operation::Policy(p) if p.is_delete()));
        let (replica_additions, replica_removals): (Vec<_>, Vec<_>) = replica_ops
            .into_iter()
            .partition(ReplicaOperation::is_add);

        let recreating = changes
            .iter()
            .any(|c| matches!(c.strategy(), Strategy::Create | Strategy::Replacement));

        let mut builder = UnitBuilder { units: Vec::new() };
        if recreating {
            // Creation or replacement submits the full desired table at once, so
            // every non-exclusive change travels in the same unit.
            let kind = if with(Strategy::Create).next().is_some() {
                UnitKind::CreateTable
            } else {
                UnitKind::Replacement
            };
            builder.push(
                kind,
                table_ops(changes.iter().filter(|c| c.strategy() != Strategy::Exclusive)),
            );
        }
        builder.push(UnitKind::PolicyRemoval, policy_removals);
        builder.push_each(
            UnitKind::ReplicaRemoval,
            replica_removals.into_iter().map(Operation::Replica).collect(),
        );
        if !recreating {
            builder.push(UnitKind::InPlace, table_ops(with(Strategy::InPlace)));
            builder.push_each(UnitKind::BillingMode, table_ops(with(Strategy::RateLimited)));

            let (index_deletes, index_creates): (Vec<_>, Vec<_>) = with(Strategy::Staged)
                .partition(|c| c.kind() == ChangeKind::Delete);
            builder.push_each(UnitKind::GlobalIndex, table_ops(index_deletes));
            builder.push_each(UnitKind::GlobalIndex, table_ops(index_creates));
        }

        builder.push(UnitKind::PolicyAttachment, policy_attachments);
        builder.push_each(
            UnitKind::ReplicaAddition,
            replica_additions.into_iter().map(Operation::Replica).collect(),
        );
        builder.push_each(UnitKind::TableClass, table_ops(with(Strategy::Exclusive)));

        Ok(Plan {
            resource: resource.to_string(),
            units: builder.units,
            ignored,
        })
    }
}
