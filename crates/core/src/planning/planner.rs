//! Validate, diff, classify, reconcile and schedule in one call.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::autoscaling::{
    drift_ignored_targets, reconcile_policies, AutoscalingDefaults, PolicyOperation, ScalingTarget,
};
use crate::replication::plan_replication;
use crate::schema::{validate_table_spec, TableSpec};
use crate::state::ObservedState;

use super::change::{ChangeKind, FieldPath};
use super::classify::{classify_changes, ClassificationContext, ClassifiedChange, Strategy};
use super::diff::{diff, DiffOptions};
use super::error::Result;
use super::schedule::{Plan, Scheduler, DEFAULT_BILLING_MODE_COOLDOWN_SECS};

/// Planner settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerConfig {
    pub diff: DiffOptions,
    pub autoscaling: AutoscalingDefaults,
    pub billing_mode_cooldown: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            diff: DiffOptions::default(),
            autoscaling: AutoscalingDefaults::default(),
            billing_mode_cooldown: Duration::seconds(DEFAULT_BILLING_MODE_COOLDOWN_SECS),
        }
    }
}

/// Global indexes the plan drops and recreates.
fn replaced_indexes(classified: &[ClassifiedChange]) -> BTreeSet<ScalingTarget> {
    classified
        .iter()
        .filter(|c| c.kind() == ChangeKind::Replace)
        .filter_map(|c| match c.path() {
            FieldPath::GlobalIndex(name) => Some(ScalingTarget::index(name)),
            _ => None,
        })
        .collect()
}

/// Produces plans. Holds the billing mode cooldown ledger, so one planner
/// should be shared by everything applying to the same resources.
#[derive(Debug, Clone)]
pub struct Planner {
    config: PlannerConfig,
    scheduler: Scheduler,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            scheduler: Scheduler::new(config.billing_mode_cooldown),
            config,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn record_billing_change(&mut self, resource: &str, at: DateTime<Utc>) {
        self.scheduler.record_billing_change(resource, at);
    }

    /// Plans the convergence of `observed` (None if the table does not
    /// exist) towards `desired`. No state is modified.
    pub fn plan(
        &self,
        observed: Option<&ObservedState>,
        desired: &TableSpec,
        now: DateTime<Utc>,
    ) -> Result<Plan> {
        validate_table_spec(desired)?;

        let resource = observed
            .map(ObservedState::name)
            .unwrap_or_else(|| desired.display_name());

        let changes = diff(observed, desired, &self.config.diff);
        let context = ClassificationContext {
            autoscaled: drift_ignored_targets(desired, observed),
        };
        let classified = classify_changes(resource, changes, &context)?;

        // A recreated table starts without policies or replicas.
        let recreating = classified
            .iter()
            .any(|c| matches!(c.strategy(), Strategy::Create | Strategy::Replacement));
        // Policies of a replaced index go with it: they are deleted before the
        // index unit and attached again after it.
        let replaced = replaced_indexes(&classified);
        let mut policy_ops = Vec::new();
        let baseline = match observed {
            Some(state) if !recreating => {
                let mut state = state.clone();
                let (dropped, kept) = state
                    .policies
                    .into_iter()
                    .partition(|p| replaced.contains(&p.target));
                state.policies = kept;
                policy_ops.extend(dropped.into_iter().map(PolicyOperation::Delete));
                Some(state)
            }
            _ => None,
        };

        policy_ops.extend(reconcile_policies(
            desired,
            baseline.as_ref(),
            &self.config.autoscaling,
        ));
        let replica_ops = plan_replication(baseline.as_ref(), desired, &policy_ops)?;

        self.scheduler
            .schedule(resource, observed, classified, policy_ops, replica_ops, now)
    }
}
