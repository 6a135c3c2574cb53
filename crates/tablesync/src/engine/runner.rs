//! Applies plans unit by unit against a table provider.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tablesync_core::autoscaling::{PolicyOperation, ScalingTarget};
use tablesync_core::planning::{ExecutionUnit, Plan, PlanError, Planner, UnitKind};
use tablesync_core::provider::{table_updates, TableProvider, TableUpdate};
use tablesync_core::replication::ReplicaOperation;
use tablesync_core::schema::{TableSpec, Throughput};
use tablesync_core::seed::SeedBatch;
use tablesync_core::state::{ObservedState, TableStatus};

use crate::config::EngineConfig;
use crate::error::{Result, RunError};

use super::{CancelHandle, ResourceLocks, RunReport, UnitOutcome};

/// Prefix for generated names when a declaration has neither a name nor a
/// prefix.
const DEFAULT_NAME_PREFIX: &str = "table";

/// Polling settings for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    pub convergence_timeout: Duration,
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            convergence_timeout: config.convergence_timeout(),
        }
    }
}

type CapacityLedger = HashMap<String, BTreeMap<ScalingTarget, Throughput>>;

/// Generates a table name of the form `<prefix>-<8 hex characters>`.
pub fn generate_name(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &id[..8])
}

/// Name under which the table currently exists, if known.
fn lookup_name(desired: &TableSpec, existing: Option<&str>) -> Option<String> {
    existing
        .map(str::to_string)
        .or_else(|| desired.name.clone())
}

/// Name the table has once the run completes.
fn target_name(desired: &TableSpec, observed: Option<&ObservedState>) -> String {
    desired
        .name
        .clone()
        .or_else(|| observed.map(|state| state.name().to_string()))
        .unwrap_or_else(|| {
            generate_name(desired.name_prefix.as_deref().unwrap_or(DEFAULT_NAME_PREFIX))
        })
}

fn declared_capacity(desired: &TableSpec) -> BTreeMap<ScalingTarget, Throughput> {
    if !desired.is_provisioned() {
        return BTreeMap::new();
    }
    let indexes = desired
        .global_indexes
        .iter()
        .filter_map(|i| i.capacity.map(|c| (ScalingTarget::index(&i.name), c)));
    desired
        .throughput()
        .map(|t| (ScalingTarget::Table, t))
        .into_iter()
        .chain(indexes)
        .collect()
}

fn applied_capacity(updates: &[TableUpdate]) -> Vec<(ScalingTarget, Throughput)> {
    let mut applied = Vec::new();
    for update in updates {
        match update {
            TableUpdate::BillingMode {
                throughput,
                index_throughput,
                ..
            } => {
                applied.extend(throughput.map(|t| (ScalingTarget::Table, t)));
                applied.extend(
                    index_throughput
                        .iter()
                        .map(|(name, t)| (ScalingTarget::index(name), *t)),
                );
            }
            TableUpdate::Throughput { throughput } => {
                applied.push((ScalingTarget::Table, *throughput));
            }
            TableUpdate::IndexThroughput { index, throughput } => {
                applied.push((ScalingTarget::index(index), *throughput));
            }
            TableUpdate::CreateGlobalIndex { index, .. } => {
                applied.extend(index.capacity.map(|c| (ScalingTarget::index(&index.name), c)));
            }
            _ => {}
        }
    }
    applied
}

/// Drives a table from its observed state to a declaration.
///
/// Units run strictly in order and each must be observed as settled before
/// the next is submitted. The engine owns the planner, so the billing mode
/// cooldown ledger spans every run it performs, and it keeps the capacity it
/// last applied per table for drift suppression.
#[derive(Clone)]
pub struct ConvergenceEngine {
    provider: Arc<dyn TableProvider>,
    planner: Arc<Mutex<Planner>>,
    locks: ResourceLocks,
    capacity: Arc<Mutex<CapacityLedger>>,
    settings: EngineSettings,
}

impl ConvergenceEngine {
    pub fn new(provider: Arc<dyn TableProvider>, planner: Planner, settings: EngineSettings) -> Self {
        Self {
            provider,
            planner: Arc::new(Mutex::new(planner)),
            locks: ResourceLocks::new(),
            capacity: Arc::new(Mutex::new(HashMap::new())),
            settings,
        }
    }

    pub fn locks(&self) -> &ResourceLocks {
        &self.locks
    }

    /// Describes a table and merges in the capacity last applied to it.
    pub async fn snapshot(&self, name: &str) -> Result<Option<ObservedState>> {
        let Some(mut state) = self.provider.describe_table(name).await? else {
            return Ok(None);
        };
        if let Some(applied) = self.capacity.lock().await.get(name) {
            state
                .last_applied_capacity
                .extend(applied.iter().map(|(target, t)| (target.clone(), *t)));
        }
        Ok(Some(state))
    }

    /// Plans without applying. `existing` names the live table when the
    /// declaration does not carry a name.
    pub async fn plan(
        &self,
        desired: &TableSpec,
        existing: Option<&str>,
    ) -> Result<(Option<ObservedState>, Plan)> {
        let observed = match lookup_name(desired, existing) {
            Some(name) => self.snapshot(&name).await?,
            None => None,
        };
        let plan = self
            .planner
            .lock()
            .await
            .plan(observed.as_ref(), desired, Utc::now())?;
        Ok((observed, plan))
    }

    /// Converges the table towards `desired`.
    ///
    /// Errors raised before the first unit (a busy resource, a rejected plan,
    /// an invalid seed batch) are returned as `Err` and nothing is modified.
    /// Once units run, failures halt the run and are recorded on the report:
    /// earlier units stay applied, later ones are not attempted.
    ///
    /// The plan is computed once against the snapshot taken here and is not
    /// re-planned between units. Each unit waits for the table to settle
    /// before the next is submitted, and replica additions re-check the
    /// capacity management prerequisite on a fresh snapshot. Anything else
    /// that drifts during the run is picked up by the next run.
    pub async fn apply(
        &self,
        desired: &TableSpec,
        existing: Option<&str>,
        seed: Option<&SeedBatch>,
        cancel: &CancelHandle,
    ) -> Result<RunReport> {
        if let Some(seed) = seed {
            seed.check_keys(&desired.primary_key)?;
        }

        let lock_key = lookup_name(desired, existing)
            .unwrap_or_else(|| desired.display_name().to_string());
        let _guard = self.locks.try_acquire(&lock_key).await?;

        let (observed, plan) = self.plan(desired, existing).await?;
        let name = target_name(desired, observed.as_ref());
        let mut report = RunReport::pending(plan.clone());

        info!(resource = %plan.resource, table = %name, units = plan.units.len(), "Starting convergence run");

        for (position, unit) in plan.units.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(table = %name, unit = unit.index, "Run cancelled before unit");
                report.cancel_from(position);
                report.failure = Some(RunError::Cancelled(name.clone()));
                break;
            }

            info!(
                table = %name,
                unit = unit.index,
                kind = %unit.kind,
                operations = unit.operations.len(),
                "Applying unit"
            );
            match self.apply_unit(unit, desired, observed.as_ref(), &name).await {
                Ok(()) => report.set_outcome(position, UnitOutcome::Applied),
                Err(error) => {
                    warn!(table = %name, unit = unit.index, %error, "Unit failed, halting run");
                    report.set_outcome(
                        position,
                        UnitOutcome::Failed {
                            error: error.to_string(),
                        },
                    );
                    report.failure = Some(error);
                    break;
                }
            }
        }

        let created = plan
            .units
            .iter()
            .any(|u| matches!(u.kind, UnitKind::CreateTable | UnitKind::Replacement));
        if let (true, true, Some(seed)) = (report.is_success(), created, seed) {
            match self.write_seed(&name, seed).await {
                Ok(()) => report.seeded_items = seed.len(),
                Err(error) => {
                    warn!(table = %name, %error, "Seeding failed");
                    report.failure = Some(error);
                }
            }
        }

        match self.snapshot(&name).await {
            Ok(state) => report.final_state = state,
            Err(error) => {
                warn!(table = %name, %error, "Could not describe table after run");
                if report.failure.is_none() {
                    report.failure = Some(error);
                }
            }
        }

        if report.is_success() {
            info!(table = %name, units = report.units.len(), "Convergence run complete");
        }
        Ok(report)
    }

    async fn apply_unit(
        &self,
        unit: &ExecutionUnit,
        desired: &TableSpec,
        observed: Option<&ObservedState>,
        name: &str,
    ) -> Result<()> {
        match unit.kind {
            UnitKind::CreateTable => self.create_table(desired, name).await?,
            UnitKind::Replacement => {
                if let Some(old) = observed {
                    warn!(table = old.name(), "Replacing table, stored items are lost");
                    self.provider.delete_table(old.name()).await?;
                    self.wait_until(unit, old.name(), |state| state.is_none())
                        .await?;
                    self.capacity.lock().await.remove(old.name());
                }
                self.create_table(desired, name).await?;
            }
            UnitKind::PolicyRemoval | UnitKind::PolicyAttachment => {
                for op in unit.policy_operations() {
                    match op {
                        PolicyOperation::Put(policy) => {
                            self.provider.put_scaling_policy(name, policy).await?
                        }
                        PolicyOperation::Delete(policy) => {
                            self.provider
                                .delete_scaling_policy(name, &policy.target, policy.dimension)
                                .await?
                        }
                    }
                }
            }
            UnitKind::ReplicaRemoval | UnitKind::ReplicaAddition => {
                for op in unit.replica_operations() {
                    match op {
                        ReplicaOperation::Add { region } => {
                            self.check_replication_prerequisite(name, region).await?;
                            self.provider.create_replica(name, region).await?;
                        }
                        ReplicaOperation::Remove { region } => {
                            self.provider.delete_replica(name, region).await?;
                        }
                    }
                }
            }
            UnitKind::InPlace
            | UnitKind::BillingMode
            | UnitKind::GlobalIndex
            | UnitKind::TableClass => {
                let updates = table_updates(unit.table_changes(), desired);
                for update in &updates {
                    debug!(table = name, ?update, "Submitting table update");
                    self.provider.update_table(name, update).await?;
                }
                self.record_capacity(name, unit.kind, &updates).await;
                if unit.kind == UnitKind::BillingMode {
                    self.planner
                        .lock()
                        .await
                        .record_billing_change(name, Utc::now());
                }
            }
        }

        self.wait_until(unit, name, |state| state.is_some_and(ObservedState::is_settled))
            .await
    }

    async fn create_table(&self, desired: &TableSpec, name: &str) -> Result<()> {
        let mut spec = desired.clone();
        spec.name = Some(name.to_string());
        let state = self.provider.create_table(&spec).await?;
        info!(table = name, arn = %state.arn, "Table creation submitted");
        self.capacity
            .lock()
            .await
            .insert(name.to_string(), declared_capacity(desired));
        Ok(())
    }

    async fn record_capacity(&self, name: &str, kind: UnitKind, updates: &[TableUpdate]) {
        let applied = applied_capacity(updates);
        let mut ledger = self.capacity.lock().await;
        let entry = ledger.entry(name.to_string()).or_default();
        if kind == UnitKind::BillingMode {
            entry.clear();
        }
        entry.extend(applied);
    }

    /// Replicas are added only to an ACTIVE table whose capacity is managed.
    async fn check_replication_prerequisite(&self, name: &str, region: &str) -> Result<()> {
        let state = self.snapshot(name).await?;
        let ready = state.as_ref().is_some_and(|s| {
            s.status == TableStatus::Active && (!s.table.is_provisioned() || s.has_table_policy())
        });
        if ready {
            return Ok(());
        }
        Err(PlanError::ReplicationPrerequisite {
            resource: name.to_string(),
            regions: vec![region.to_string()],
            constraint: "table must be ACTIVE with table-level autoscaling in place".to_string(),
        }
        .into())
    }

    async fn write_seed(&self, name: &str, seed: &SeedBatch) -> Result<()> {
        for chunk in seed.chunks() {
            self.provider.put_items(name, chunk).await?;
        }
        info!(table = name, items = seed.len(), "Seed data written");
        Ok(())
    }

    /// Polls until `converged` holds for the described table, or the
    /// convergence timeout elapses.
    async fn wait_until(
        &self,
        unit: &ExecutionUnit,
        name: &str,
        converged: impl Fn(Option<&ObservedState>) -> bool,
    ) -> Result<()> {
        let started = Instant::now();
        loop {
            let state = self.provider.describe_table(name).await?;
            if converged(state.as_ref()) {
                debug!(table = name, unit = unit.index, waited = ?started.elapsed(), "Unit converged");
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= self.settings.convergence_timeout {
                return Err(RunError::ConvergenceTimeout {
                    resource: name.to_string(),
                    unit: unit.index,
                    waited,
                });
            }
            debug!(
                table = name,
                unit = unit.index,
                status = ?state.as_ref().map(|s| s.status),
                "Waiting for convergence"
            );
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}
