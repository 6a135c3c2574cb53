//! In-memory table provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use tablesync_core::autoscaling::{AutoscalingPolicy, ScalingDimension, ScalingTarget};
use tablesync_core::provider::{ProviderError, Result, TableProvider, TableUpdate};
use tablesync_core::schema::{BillingMode, TableSpec, TimeToLive};
use tablesync_core::seed::Item;
use tablesync_core::state::{IndexStatus, ObservedState, ReplicaPhase, ReplicaStatus, TableStatus};

/// Describe calls a table stays busy after a mutation, unless configured.
const DEFAULT_SETTLE_AFTER: u32 = 2;

#[derive(Debug, Clone)]
struct SimulatedTable {
    state: ObservedState,
    /// Describe calls left before the pending mutation completes.
    pending: u32,
    items: Vec<Item>,
}

impl SimulatedTable {
    fn ensure_active(&self) -> Result<()> {
        if self.state.status == TableStatus::Active {
            Ok(())
        } else {
            Err(self.rejected(format!(
                "table is {:?}, expected ACTIVE",
                self.state.status
            )))
        }
    }

    /// Updates are accepted while the table is ACTIVE or already UPDATING.
    fn ensure_available(&self) -> Result<()> {
        match self.state.status {
            TableStatus::Active | TableStatus::Updating => Ok(()),
            status => Err(self.rejected(format!("table is {status:?}"))),
        }
    }

    fn rejected(&self, reason: impl Into<String>) -> ProviderError {
        ProviderError::Rejected {
            resource: self.state.name().to_string(),
            reason: reason.into(),
        }
    }

    fn mark_busy(&mut self, status: TableStatus, settle_after: u32) {
        self.state.status = status;
        self.pending = settle_after.max(1);
    }

    /// Advances the simulation by one observation. Returns false once a
    /// deleted table is gone.
    fn tick(&mut self) -> bool {
        if self.pending > 0 {
            self.pending -= 1;
            if self.pending == 0 {
                if self.state.status == TableStatus::Deleting {
                    return false;
                }
                self.state.status = TableStatus::Active;
                self.state
                    .index_status
                    .retain(|_, status| *status != IndexStatus::Deleting);
                for status in self.state.index_status.values_mut() {
                    *status = IndexStatus::Active;
                }
            }
            return true;
        }
        for replica in &mut self.state.replicas {
            if let Some(next) = replica.phase.next() {
                tracing::debug!(region = %replica.region, from = %replica.phase, to = %next, "Replica advanced");
                replica.phase = next;
            }
        }
        true
    }

    /// Applies an update to the live configuration, or returns why it is
    /// refused.
    fn apply(&mut self, update: &TableUpdate) -> std::result::Result<(), String> {
        let table = &mut self.state.table;
        match update {
            TableUpdate::BillingMode {
                billing_mode,
                throughput,
                index_throughput,
            } => {
                table.billing_mode = *billing_mode;
                table.read_capacity = throughput.map(|t| t.read);
                table.write_capacity = throughput.map(|t| t.write);
                for index in &mut table.global_indexes {
                    index.capacity = index_throughput.get(&index.name).copied();
                }
                self.state.billing_mode_updated_at = Some(Utc::now());
            }
            TableUpdate::Throughput { throughput } => {
                if table.billing_mode != BillingMode::Provisioned {
                    return Err("throughput requires PROVISIONED billing".to_string());
                }
                table.read_capacity = Some(throughput.read);
                table.write_capacity = Some(throughput.write);
            }
            TableUpdate::IndexThroughput { index, throughput } => {
                let Some(target) = table.global_indexes.iter_mut().find(|i| &i.name == index) else {
                    return Err(format!("index '{index}' does not exist"));
                };
                target.capacity = Some(*throughput);
                self.state
                    .index_status
                    .insert(index.clone(), IndexStatus::Updating);
            }
            TableUpdate::CreateGlobalIndex { index, attributes } => {
                if table.global_index(&index.name).is_some() {
                    return Err(format!("index '{}' already exists", index.name));
                }
                table.attributes.extend(attributes.iter().cloned());
                table.global_indexes.push(index.clone());
                self.state
                    .index_status
                    .insert(index.name.clone(), IndexStatus::Creating);
            }
            TableUpdate::DeleteGlobalIndex { index } => {
                table.global_indexes.retain(|i| &i.name != index);
                let target = ScalingTarget::index(index);
                self.state.policies.retain(|p| p.target != target);
                self.state
                    .index_status
                    .insert(index.clone(), IndexStatus::Deleting);
            }
            TableUpdate::Stream { enabled, view_type } => {
                table.stream_enabled = *enabled;
                table.stream_view_type = *view_type;
            }
            TableUpdate::TimeToLive { attribute_name } => {
                table.ttl = attribute_name.as_ref().map(|name| TimeToLive {
                    enabled: true,
                    attribute_name: name.clone(),
                });
            }
            TableUpdate::PointInTimeRecovery { enabled } => {
                table.point_in_time_recovery = *enabled;
            }
            TableUpdate::TableClass { table_class } => {
                table.table_class = *table_class;
            }
            TableUpdate::Tags { set, remove } => {
                table.tags.extend(set.clone());
                for key in remove {
                    table.tags.remove(key);
                }
            }
        }
        Ok(())
    }
}

/// In-memory stand-in for the target system.
///
/// Mutations are accepted immediately and complete after a fixed number of
/// `describe_table` calls, so callers observe the same CREATING/UPDATING to
/// ACTIVE progression a remote system reports. Replicas advance one phase
/// per describe once the table itself is ACTIVE.
#[derive(Debug, Clone)]
pub struct InMemoryProvider {
    tables: Arc<RwLock<HashMap<String, SimulatedTable>>>,
    settle_after: u32,
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProvider {
    /// Creates a provider with no tables.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            settle_after: DEFAULT_SETTLE_AFTER,
        }
    }

    /// Creates a provider already holding the given tables.
    pub fn with_tables(tables: impl IntoIterator<Item = ObservedState>) -> Self {
        let tables = tables
            .into_iter()
            .map(|state| {
                let table = SimulatedTable {
                    state,
                    pending: 0,
                    items: Vec::new(),
                };
                (table.state.name().to_string(), table)
            })
            .collect();
        Self {
            tables: Arc::new(RwLock::new(tables)),
            settle_after: DEFAULT_SETTLE_AFTER,
        }
    }

    /// Sets how many describe calls a mutation takes to complete.
    /// `u32::MAX` keeps mutated tables busy indefinitely.
    pub fn with_settle_after(mut self, describes: u32) -> Self {
        self.settle_after = describes;
        self
    }

    /// Current state of every table, without advancing the simulation.
    #[cfg(test)]
    pub async fn tables(&self) -> Vec<ObservedState> {
        let tables = self.tables.read().await;
        let mut states: Vec<_> = tables.values().map(|t| t.state.clone()).collect();
        states.sort_by(|a, b| a.name().cmp(b.name()));
        states
    }

    /// Number of items stored in a table.
    #[cfg(test)]
    pub async fn item_count(&self, name: &str) -> usize {
        let tables = self.tables.read().await;
        tables.get(name).map_or(0, |t| t.items.len())
    }

    async fn with_table<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut SimulatedTable, u32) -> Result<T>,
    ) -> Result<T> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(name)
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))?;
        f(table, self.settle_after)
    }
}

#[async_trait]
impl TableProvider for InMemoryProvider {
    async fn describe_table(&self, name: &str) -> Result<Option<ObservedState>> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(name) else {
            return Ok(None);
        };
        if !table.tick() {
            tables.remove(name);
            tracing::debug!(table = name, "Table deleted");
            return Ok(None);
        }
        Ok(Some(table.state.clone()))
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<ObservedState> {
        let Some(name) = spec.name.clone() else {
            return Err(ProviderError::Rejected {
                resource: spec.display_name().to_string(),
                reason: "table name is required".to_string(),
            });
        };

        let mut tables = self.tables.write().await;
        if tables.contains_key(&name) {
            return Err(ProviderError::Rejected {
                resource: name,
                reason: "table already exists".to_string(),
            });
        }

        let mut table = spec.clone();
        table.replica_regions.clear();
        table.autoscaling = None;
        let mut state = ObservedState::active(
            format!("arn:tablesync:local:{}:table/{}", Uuid::new_v4().simple(), name),
            table,
        );
        for status in state.index_status.values_mut() {
            *status = IndexStatus::Creating;
        }

        let mut simulated = SimulatedTable {
            state,
            pending: 0,
            items: Vec::new(),
        };
        simulated.mark_busy(TableStatus::Creating, self.settle_after);
        let state = simulated.state.clone();
        tables.insert(name.clone(), simulated);

        tracing::info!(table = %name, arn = %state.arn, "Table creation accepted");
        Ok(state)
    }

    async fn delete_table(&self, name: &str) -> Result<()> {
        self.with_table(name, |table, settle_after| {
            table.mark_busy(TableStatus::Deleting, settle_after);
            Ok(())
        })
        .await
    }

    async fn update_table(&self, name: &str, update: &TableUpdate) -> Result<()> {
        self.with_table(name, |table, settle_after| {
            table.ensure_available()?;
            table.apply(update).map_err(|reason| table.rejected(reason))?;
            table.mark_busy(TableStatus::Updating, settle_after);
            Ok(())
        })
        .await
    }

    async fn put_scaling_policy(&self, name: &str, policy: &AutoscalingPolicy) -> Result<()> {
        self.with_table(name, |table, _| {
            if let ScalingTarget::Index(index) = &policy.target {
                if table.state.table.global_index(index).is_none() {
                    return Err(table.rejected(format!("index '{index}' does not exist")));
                }
            }
            if table.state.table.billing_mode != BillingMode::Provisioned {
                return Err(table.rejected("scaling policies require PROVISIONED billing"));
            }
            let policies = &mut table.state.policies;
            policies.retain(|p| p.key() != policy.key());
            policies.push(policy.clone());
            Ok(())
        })
        .await
    }

    async fn delete_scaling_policy(
        &self,
        name: &str,
        target: &ScalingTarget,
        dimension: ScalingDimension,
    ) -> Result<()> {
        self.with_table(name, |table, _| {
            table
                .state
                .policies
                .retain(|p| !(&p.target == target && p.dimension == dimension));
            Ok(())
        })
        .await
    }

    async fn create_replica(&self, name: &str, region: &str) -> Result<()> {
        self.with_table(name, |table, settle_after| {
            table.ensure_active()?;
            if table.state.table.is_provisioned() && !table.state.has_table_policy() {
                return Err(table.rejected("replicas of a PROVISIONED table need table autoscaling"));
            }
            if table.state.replica(region).is_some() {
                return Err(table.rejected(format!("replica in {region} already exists")));
            }
            table.state.table.replica_regions.insert(region.to_string());
            table.state.replicas.push(ReplicaStatus {
                region: region.to_string(),
                phase: ReplicaPhase::Pending,
            });
            table.mark_busy(TableStatus::Updating, settle_after);
            Ok(())
        })
        .await
    }

    async fn delete_replica(&self, name: &str, region: &str) -> Result<()> {
        self.with_table(name, |table, settle_after| {
            table.ensure_active()?;
            table.state.table.replica_regions.remove(region);
            table.state.replicas.retain(|r| r.region != region);
            table.mark_busy(TableStatus::Updating, settle_after);
            Ok(())
        })
        .await
    }

    async fn put_items(&self, name: &str, items: &[Item]) -> Result<()> {
        self.with_table(name, |table, _| {
            table.items.extend(items.iter().cloned());
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablesync_core::schema::{AttributeType, GlobalIndex, StreamViewType, Throughput};

    fn events() -> TableSpec {
        TableSpec::new("events", "userId")
    }

    async fn settle(provider: &InMemoryProvider, name: &str) -> ObservedState {
        loop {
            let state = provider.describe_table(name).await.unwrap().unwrap();
            if state.is_settled() {
                return state;
            }
        }
    }

    #[tokio::test]
    async fn test_describe_missing_table() {
        let provider = InMemoryProvider::new();
        assert!(provider.describe_table("events").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_created_table_becomes_active_after_describes() {
        let provider = InMemoryProvider::new().with_settle_after(2);
        let created = provider.create_table(&events()).await.unwrap();
        assert_eq!(created.status, TableStatus::Creating);

        let first = provider.describe_table("events").await.unwrap().unwrap();
        assert_eq!(first.status, TableStatus::Creating);
        let second = provider.describe_table("events").await.unwrap().unwrap();
        assert_eq!(second.status, TableStatus::Active);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_unnamed_tables() {
        let provider = InMemoryProvider::new();
        provider.create_table(&events()).await.unwrap();

        assert!(matches!(
            provider.create_table(&events()).await,
            Err(ProviderError::Rejected { .. })
        ));

        let mut unnamed = events();
        unnamed.name = None;
        assert!(provider.create_table(&unnamed).await.is_err());
    }

    #[tokio::test]
    async fn test_update_rejected_while_busy() {
        let provider = InMemoryProvider::new();
        provider.create_table(&events()).await.unwrap();

        let result = provider
            .update_table("events", &TableUpdate::PointInTimeRecovery { enabled: true })
            .await;

        assert!(matches!(result, Err(ProviderError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_index_lifecycle() {
        let provider = InMemoryProvider::new().with_settle_after(1);
        provider.create_table(&events()).await.unwrap();
        settle(&provider, "events").await;

        let index = GlobalIndex::new("by_device", "deviceId");
        provider
            .update_table(
                "events",
                &TableUpdate::CreateGlobalIndex {
                    index,
                    attributes: vec![tablesync_core::schema::AttributeDefinition::new(
                        "deviceId",
                        AttributeType::String,
                    )],
                },
            )
            .await
            .unwrap();
        let state = settle(&provider, "events").await;
        assert!(state.table.global_index("by_device").is_some());

        provider
            .update_table(
                "events",
                &TableUpdate::DeleteGlobalIndex {
                    index: "by_device".to_string(),
                },
            )
            .await
            .unwrap();
        let state = settle(&provider, "events").await;
        assert!(state.table.global_index("by_device").is_none());
        assert!(state.index_status.is_empty());
    }

    #[tokio::test]
    async fn test_deleting_an_index_drops_its_policies() {
        let table = events()
            .provisioned(5, 5)
            .with_global_index(GlobalIndex::new("by_user", "userId").with_capacity(1, 1));
        let provider = InMemoryProvider::with_tables([ObservedState::active("arn", table)]);
        for target in [ScalingTarget::Table, ScalingTarget::index("by_user")] {
            provider
                .put_scaling_policy(
                    "events",
                    &AutoscalingPolicy {
                        target,
                        dimension: ScalingDimension::Read,
                        min_capacity: 1,
                        max_capacity: 10,
                        target_utilization_percent: 70,
                    },
                )
                .await
                .unwrap();
        }

        provider
            .update_table(
                "events",
                &TableUpdate::DeleteGlobalIndex {
                    index: "by_user".to_string(),
                },
            )
            .await
            .unwrap();

        let state = settle(&provider, "events").await;
        assert_eq!(state.policies.len(), 1);
        assert_eq!(state.policies[0].target, ScalingTarget::Table);
    }

    #[tokio::test]
    async fn test_billing_mode_change_is_timestamped() {
        let provider = InMemoryProvider::with_tables([ObservedState::active("arn", events())]);

        provider
            .update_table(
                "events",
                &TableUpdate::BillingMode {
                    billing_mode: BillingMode::Provisioned,
                    throughput: Some(Throughput::new(5, 2)),
                    index_throughput: Default::default(),
                },
            )
            .await
            .unwrap();

        let state = settle(&provider, "events").await;
        assert_eq!(state.table.throughput(), Some(Throughput::new(5, 2)));
        assert!(state.billing_mode_updated_at.is_some());
    }

    #[tokio::test]
    async fn test_replica_walks_through_every_phase() {
        let table = events().with_stream(StreamViewType::NewAndOldImages);
        let provider =
            InMemoryProvider::with_tables([ObservedState::active("arn", table)]).with_settle_after(1);

        provider.create_replica("events", "eu-west-1").await.unwrap();

        let mut phases = Vec::new();
        loop {
            let state = provider.describe_table("events").await.unwrap().unwrap();
            let phase = state.replica("eu-west-1").unwrap().phase;
            if phases.last() != Some(&phase) {
                phases.push(phase);
            }
            if phase == ReplicaPhase::Active {
                break;
            }
        }
        assert_eq!(
            phases,
            vec![
                ReplicaPhase::Pending,
                ReplicaPhase::StreamingEnabled,
                ReplicaPhase::Replicating,
                ReplicaPhase::Active,
            ]
        );
    }

    #[tokio::test]
    async fn test_replica_on_unmanaged_provisioned_table_is_rejected() {
        let table = events().provisioned(5, 5);
        let provider = InMemoryProvider::with_tables([ObservedState::active("arn", table)]);

        let result = provider.create_replica("events", "eu-west-1").await;

        assert!(matches!(result, Err(ProviderError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_deleted_table_disappears() {
        let provider = InMemoryProvider::with_tables([ObservedState::active("arn", events())])
            .with_settle_after(1);

        provider.delete_table("events").await.unwrap();

        assert!(provider.describe_table("events").await.unwrap().is_none());
        assert!(provider.tables().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_table_mutations_are_not_found() {
        let provider = InMemoryProvider::new();
        assert_eq!(
            provider.put_items("events", &[]).await,
            Err(ProviderError::NotFound("events".to_string()))
        );
    }
}
