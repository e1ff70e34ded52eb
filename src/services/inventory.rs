use crate::config::{Config, LedgerPolicy};
use crate::db::DbResult;
use crate::db::repo::{InventoryStore, InventoryTxn};
use crate::engine::{self, Changes, ConsumeRequest, RewardTarget, list};
use crate::error::{AppResult, DomainError};
use crate::models::catalog::Catalog;
use crate::models::inventory::{Inventory, ItemProperties, OwnedItem};
use crate::models::reward::{RewardContext, RewardList};
use crate::models::types::{InstanceId, ItemKey, PlayerId};
use crate::services::reward::RewardSource;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const RETRY_BACKOFF_MS: u64 = 25;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrantOutcome {
    /// Changed rows, or the whole inventory when requested
    pub items: Inventory,
    /// Units actually added per item id
    pub applied: BTreeMap<ItemKey, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumeOutcome {
    pub items: Inventory,
    pub consumed: BTreeMap<ItemKey, u64>,
    pub consumed_instances: Vec<InstanceId>,
    /// Reward results by item id (item-id entries)
    pub rewards: BTreeMap<ItemKey, RewardList>,
    /// Reward results by instance id (instance entries)
    pub instance_rewards: BTreeMap<InstanceId, RewardList>,
}

pub struct InventoryService {
    store: Arc<dyn InventoryStore>,
    catalog: Arc<Catalog>,
    rewards: Arc<dyn RewardSource>,
    policy: LedgerPolicy,
    operation_timeout: Duration,
    max_txn_retries: u32,
}

impl InventoryService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        catalog: Arc<Catalog>,
        rewards: Arc<dyn RewardSource>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            catalog,
            rewards,
            policy: config.policy(),
            operation_timeout: config.operation_timeout(),
            max_txn_retries: config.max_txn_retries,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    // ========================================================================
    // LISTING
    // ========================================================================

    /// Every catalog item in the category, owned or not
    pub fn list_catalog(&self, category: &str) -> Inventory {
        list::catalog_view(&self.catalog, category)
    }

    /// What the player owns in the category
    #[tracing::instrument(skip(self), fields(player = %player_id))]
    pub async fn list_owned(&self, player_id: PlayerId, category: &str) -> AppResult<Inventory> {
        self.run("list_owned", || async move {
            let mut txn = self.store.begin().await?;
            let rows = txn.list_owned(player_id).await?;
            txn.rollback().await?;
            Ok(list::owned_view(&self.catalog, &rows, category))
        })
        .await
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    #[tracing::instrument(skip(self, items), fields(player = %player_id, entries = items.len()))]
    pub async fn grant(
        &self,
        player_id: PlayerId,
        items: &HashMap<ItemKey, i64>,
        full_inventory: bool,
    ) -> AppResult<GrantOutcome> {
        engine::grant::validate(&self.catalog, items)?;

        self.run("grant", || async move {
            let mut txn = self.store.begin().await?;
            let keys: Vec<ItemKey> = items.keys().cloned().collect();
            let current = txn.get_owned(player_id, &keys).await?;

            let plan = engine::grant::plan(&self.catalog, &self.policy, &current, items, Utc::now(), InstanceId::new)?;
            apply(txn.as_mut(), player_id, &plan.changes).await?;

            let view = self.view(txn.as_mut(), player_id, &plan.changes.upserts, full_inventory).await?;
            txn.commit().await?;

            tracing::info!(applied = ?plan.applied, rows = plan.changes.upserts.len(), "grant committed");
            Ok(GrantOutcome {
                items: view,
                applied: plan.applied,
            })
        })
        .await
    }

    #[tracing::instrument(
        skip(self, request),
        fields(player = %player_id, items = request.items.len(), instances = request.instances.len())
    )]
    pub async fn consume(
        &self,
        player_id: PlayerId,
        request: &ConsumeRequest,
        full_inventory: bool,
    ) -> AppResult<ConsumeOutcome> {
        engine::consume::validate(&self.catalog, request)?;

        self.run("consume", || async move {
            let mut txn = self.store.begin().await?;
            let mut rows = txn.get_owned(player_id, &request.item_keys()).await?;
            for row in txn.get_instances(player_id, &request.instance_ids()).await? {
                if !rows.iter().any(|r| r.is_instance() && r.instance_id() == row.instance_id()) {
                    rows.push(row);
                }
            }

            let plan = engine::consume::plan(&self.catalog, &self.policy, &rows, request, Utc::now())?;
            apply(txn.as_mut(), player_id, &plan.changes).await?;

            // Rolled before commit, handed out only once the commit went through
            let mut rewards = BTreeMap::new();
            let mut instance_rewards = BTreeMap::new();
            for roll in &plan.rewards {
                let instance_id = match &roll.target {
                    RewardTarget::Instance(id) => Some(*id),
                    RewardTarget::Item(_) => None,
                };
                let ctx = RewardContext {
                    player_id,
                    item_id: roll.item_id.clone(),
                    instance_id,
                    amount: roll.amount,
                };
                let list = self.rewards.roll(&roll.reward_ref, &ctx)?;
                match &roll.target {
                    RewardTarget::Item(item_id) => rewards.insert(item_id.clone(), list),
                    RewardTarget::Instance(id) => instance_rewards.insert(*id, list),
                };
            }

            let view = self.view(txn.as_mut(), player_id, &plan.changed, full_inventory).await?;
            txn.commit().await?;

            tracing::info!(
                consumed = ?plan.consumed,
                instances = plan.consumed_instances.len(),
                rewards = plan.rewards.len(),
                "consume committed"
            );
            Ok(ConsumeOutcome {
                items: view,
                consumed: plan.consumed,
                consumed_instances: plan.consumed_instances,
                rewards,
                instance_rewards,
            })
        })
        .await
    }

    /// Merge property updates into instances the player owns. Keys are instance
    /// ids as sent by clients.
    #[tracing::instrument(skip(self, updates), fields(player = %player_id, instances = updates.len()))]
    pub async fn update_properties(
        &self,
        player_id: PlayerId,
        updates: &HashMap<String, ItemProperties>,
        full_inventory: bool,
    ) -> AppResult<Inventory> {
        let updates = parse_instance_keys("instances", updates)?;
        let ids: Vec<InstanceId> = updates.keys().copied().collect();
        let (updates, ids) = (&updates, &ids);

        self.run("update_properties", || async move {
            let mut txn = self.store.begin().await?;
            let rows = txn.get_instances(player_id, ids).await?;

            let plan = engine::properties::plan(&rows, updates, Utc::now())?;
            apply(txn.as_mut(), player_id, &plan.changes).await?;

            let view = self.view(txn.as_mut(), player_id, &plan.changes.upserts, full_inventory).await?;
            txn.commit().await?;

            tracing::info!(rows = plan.changes.upserts.len(), "properties updated");
            Ok(view)
        })
        .await
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    async fn view(
        &self,
        txn: &mut dyn InventoryTxn,
        player_id: PlayerId,
        changed: &[OwnedItem],
        full_inventory: bool,
    ) -> DbResult<Inventory> {
        if full_inventory {
            let rows = txn.list_owned(player_id).await?;
            Ok(list::owned_view(&self.catalog, &rows, ""))
        } else {
            Ok(list::view_of(&self.catalog, changed))
        }
    }

    /// Run one operation under the operation deadline, restarting it on
    /// transaction conflicts. A dropped attempt rolls its transaction back.
    async fn run<T, F, Fut>(&self, op: &'static str, attempt: F) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let retries = async {
            let mut tries = 0u32;
            loop {
                match attempt().await {
                    Err(DomainError::Db(e)) if e.is_conflict() && tries < self.max_txn_retries => {
                        tries += 1;
                        let delay = rand::rng().random_range(0..=RETRY_BACKOFF_MS * tries as u64);
                        tracing::warn!(op, tries, error = %e, delay_ms = delay, "transaction conflict, retrying");
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    Err(e) => {
                        if e.code().is_retryable() {
                            tracing::warn!(op, error = %e, "operation failed, caller may retry");
                        }
                        return Err(e);
                    }
                    Ok(v) => return Ok(v),
                }
            }
        };

        match tokio::time::timeout(self.operation_timeout, retries).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op, timeout = ?self.operation_timeout, "operation deadline exceeded");
                Err(DomainError::Timeout)
            }
        }
    }
}

/// Write a plan's changes. Deletes go first so a pruned row never collides with an upsert.
async fn apply(txn: &mut dyn InventoryTxn, player_id: PlayerId, changes: &Changes) -> DbResult<()> {
    if !changes.deleted_instances.is_empty() {
        txn.delete_instances(player_id, &changes.deleted_instances).await?;
    }
    if !changes.deleted_stacks.is_empty() {
        txn.delete_stacks(player_id, &changes.deleted_stacks).await?;
    }
    if !changes.upserts.is_empty() {
        txn.upsert(player_id, &changes.upserts).await?;
    }
    Ok(())
}

/// Instance ids arrive as strings in request maps
pub fn parse_instance_keys<V: Clone>(
    field: &'static str,
    map: &HashMap<String, V>,
) -> AppResult<HashMap<InstanceId, V>> {
    map.iter()
        .map(|(k, v)| {
            let id = k.parse::<InstanceId>().map_err(|e| DomainError::Validation {
                field,
                message: format!("invalid instance id {k:?}: {e}"),
            })?;
            Ok((id, v.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::MemoryInventoryStore;
    use crate::engine::fixtures;
    use crate::error::ErrorCode;
    use crate::services::reward::NoRewards;

    fn service() -> InventoryService {
        let config = Config::default();
        InventoryService::new(
            Arc::new(MemoryInventoryStore::new(config.lock_timeout())),
            Arc::new(fixtures::catalog()),
            Arc::new(NoRewards),
            &config,
        )
    }

    fn items(entries: &[(&str, i64)]) -> HashMap<ItemKey, i64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[tokio::test]
    async fn grant_then_list_owned() {
        let svc = service();
        let player = PlayerId::new();

        let out = svc.grant(player, &items(&[("potion", 3), ("sword", 2)]), false).await.unwrap();
        assert_eq!(out.items.len(), 3);
        assert_eq!(out.applied["sword"], 2);

        let owned = svc.list_owned(player, "").await.unwrap();
        assert_eq!(owned.get("potion").unwrap().count, 3);
        assert_eq!(owned.by_item("sword").count(), 2);

        // other players see nothing
        assert!(svc.list_owned(PlayerId::new(), "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_inventory_flag_returns_everything() {
        let svc = service();
        let player = PlayerId::new();
        svc.grant(player, &items(&[("potion", 3)]), false).await.unwrap();

        let out = svc.grant(player, &items(&[("arrow", 1)]), true).await.unwrap();
        assert_eq!(out.items.len(), 2);
    }

    #[tokio::test]
    async fn bad_instance_key_is_invalid_argument() {
        let svc = service();
        let updates = HashMap::from([("not-a-uuid".to_string(), ItemProperties::default())]);
        let err = svc.update_properties(PlayerId::new(), &updates, false).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn list_catalog_needs_no_store() {
        let svc = service();
        assert_eq!(svc.list_catalog("weapons").len(), 2);
    }
}
