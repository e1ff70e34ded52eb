#![allow(dead_code)]

use inventory_ledger::Registry;
use inventory_ledger::config::{Config, StoreKind};
use inventory_ledger::db::DbResult;
use inventory_ledger::db::error::DbError;
use inventory_ledger::db::repo::{InventoryStore, InventoryTxn, MemoryInventoryStore};
use inventory_ledger::import_catalog::{LoadedCatalog, parse_catalog};
use inventory_ledger::models::inventory::OwnedItem;
use inventory_ledger::models::types::{InstanceId, ItemKey, PlayerId};
use inventory_ledger::services::{RewardSource, TableRewards};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub const CATALOG: &str = r#"
items:
  potion:
    name: item.potion.name
    category: consumables
    stackable: true
    consume_reward: potion_bonus
  arrow:
    name: item.arrow.name
    category: ammo
    stackable: true
    max_count: 50
  sword:
    name: item.sword.name
    category: weapons
    consume_reward: salvage
  shield:
    name: item.shield.name
    category: weapons
    max_count: 2
  medal:
    name: item.medal.name
    category: trophies
    stackable: true
    consumable: false

reward_tables:
  potion_bonus:
    entries:
      - weight: 1
        reward: { kind: currency, currency: gold, amount: 2 }
  salvage:
    rolls: 2
    entries:
      - weight: 1
        reward: { kind: currency, currency: scrap, amount: 1 }
"#;

pub fn catalog() -> LoadedCatalog {
    parse_catalog(CATALOG).expect("test catalog is valid")
}

pub fn config() -> Config {
    Config {
        store: StoreKind::Memory,
        lock_timeout_ms: 2_000,
        operation_timeout_ms: 5_000,
        reward_seed: Some(1),
        ..Config::default()
    }
}

pub fn registry_with(config: Config, wrap: impl FnOnce(Arc<dyn InventoryStore>) -> Arc<dyn InventoryStore>) -> Registry {
    let loaded = catalog();
    let rewards: Arc<dyn RewardSource> = Arc::new(
        TableRewards::new(loaded.reward_tables, config.reward_seed).with_max_picks(config.max_reward_picks),
    );
    let store: Arc<dyn InventoryStore> = Arc::new(MemoryInventoryStore::new(config.lock_timeout()));
    Registry::new(wrap(store), Arc::new(loaded.catalog), rewards, Arc::new(config))
}

pub fn registry() -> Registry {
    registry_with(config(), |s| s)
}

pub fn items(entries: &[(&str, i64)]) -> std::collections::HashMap<ItemKey, i64> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// What should go wrong at commit time
#[derive(Clone, Copy)]
pub enum CommitFault {
    /// Every commit fails as if the store went away
    Always,
    /// The first `n` commits hit a serialization conflict
    ConflictTimes(u32),
}

/// Store wrapper that injects commit failures
pub struct FaultyStore {
    pub inner: Arc<dyn InventoryStore>,
    pub fault: CommitFault,
    pub commits_seen: Arc<AtomicU32>,
}

impl FaultyStore {
    pub fn wrap(inner: Arc<dyn InventoryStore>, fault: CommitFault) -> Self {
        Self {
            inner,
            fault,
            commits_seen: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait::async_trait]
impl InventoryStore for FaultyStore {
    async fn begin(&self) -> DbResult<Box<dyn InventoryTxn>> {
        Ok(Box::new(FaultyTxn {
            inner: self.inner.begin().await?,
            fault: self.fault,
            commits_seen: self.commits_seen.clone(),
        }))
    }
}

struct FaultyTxn {
    inner: Box<dyn InventoryTxn>,
    fault: CommitFault,
    commits_seen: Arc<AtomicU32>,
}

#[async_trait::async_trait]
impl InventoryTxn for FaultyTxn {
    async fn get_owned(&mut self, player_id: PlayerId, item_ids: &[ItemKey]) -> DbResult<Vec<OwnedItem>> {
        self.inner.get_owned(player_id, item_ids).await
    }

    async fn get_instances(&mut self, player_id: PlayerId, instance_ids: &[InstanceId]) -> DbResult<Vec<OwnedItem>> {
        self.inner.get_instances(player_id, instance_ids).await
    }

    async fn list_owned(&mut self, player_id: PlayerId) -> DbResult<Vec<OwnedItem>> {
        self.inner.list_owned(player_id).await
    }

    async fn upsert(&mut self, player_id: PlayerId, rows: &[OwnedItem]) -> DbResult<()> {
        self.inner.upsert(player_id, rows).await
    }

    async fn delete_instances(&mut self, player_id: PlayerId, instance_ids: &[InstanceId]) -> DbResult<()> {
        self.inner.delete_instances(player_id, instance_ids).await
    }

    async fn delete_stacks(&mut self, player_id: PlayerId, item_ids: &[ItemKey]) -> DbResult<()> {
        self.inner.delete_stacks(player_id, item_ids).await
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        let seen = self.commits_seen.fetch_add(1, Ordering::SeqCst) + 1;
        match self.fault {
            CommitFault::Always => {
                self.inner.rollback().await?;
                Err(DbError::Unavailable("injected commit failure".into()))
            }
            CommitFault::ConflictTimes(n) if seen <= n => {
                self.inner.rollback().await?;
                Err(DbError::Conflict("40001".into()))
            }
            CommitFault::ConflictTimes(_) => self.inner.commit().await,
        }
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        self.inner.rollback().await
    }
}
