use crate::db::error::DbError;
use crate::db::repo::inventory::{InventoryStore, InventoryTxn};
use crate::db::DbResult;
use crate::models::inventory::OwnedItem;
use crate::models::types::{InstanceId, ItemKey, PlayerId};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Ephemeral store for tests and local play. One lock per player is held from
/// the first read until the transaction finishes.
pub struct MemoryInventoryStore {
    players: Arc<DashMap<PlayerId, Arc<Mutex<PlayerRows>>>>,
    lock_timeout: Duration,
}

impl MemoryInventoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            players: Arc::new(DashMap::new()),
            lock_timeout,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct PlayerRows {
    stacks: HashMap<ItemKey, OwnedItem>,
    instances: HashMap<InstanceId, OwnedItem>,
}

impl PlayerRows {
    fn all(&self) -> Vec<OwnedItem> {
        let mut rows: Vec<OwnedItem> = self.stacks.values().chain(self.instances.values()).cloned().collect();
        rows.sort_by(|a, b| {
            (&a.item_id, a.owned_at, a.instance_id()).cmp(&(&b.item_id, b.owned_at, b.instance_id()))
        });
        rows
    }
}

#[async_trait::async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn begin(&self) -> DbResult<Box<dyn InventoryTxn>> {
        Ok(Box::new(MemTxn {
            players: self.players.clone(),
            lock_timeout: self.lock_timeout,
            bound: None,
        }))
    }
}

struct Bound {
    player_id: PlayerId,
    guard: OwnedMutexGuard<PlayerRows>,
    // staged copy, published on commit
    work: PlayerRows,
}

struct MemTxn {
    players: Arc<DashMap<PlayerId, Arc<Mutex<PlayerRows>>>>,
    lock_timeout: Duration,
    bound: Option<Bound>,
}

impl MemTxn {
    async fn rows(&mut self, player_id: PlayerId) -> DbResult<&mut PlayerRows> {
        if self.bound.is_none() {
            // shard guard must be released before awaiting the player lock
            let cell = self.players.entry(player_id).or_default().value().clone();
            let guard = tokio::time::timeout(self.lock_timeout, cell.lock_owned())
                .await
                .map_err(|_| DbError::LockTimeout)?;
            let work = (*guard).clone();
            self.bound = Some(Bound { player_id, guard, work });
        }

        match self.bound.as_mut() {
            Some(b) if b.player_id == player_id => Ok(&mut b.work),
            Some(b) => Err(DbError::Validation(format!(
                "transaction bound to player {}, not {}",
                b.player_id, player_id
            ))),
            None => Err(DbError::Validation("transaction not bound".into())),
        }
    }
}

#[async_trait::async_trait]
impl InventoryTxn for MemTxn {
    async fn get_owned(&mut self, player_id: PlayerId, item_ids: &[ItemKey]) -> DbResult<Vec<OwnedItem>> {
        let rows = self.rows(player_id).await?;
        Ok(rows
            .all()
            .into_iter()
            .filter(|r| item_ids.contains(&r.item_id))
            .collect())
    }

    async fn get_instances(&mut self, player_id: PlayerId, instance_ids: &[InstanceId]) -> DbResult<Vec<OwnedItem>> {
        let rows = self.rows(player_id).await?;
        let mut found: Vec<OwnedItem> = instance_ids
            .iter()
            .filter_map(|id| rows.instances.get(id).cloned())
            .collect();
        found.sort_by_key(|r| r.instance_id());
        found.dedup_by_key(|r| r.instance_id());
        Ok(found)
    }

    async fn list_owned(&mut self, player_id: PlayerId) -> DbResult<Vec<OwnedItem>> {
        Ok(self.rows(player_id).await?.all())
    }

    async fn upsert(&mut self, player_id: PlayerId, rows: &[OwnedItem]) -> DbResult<()> {
        let work = self.rows(player_id).await?;
        for row in rows {
            match row.instance_id() {
                Some(id) => work.instances.insert(id, row.clone()),
                None => work.stacks.insert(row.item_id.clone(), row.clone()),
            };
        }
        Ok(())
    }

    async fn delete_instances(&mut self, player_id: PlayerId, instance_ids: &[InstanceId]) -> DbResult<()> {
        let work = self.rows(player_id).await?;
        for id in instance_ids {
            work.instances.remove(id);
        }
        Ok(())
    }

    async fn delete_stacks(&mut self, player_id: PlayerId, item_ids: &[ItemKey]) -> DbResult<()> {
        let work = self.rows(player_id).await?;
        for id in item_ids {
            work.stacks.remove(id);
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> DbResult<()> {
        if let Some(Bound { mut guard, work, .. }) = self.bound.take() {
            *guard = work;
        }
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> DbResult<()> {
        self.bound = None;
        Ok(())
    }
}
