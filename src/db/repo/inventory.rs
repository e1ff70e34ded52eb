use crate::db::DbResult;
use crate::models::inventory::OwnedItem;
use crate::models::types::{InstanceId, ItemKey, PlayerId};

/// One read-modify-write unit against a player's inventory.
///
/// Reads lock what they return (and, for `get_owned`, the item keys even when
/// no row exists yet) until the transaction finishes. Reads observe the
/// transaction's own writes. Dropping a transaction without calling
/// [`InventoryTxn::commit`] rolls it back.
#[async_trait::async_trait]
pub trait InventoryTxn: Send {
    /// All rows (stack or instances) the player owns of the given items
    async fn get_owned(&mut self, player_id: PlayerId, item_ids: &[ItemKey]) -> DbResult<Vec<OwnedItem>>;

    /// The given instances, if they exist and belong to the player
    async fn get_instances(&mut self, player_id: PlayerId, instance_ids: &[InstanceId]) -> DbResult<Vec<OwnedItem>>;

    /// Every row the player owns. Does not lock.
    async fn list_owned(&mut self, player_id: PlayerId) -> DbResult<Vec<OwnedItem>>;

    async fn upsert(&mut self, player_id: PlayerId, rows: &[OwnedItem]) -> DbResult<()>;

    async fn delete_instances(&mut self, player_id: PlayerId, instance_ids: &[InstanceId]) -> DbResult<()>;

    /// Remove stack rows (used when empty stacks are pruned)
    async fn delete_stacks(&mut self, player_id: PlayerId, item_ids: &[ItemKey]) -> DbResult<()>;

    async fn commit(self: Box<Self>) -> DbResult<()>;
    async fn rollback(self: Box<Self>) -> DbResult<()>;
}

#[async_trait::async_trait]
pub trait InventoryStore: Send + Sync {
    async fn begin(&self) -> DbResult<Box<dyn InventoryTxn>>;
}
