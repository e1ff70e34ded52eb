use crate::db::error::DbError;
use crate::db::repo::inventory::{InventoryStore, InventoryTxn};
use crate::db::{Db, DbResult, map_rows};
use crate::models::inventory::{Holding, ItemProperties, OwnedItem};
use crate::models::types::{InstanceId, ItemKey, NumericProps, PlayerId, StringProps};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::Row;
use tokio_postgres::types::Json;

const ROW_COLUMNS: &str = "item_id, instance_id, count, string_props, numeric_props, owned_at, updated_at";

pub struct PgInventoryStore {
    db: Arc<Db>,
    lock_timeout: Duration,
}

impl PgInventoryStore {
    pub fn new(db: Arc<Db>, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }
}

#[async_trait::async_trait]
impl InventoryStore for PgInventoryStore {
    async fn begin(&self) -> DbResult<Box<dyn InventoryTxn>> {
        let client = self.db.get_client().await?;

        // SET LOCAL only lives as long as the transaction
        let ms = self.lock_timeout.as_millis().max(1);
        client
            .batch_execute(&format!(
                "BEGIN ISOLATION LEVEL READ COMMITTED; SET LOCAL lock_timeout = '{ms}ms'"
            ))
            .await?;

        Ok(Box::new(PgTxn { client: Some(client) }))
    }
}

struct PgTxn {
    client: Option<deadpool_postgres::Client>,
}

impl PgTxn {
    fn client(&self) -> DbResult<&deadpool_postgres::Client> {
        self.client
            .as_ref()
            .ok_or_else(|| DbError::Validation("transaction already finished".into()))
    }

    async fn upsert_row(&self, player_id: PlayerId, row: &OwnedItem) -> DbResult<()> {
        let client = self.client()?;

        match &row.holding {
            Holding::Stack { count } => {
                let count = i64::try_from(*count)
                    .map_err(|_| DbError::Validation(format!("count out of range for {}", row.item_id)))?;
                let stmt = client
                    .prepare_cached(
                        r#"
                        INSERT INTO inventory_items (player_id, item_id, instance_id, count, owned_at, updated_at)
                        VALUES ($1, $2, NULL, $3, $4, $5)
                        ON CONFLICT (player_id, item_id) WHERE instance_id IS NULL
                        DO UPDATE SET count = EXCLUDED.count, updated_at = EXCLUDED.updated_at
                        "#,
                    )
                    .await?;
                client
                    .execute(
                        &stmt,
                        &[&player_id, &row.item_id, &count, &row.owned_at, &row.updated_at],
                    )
                    .await?;
            }
            Holding::Instance { instance_id, properties } => {
                let stmt = client
                    .prepare_cached(
                        r#"
                        INSERT INTO inventory_items
                            (player_id, item_id, instance_id, count, string_props, numeric_props, owned_at, updated_at)
                        VALUES ($1, $2, $3, 1, $4, $5, $6, $7)
                        ON CONFLICT (instance_id) WHERE instance_id IS NOT NULL
                        DO UPDATE SET string_props = EXCLUDED.string_props,
                                      numeric_props = EXCLUDED.numeric_props,
                                      updated_at = EXCLUDED.updated_at
                        WHERE inventory_items.player_id = EXCLUDED.player_id
                        "#,
                    )
                    .await?;
                let affected = client
                    .execute(
                        &stmt,
                        &[
                            &player_id,
                            &row.item_id,
                            instance_id,
                            &Json(&properties.string_properties),
                            &Json(&properties.numeric_properties),
                            &row.owned_at,
                            &row.updated_at,
                        ],
                    )
                    .await?;
                if affected == 0 {
                    // instance id exists but belongs to someone else
                    return Err(DbError::UniqueViolation);
                }
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl InventoryTxn for PgTxn {
    // ========================================================================
    // READS
    // ========================================================================

    async fn get_owned(&mut self, player_id: PlayerId, item_ids: &[ItemKey]) -> DbResult<Vec<OwnedItem>> {
        let client = self.client()?;
        let keys: BTreeSet<&ItemKey> = item_ids.iter().collect();

        // Item-scoped advisory locks also cover stacks that do not exist yet, so two
        // first-time grants of the same item serialize. Sorted order avoids deadlocks.
        let player = player_id.to_string();
        for key in &keys {
            client
                .execute(
                    "SELECT pg_advisory_xact_lock(hashtextextended($1::text || '/' || $2::text, 0))",
                    &[&player, key],
                )
                .await?;
        }

        let keys: Vec<&ItemKey> = keys.into_iter().collect();
        let rows = client
            .query(
                &format!(
                    "SELECT {ROW_COLUMNS} FROM inventory_items
                     WHERE player_id = $1 AND item_id = ANY($2)
                     ORDER BY item_id, owned_at, instance_id
                     FOR UPDATE"
                ),
                &[&player_id, &keys],
            )
            .await?;

        map_rows(rows, owned_item_from_row, "InventoryTxn::get_owned")
    }

    async fn get_instances(&mut self, player_id: PlayerId, instance_ids: &[InstanceId]) -> DbResult<Vec<OwnedItem>> {
        let client = self.client()?;
        let ids: Vec<uuid::Uuid> = instance_ids.iter().map(|id| id.0).collect();

        let rows = client
            .query(
                &format!(
                    "SELECT {ROW_COLUMNS} FROM inventory_items
                     WHERE player_id = $1 AND instance_id = ANY($2)
                     ORDER BY instance_id
                     FOR UPDATE"
                ),
                &[&player_id, &ids],
            )
            .await?;

        map_rows(rows, owned_item_from_row, "InventoryTxn::get_instances")
    }

    async fn list_owned(&mut self, player_id: PlayerId) -> DbResult<Vec<OwnedItem>> {
        let client = self.client()?;

        let rows = client
            .query(
                &format!(
                    "SELECT {ROW_COLUMNS} FROM inventory_items
                     WHERE player_id = $1
                     ORDER BY item_id, owned_at, instance_id"
                ),
                &[&player_id],
            )
            .await?;

        map_rows(rows, owned_item_from_row, "InventoryTxn::list_owned")
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    async fn upsert(&mut self, player_id: PlayerId, rows: &[OwnedItem]) -> DbResult<()> {
        for row in rows {
            self.upsert_row(player_id, row).await?;
        }
        Ok(())
    }

    async fn delete_instances(&mut self, player_id: PlayerId, instance_ids: &[InstanceId]) -> DbResult<()> {
        if instance_ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<uuid::Uuid> = instance_ids.iter().map(|id| id.0).collect();
        self.client()?
            .execute(
                "DELETE FROM inventory_items WHERE player_id = $1 AND instance_id = ANY($2)",
                &[&player_id, &ids],
            )
            .await?;

        Ok(())
    }

    async fn delete_stacks(&mut self, player_id: PlayerId, item_ids: &[ItemKey]) -> DbResult<()> {
        if item_ids.is_empty() {
            return Ok(());
        }

        self.client()?
            .execute(
                "DELETE FROM inventory_items
                 WHERE player_id = $1 AND item_id = ANY($2) AND instance_id IS NULL",
                &[&player_id, &item_ids],
            )
            .await?;

        Ok(())
    }

    // ========================================================================
    // COMPLETION
    // ========================================================================

    async fn commit(mut self: Box<Self>) -> DbResult<()> {
        let client = self
            .client
            .take()
            .ok_or_else(|| DbError::Validation("transaction already finished".into()))?;

        if let Err(e) = client.batch_execute("COMMIT").await {
            tracing::error!(error = %e, "inventory commit failed");
            return Err(e.into());
        }
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> DbResult<()> {
        if let Some(client) = self.client.take() {
            client.batch_execute("ROLLBACK").await?;
        }
        Ok(())
    }
}

impl Drop for PgTxn {
    fn drop(&mut self) {
        // Request was cancelled (or errored) mid-transaction: roll back before the
        // connection goes back to the pool.
        let Some(client) = self.client.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.batch_execute("ROLLBACK").await {
                        tracing::warn!(error = %e, "background rollback failed");
                    }
                });
            }
            Err(_) => {
                // Without a runtime the connection cannot be cleaned, keep it out of the pool
                let _ = deadpool_postgres::Object::take(client);
            }
        }
    }
}

fn owned_item_from_row(row: &Row) -> DbResult<OwnedItem> {
    let item_id: String = row.try_get("item_id")?;
    let instance_id: Option<InstanceId> = row.try_get("instance_id")?;
    let count: i64 = row.try_get("count")?;
    let owned_at: DateTime<Utc> = row.try_get("owned_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    let holding = match instance_id {
        None => Holding::Stack {
            count: u64::try_from(count).map_err(|_| DbError::Decode(format!("negative count for {item_id}")))?,
        },
        Some(instance_id) => {
            let Json(string_properties): Json<StringProps> = row.try_get("string_props")?;
            let Json(numeric_properties): Json<NumericProps> = row.try_get("numeric_props")?;
            Holding::Instance {
                instance_id,
                properties: ItemProperties {
                    string_properties,
                    numeric_properties,
                },
            }
        }
    };

    Ok(OwnedItem {
        item_id,
        holding,
        owned_at,
        updated_at,
    })
}
