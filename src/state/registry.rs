use crate::config::{Config, StoreKind};
use crate::db::Db;
use crate::db::repo::{InventoryStore, MemoryInventoryStore, PgInventoryStore};
use crate::error::AppResult;
use crate::import_catalog::LoadedCatalog;
use crate::models::catalog::Catalog;
use crate::services::{InventoryService, RewardSource, TableRewards};
use std::sync::Arc;

pub struct Repos {
    pub inventory: Arc<dyn InventoryStore>,
}

pub struct Services {
    pub inventory: Arc<InventoryService>,
}

pub struct Registry {
    /// Only set for the postgres store
    pub db: Option<Arc<Db>>,
    pub repos: Arc<Repos>,
    pub services: Arc<Services>,
    pub catalog: Arc<Catalog>,
    pub config: Arc<Config>,
}

impl Registry {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        catalog: Arc<Catalog>,
        rewards: Arc<dyn RewardSource>,
        config: Arc<Config>,
    ) -> Self {
        let repos = Arc::new(Repos { inventory: store });

        let inventory_service = Arc::new(InventoryService::new(
            repos.inventory.clone(),
            catalog.clone(),
            rewards,
            &config,
        ));

        let services = Arc::new(Services {
            inventory: inventory_service,
        });

        Self {
            db: None,
            repos,
            services,
            catalog,
            config,
        }
    }

    /// Build the store named in the config. Postgres gets its migrations run first.
    pub async fn connect(config: Arc<Config>, loaded: LoadedCatalog) -> AppResult<Self> {
        let rewards: Arc<dyn RewardSource> = Arc::new(
            TableRewards::new(loaded.reward_tables, config.reward_seed).with_max_picks(config.max_reward_picks),
        );
        let catalog = Arc::new(loaded.catalog);

        match config.store {
            StoreKind::Postgres => {
                let db = Arc::new(Db::new(&config.database_url)?);
                db.init().await?;

                let store = Arc::new(PgInventoryStore::new(db.clone(), config.lock_timeout()));
                let mut registry = Self::new(store, catalog, rewards, config);
                registry.db = Some(db);
                Ok(registry)
            }
            StoreKind::Memory => {
                tracing::warn!("using the in-memory store, inventories are lost on restart");
                let store = Arc::new(MemoryInventoryStore::new(config.lock_timeout()));
                Ok(Self::new(store, catalog, rewards, config))
            }
        }
    }

    pub fn inventory(&self) -> &InventoryService {
        &self.services.inventory
    }
}
