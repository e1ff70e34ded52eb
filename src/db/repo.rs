mod inventory;
mod inventory_db;
mod inventory_mem;

pub use inventory::{InventoryStore, InventoryTxn};
pub use inventory_db::PgInventoryStore;
pub use inventory_mem::MemoryInventoryStore;
