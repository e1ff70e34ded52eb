pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod import_catalog;
pub mod models;
pub mod net;
pub mod rpc;
pub mod services;
pub mod state;

// Convenient re-exports (so call sites can do `inventory_ledger::Registry`, etc.)
pub use state::registry::Registry;
