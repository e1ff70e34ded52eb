pub mod catalog;
pub mod inventory;
pub mod reward;
pub mod types;
