mod inventory;
mod reward;

pub use inventory::{ConsumeOutcome, GrantOutcome, InventoryService, parse_instance_keys};
pub use reward::{NoRewards, RewardSource, TableRewards};
