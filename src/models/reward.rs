use crate::models::types::{InstanceId, ItemKey, PlayerId};
use serde::{Deserialize, Serialize};

/// A concrete reward, as produced by the reward collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reward {
    Currency { currency: String, amount: u64 },
    ItemGrant { item_id: ItemKey, quantity: u64 },
    Cosmetic { cosmetic_id: String },
}

impl Reward {
    /// The reward `times` over. Cosmetics are granted once regardless.
    pub fn scaled(&self, times: u64) -> Reward {
        match self {
            Reward::Currency { currency, amount } => Reward::Currency {
                currency: currency.clone(),
                amount: amount.saturating_mul(times),
            },
            Reward::ItemGrant { item_id, quantity } => Reward::ItemGrant {
                item_id: item_id.clone(),
                quantity: quantity.saturating_mul(times),
            },
            Reward::Cosmetic { .. } => self.clone(),
        }
    }
}

/// Rewards produced by one roll of a reward table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardList {
    pub rewards: Vec<Reward>,
}

impl RewardList {
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Add a reward, folding it into an existing entry of the same currency
    /// or item.
    pub fn push(&mut self, reward: Reward) {
        for existing in self.rewards.iter_mut() {
            match (existing, &reward) {
                (
                    Reward::Currency { currency, amount },
                    Reward::Currency { currency: c, amount: a },
                ) if currency == c => {
                    *amount = amount.saturating_add(*a);
                    return;
                }
                (
                    Reward::ItemGrant { item_id, quantity },
                    Reward::ItemGrant { item_id: i, quantity: q },
                ) if item_id == i => {
                    *quantity = quantity.saturating_add(*q);
                    return;
                }
                _ => {}
            }
        }
        self.rewards.push(reward);
    }
}

/// What was consumed, handed to the reward collaborator alongside the table key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardContext {
    pub player_id: PlayerId,
    pub item_id: ItemKey,
    pub instance_id: Option<InstanceId>,
    /// Units actually consumed (not the requested amount)
    pub amount: u64,
}

/// Weighted reward table, rolled `rolls` times per consumed unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTable {
    #[serde(default = "default_rolls")]
    pub rolls: u32,
    pub entries: Vec<WeightedReward>,
}

fn default_rolls() -> u32 {
    1
}

impl RewardTable {
    pub fn total_weight(&self) -> u64 {
        self.entries.iter().map(|e| e.weight as u64).sum()
    }

    /// Entry hit by `ticket`, a number in `0..total_weight()`
    pub fn pick(&self, mut ticket: u64) -> Option<&Reward> {
        for entry in &self.entries {
            let weight = entry.weight as u64;
            if ticket < weight {
                return Some(&entry.reward);
            }
            ticket -= weight;
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedReward {
    pub weight: u32,
    pub reward: Reward,
}
