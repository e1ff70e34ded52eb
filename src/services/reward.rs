use crate::error::{AppResult, DomainError};
use crate::models::reward::{RewardContext, RewardList, RewardTable};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// The economy side of consumption: turns a reward reference into concrete rewards.
pub trait RewardSource: Send + Sync {
    fn roll(&self, reward_ref: &str, ctx: &RewardContext) -> AppResult<RewardList>;
}

/// Reward source backed by the weighted tables of the catalog file
pub struct TableRewards {
    tables: HashMap<String, RewardTable>,
    rng: Mutex<StdRng>,
    max_picks: u64,
}

const DEFAULT_MAX_PICKS: u64 = 1_000;

impl TableRewards {
    /// A fixed `seed` makes every roll reproducible
    pub fn new(tables: HashMap<String, RewardTable>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            tables,
            rng: Mutex::new(rng),
            max_picks: DEFAULT_MAX_PICKS,
        }
    }

    /// Bound the random draws of one roll. Beyond it, each draw stands for a
    /// batch of picks and its reward is scaled by the batch size.
    pub fn with_max_picks(mut self, max_picks: u64) -> Self {
        self.max_picks = max_picks.max(1);
        self
    }
}

impl RewardSource for TableRewards {
    fn roll(&self, reward_ref: &str, ctx: &RewardContext) -> AppResult<RewardList> {
        let table = self.tables.get(reward_ref).ok_or_else(|| DomainError::Reward {
            reward_ref: reward_ref.to_string(),
            message: "no such reward table".into(),
        })?;

        let total = table.total_weight();
        if total == 0 {
            return Err(DomainError::Reward {
                reward_ref: reward_ref.to_string(),
                message: "reward table has no weight".into(),
            });
        }

        let picks = (table.rolls as u64).saturating_mul(ctx.amount);
        let mut list = RewardList::default();
        if picks == 0 {
            return Ok(list);
        }

        // picks split over at most max_picks draws, sizes differ by at most one
        let draws = picks.min(self.max_picks);
        let (batch, extra) = (picks / draws, picks % draws);

        let mut rng = self.rng.lock();
        for draw in 0..draws {
            let times = batch + u64::from(draw < extra);
            let ticket = rng.random_range(0..total);
            if let Some(reward) = table.pick(ticket) {
                list.push(reward.scaled(times));
            }
        }

        tracing::debug!(%reward_ref, item_id = %ctx.item_id, picks, draws, rewards = list.rewards.len(), "reward rolled");
        Ok(list)
    }
}

/// Reward source that never pays out
pub struct NoRewards;

impl RewardSource for NoRewards {
    fn roll(&self, _reward_ref: &str, _ctx: &RewardContext) -> AppResult<RewardList> {
        Ok(RewardList::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reward::{Reward, WeightedReward};
    use crate::models::types::PlayerId;

    fn gold_table() -> HashMap<String, RewardTable> {
        HashMap::from([(
            "gold".to_string(),
            RewardTable {
                rolls: 2,
                entries: vec![WeightedReward {
                    weight: 1,
                    reward: Reward::Currency {
                        currency: "gold".into(),
                        amount: 5,
                    },
                }],
            },
        )])
    }

    fn ctx(amount: u64) -> RewardContext {
        RewardContext {
            player_id: PlayerId::new(),
            item_id: "potion".into(),
            instance_id: None,
            amount,
        }
    }

    #[test]
    fn rolls_scale_with_consumed_amount() {
        let rewards = TableRewards::new(gold_table(), Some(7));
        let list = rewards.roll("gold", &ctx(3)).unwrap();
        // 2 rolls x 3 units, merged into one currency entry
        assert_eq!(
            list.rewards,
            vec![Reward::Currency {
                currency: "gold".into(),
                amount: 30
            }]
        );
    }

    #[test]
    fn same_seed_same_rolls() {
        let mut tables = gold_table();
        tables.insert(
            "mixed".into(),
            RewardTable {
                rolls: 1,
                entries: (0..5)
                    .map(|i| WeightedReward {
                        weight: i + 1,
                        reward: Reward::Cosmetic {
                            cosmetic_id: format!("c{i}"),
                        },
                    })
                    .collect(),
            },
        );

        let a = TableRewards::new(tables.clone(), Some(42)).roll("mixed", &ctx(10)).unwrap();
        let b = TableRewards::new(tables, Some(42)).roll("mixed", &ctx(10)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.rewards.len(), 10);
    }

    #[test]
    fn unknown_table_is_an_error() {
        let rewards = TableRewards::new(HashMap::new(), None);
        let err = rewards.roll("nope", &ctx(1)).unwrap_err();
        assert!(matches!(err, DomainError::Reward { .. }));
    }

    #[test]
    fn huge_rolls_are_drawn_in_batches() {
        let tables = HashMap::from([(
            "coins".to_string(),
            RewardTable {
                rolls: 3,
                entries: vec![
                    WeightedReward {
                        weight: 1,
                        reward: Reward::Currency {
                            currency: "gold".into(),
                            amount: 1,
                        },
                    },
                    WeightedReward {
                        weight: 1,
                        reward: Reward::Currency {
                            currency: "gems".into(),
                            amount: 1,
                        },
                    },
                ],
            },
        )]);
        let rewards = TableRewards::new(tables, Some(3)).with_max_picks(7);

        let list = rewards.roll("coins", &ctx(1_000_000_000_000)).unwrap();
        let total: u64 = list
            .rewards
            .iter()
            .map(|r| match r {
                Reward::Currency { amount, .. } => *amount,
                _ => 0,
            })
            .sum();
        assert_eq!(total, 3_000_000_000_000);
    }

    #[test]
    fn nothing_consumed_nothing_rolled() {
        let rewards = TableRewards::new(gold_table(), Some(1));
        assert!(rewards.roll("gold", &ctx(0)).unwrap().is_empty());
    }
}
