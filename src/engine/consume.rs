use crate::config::LedgerPolicy;
use crate::engine::{Changes, definition, positive_quantity};
use crate::error::{AppResult, DomainError};
use crate::models::catalog::{Catalog, ItemDefinition};
use crate::models::inventory::{Holding, OwnedItem};
use crate::models::types::{InstanceId, ItemKey};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct ConsumeRequest {
    /// Item id -> units. For non-stackable items this consumes the oldest instances.
    pub items: HashMap<ItemKey, i64>,
    /// Specific instances. Instances are atomic, so anything above 1 can only be met by overconsume.
    pub instances: HashMap<InstanceId, i64>,
    /// Cap at what is owned instead of failing
    pub overconsume: bool,
}

impl ConsumeRequest {
    /// Item ids whose rows must be loaded before planning
    pub fn item_keys(&self) -> Vec<ItemKey> {
        let keys: BTreeSet<&ItemKey> = self.items.keys().collect();
        keys.into_iter().cloned().collect()
    }

    pub fn instance_ids(&self) -> Vec<InstanceId> {
        let ids: BTreeSet<InstanceId> = self.instances.keys().copied().collect();
        ids.into_iter().collect()
    }
}

/// Where a reward result is reported back to the caller
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RewardTarget {
    Item(ItemKey),
    Instance(InstanceId),
}

/// One reward roll to perform once the plan is accepted
#[derive(Debug, Clone, PartialEq)]
pub struct RewardRequest {
    pub target: RewardTarget,
    pub reward_ref: String,
    pub item_id: ItemKey,
    pub amount: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumePlan {
    pub changes: Changes,
    /// Rows to report back. Pruned stacks show up here with a count of 0.
    pub changed: Vec<OwnedItem>,
    /// Units actually consumed per requested item id
    pub consumed: BTreeMap<ItemKey, u64>,
    /// Every instance removed by this call
    pub consumed_instances: Vec<InstanceId>,
    pub rewards: Vec<RewardRequest>,
}

type Validated<'a> = (Vec<(&'a ItemDefinition, u64)>, Vec<(InstanceId, u64)>);

/// Reject malformed requests before any row is read
pub fn validate<'a>(catalog: &'a Catalog, request: &ConsumeRequest) -> AppResult<Validated<'a>> {
    if request.items.is_empty() && request.instances.is_empty() {
        return Err(DomainError::Validation {
            field: "items",
            message: "nothing to consume".into(),
        });
    }

    let ordered: BTreeMap<&ItemKey, i64> = request.items.iter().map(|(k, v)| (k, *v)).collect();
    let mut items = Vec::with_capacity(ordered.len());
    for (item_id, quantity) in ordered {
        let def = definition(catalog, item_id)?;
        let quantity = positive_quantity("items", item_id, quantity)?;
        if !def.consumable {
            return Err(DomainError::NotConsumable(def.id.clone()));
        }
        items.push((def, quantity));
    }

    let ordered: BTreeMap<InstanceId, i64> = request.instances.iter().map(|(k, v)| (*k, *v)).collect();
    let mut instances = Vec::with_capacity(ordered.len());
    for (instance_id, quantity) in ordered {
        let quantity = positive_quantity("instances", &instance_id.to_string(), quantity)?;
        instances.push((instance_id, quantity));
    }

    Ok((items, instances))
}

/// Plan a consume against every row loaded for the request's items and instances.
///
/// Either the whole request is satisfiable and a plan comes back, or nothing is.
pub fn plan(
    catalog: &Catalog,
    policy: &LedgerPolicy,
    rows: &[OwnedItem],
    request: &ConsumeRequest,
    now: DateTime<Utc>,
) -> AppResult<ConsumePlan> {
    let (items, instances) = validate(catalog, request)?;
    let mut plan = ConsumePlan::default();
    let mut taken: BTreeSet<InstanceId> = BTreeSet::new();

    // Named instances go first so item-id entries never count them twice
    for (instance_id, need) in instances {
        let Some(row) = rows.iter().find(|r| r.instance_id() == Some(instance_id)) else {
            if request.overconsume {
                tracing::debug!(%instance_id, "missing instance skipped (overconsume)");
                continue;
            }
            return Err(DomainError::InstanceNotFound(instance_id));
        };

        let def = definition(catalog, &row.item_id)?;
        if !def.consumable {
            return Err(DomainError::NotConsumable(def.id.clone()));
        }
        if need > 1 && !request.overconsume {
            return Err(DomainError::InsufficientQuantity {
                item_id: def.id.clone(),
                have: 1,
                need,
            });
        }

        taken.insert(instance_id);
        plan.changes.deleted_instances.push(instance_id);
        plan.consumed_instances.push(instance_id);

        if let Some(reward_ref) = &def.consume_reward {
            plan.rewards.push(RewardRequest {
                target: RewardTarget::Instance(instance_id),
                reward_ref: reward_ref.clone(),
                item_id: def.id.clone(),
                amount: 1,
            });
        }
    }

    for (def, need) in items {
        let used = if def.stackable {
            consume_stack(def, policy, rows, need, request.overconsume, now, &mut plan)?
        } else {
            consume_oldest(def, rows, need, request.overconsume, &mut taken, &mut plan)?
        };

        tracing::debug!(item_id = %def.id, need, used, "consume planned");
        plan.consumed.insert(def.id.clone(), used);

        if used > 0 {
            if let Some(reward_ref) = &def.consume_reward {
                plan.rewards.push(RewardRequest {
                    target: RewardTarget::Item(def.id.clone()),
                    reward_ref: reward_ref.clone(),
                    item_id: def.id.clone(),
                    amount: used,
                });
            }
        }
    }

    Ok(plan)
}

fn consume_stack(
    def: &ItemDefinition,
    policy: &LedgerPolicy,
    rows: &[OwnedItem],
    need: u64,
    overconsume: bool,
    now: DateTime<Utc>,
    plan: &mut ConsumePlan,
) -> AppResult<u64> {
    let existing = rows.iter().find(|r| r.item_id == def.id && !r.is_instance());
    let have = existing.map(OwnedItem::count).unwrap_or(0);
    if have < need && !overconsume {
        return Err(DomainError::InsufficientQuantity {
            item_id: def.id.clone(),
            have,
            need,
        });
    }

    let used = need.min(have);
    let Some(row) = existing.filter(|_| used > 0) else {
        return Ok(0);
    };

    let mut row = row.clone();
    let left = have - used;
    row.holding = Holding::Stack { count: left };
    row.touch(now);

    if left == 0 && policy.prune_empty_stacks {
        plan.changes.deleted_stacks.push(def.id.clone());
    } else {
        plan.changes.upserts.push(row.clone());
    }
    plan.changed.push(row);

    Ok(used)
}

fn consume_oldest(
    def: &ItemDefinition,
    rows: &[OwnedItem],
    need: u64,
    overconsume: bool,
    taken: &mut BTreeSet<InstanceId>,
    plan: &mut ConsumePlan,
) -> AppResult<u64> {
    let mut candidates: Vec<&OwnedItem> = rows
        .iter()
        .filter(|r| r.item_id == def.id)
        .filter(|r| r.instance_id().is_some_and(|id| !taken.contains(&id)))
        .collect();
    candidates.sort_by_key(|r| (r.owned_at, r.instance_id()));

    let have = candidates.len() as u64;
    if have < need && !overconsume {
        return Err(DomainError::InsufficientQuantity {
            item_id: def.id.clone(),
            have,
            need,
        });
    }

    let used = need.min(have);
    for row in candidates.into_iter().take(used as usize) {
        if let Some(id) = row.instance_id() {
            taken.insert(id);
            plan.changes.deleted_instances.push(id);
            plan.consumed_instances.push(id);
        }
    }

    Ok(used)
}
