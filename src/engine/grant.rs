use crate::config::{LedgerPolicy, MaxCountPolicy};
use crate::engine::{Changes, definition, positive_quantity};
use crate::error::{AppResult, DomainError};
use crate::models::catalog::{Catalog, ItemDefinition};
use crate::models::inventory::{Holding, OwnedItem};
use crate::models::types::{InstanceId, ItemKey};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Result of planning a grant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrantPlan {
    pub changes: Changes,
    /// Units actually added per item. Lower than requested when clamped by `max_count`.
    pub applied: BTreeMap<ItemKey, u64>,
}

/// Check every entry before anything is planned, so one bad entry rejects the call
pub fn validate<'a>(
    catalog: &'a Catalog,
    items: &HashMap<ItemKey, i64>,
) -> AppResult<Vec<(&'a ItemDefinition, u64)>> {
    if items.is_empty() {
        return Err(DomainError::Validation {
            field: "items",
            message: "nothing to grant".into(),
        });
    }

    let ordered: BTreeMap<&ItemKey, i64> = items.iter().map(|(k, v)| (k, *v)).collect();
    ordered
        .into_iter()
        .map(|(item_id, quantity)| {
            let def = definition(catalog, item_id)?;
            let quantity = positive_quantity("items", item_id, quantity)?;
            Ok((def, quantity))
        })
        .collect()
}

/// Plan a grant against the rows currently owned for the granted items.
///
/// `new_instance_id` is called once per created instance.
pub fn plan(
    catalog: &Catalog,
    policy: &LedgerPolicy,
    current: &[OwnedItem],
    items: &HashMap<ItemKey, i64>,
    now: DateTime<Utc>,
    mut new_instance_id: impl FnMut() -> InstanceId,
) -> AppResult<GrantPlan> {
    let entries = validate(catalog, items)?;

    let instances: u64 = entries
        .iter()
        .filter(|(def, _)| !def.stackable)
        .fold(0u64, |acc, (_, quantity)| acc.saturating_add(*quantity));
    if instances > policy.max_instances_per_grant {
        return Err(DomainError::Validation {
            field: "items",
            message: format!(
                "grant would create {instances} instances, at most {} per call",
                policy.max_instances_per_grant
            ),
        });
    }

    let mut plan = GrantPlan::default();

    for (def, requested) in entries {
        let rows: Vec<&OwnedItem> = current.iter().filter(|r| r.item_id == def.id).collect();

        if def.stackable {
            let existing = rows.iter().find(|r| !r.is_instance()).copied();
            let have = existing.map(OwnedItem::count).unwrap_or(0);
            let applied = applicable(def, policy, have, requested)?;

            if applied > 0 {
                let total = have.checked_add(applied).filter(|t| *t <= i64::MAX as u64).ok_or_else(|| {
                    DomainError::Validation {
                        field: "items",
                        message: format!("count overflow for {}", def.id),
                    }
                })?;

                let row = match existing {
                    Some(row) => {
                        let mut row = row.clone();
                        row.holding = Holding::Stack { count: total };
                        row.touch(now);
                        row
                    }
                    None => OwnedItem::new_stack(&def.id, total, now),
                };
                plan.changes.upserts.push(row);
            }

            tracing::debug!(item_id = %def.id, have, requested, applied, "grant stack");
            plan.applied.insert(def.id.clone(), applied);
        } else {
            let have = rows.iter().filter(|r| r.is_instance()).count() as u64;
            let applied = applicable(def, policy, have, requested)?;

            for _ in 0..applied {
                plan.changes
                    .upserts
                    .push(OwnedItem::new_instance(&def.id, new_instance_id(), now));
            }

            tracing::debug!(item_id = %def.id, have, requested, applied, "grant instances");
            plan.applied.insert(def.id.clone(), applied);
        }
    }

    Ok(plan)
}

/// How many of `requested` units may be added given `have` and the item's bound
fn applicable(def: &ItemDefinition, policy: &LedgerPolicy, have: u64, requested: u64) -> AppResult<u64> {
    match def.headroom(have) {
        None => Ok(requested),
        Some(room) if requested <= room => Ok(requested),
        Some(room) => match policy.max_count {
            MaxCountPolicy::Clamp => Ok(room),
            MaxCountPolicy::Reject => Err(DomainError::MaxCountExceeded {
                item_id: def.id.clone(),
                have,
                adding: requested,
                max: def.max_count,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures;
    use crate::error::ErrorCode;
    use std::collections::HashSet;

    fn req(entries: &[(&str, i64)]) -> HashMap<ItemKey, i64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn stackable_grant_creates_then_increments() {
        let catalog = fixtures::catalog();
        let policy = LedgerPolicy::default();
        let t0 = Utc::now();

        let first = plan(&catalog, &policy, &[], &req(&[("potion", 3)]), t0, InstanceId::new).unwrap();
        assert_eq!(first.changes.upserts.len(), 1);
        let row = &first.changes.upserts[0];
        assert_eq!(row.count(), 3);
        assert_eq!(row.owned_at, t0);

        let t1 = t0 + chrono::Duration::seconds(5);
        let second = plan(&catalog, &policy, &first.changes.upserts, &req(&[("potion", 2)]), t1, InstanceId::new)
            .unwrap();
        let row = &second.changes.upserts[0];
        assert_eq!(row.count(), 5);
        assert_eq!(row.owned_at, t0);
        assert_eq!(row.updated_at, t1);
    }

    #[test]
    fn instanced_grant_creates_distinct_instances() {
        let catalog = fixtures::catalog();
        let now = Utc::now();
        let plan = plan(&catalog, &LedgerPolicy::default(), &[], &req(&[("sword", 4)]), now, InstanceId::new).unwrap();

        let ids: HashSet<InstanceId> = plan.changes.upserts.iter().filter_map(OwnedItem::instance_id).collect();
        assert_eq!(ids.len(), 4);
        assert!(plan.changes.upserts.iter().all(|r| r.owned_at == now && r.count() == 1));
        assert_eq!(plan.applied["sword"], 4);
    }

    #[test]
    fn zero_or_negative_quantity_rejects_whole_grant() {
        let catalog = fixtures::catalog();
        for bad in [0, -3] {
            let err = plan(
                &catalog,
                &LedgerPolicy::default(),
                &[],
                &req(&[("potion", 5), ("arrow", bad)]),
                Utc::now(),
                InstanceId::new,
            )
            .unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidArgument);
        }
    }

    #[test]
    fn unknown_item_is_invalid_argument() {
        let catalog = fixtures::catalog();
        let err = plan(&catalog, &LedgerPolicy::default(), &[], &req(&[("dragon", 1)]), Utc::now(), InstanceId::new)
            .unwrap_err();
        assert!(matches!(err, DomainError::UnknownItem(ref id) if id == "dragon"));
    }

    #[test]
    fn clamp_policy_applies_what_fits_per_entry() {
        let catalog = fixtures::catalog();
        let now = Utc::now();
        let current = vec![OwnedItem::new_stack("arrow", 45, now)];

        let plan = plan(
            &catalog,
            &LedgerPolicy::default(),
            &current,
            &req(&[("arrow", 10), ("potion", 10)]),
            now,
            InstanceId::new,
        )
        .unwrap();

        assert_eq!(plan.applied["arrow"], 5);
        assert_eq!(plan.applied["potion"], 10);
        let arrow = plan.changes.upserts.iter().find(|r| r.item_id == "arrow").unwrap();
        assert_eq!(arrow.count(), 50);
    }

    #[test]
    fn clamp_at_limit_writes_nothing_for_that_entry() {
        let catalog = fixtures::catalog();
        let now = Utc::now();
        let current = vec![
            OwnedItem::new_instance("shield", InstanceId::new(), now),
            OwnedItem::new_instance("shield", InstanceId::new(), now),
        ];

        let plan = plan(&catalog, &LedgerPolicy::default(), &current, &req(&[("shield", 1)]), now, InstanceId::new)
            .unwrap();
        assert_eq!(plan.applied["shield"], 0);
        assert!(plan.changes.is_empty());
    }

    #[test]
    fn reject_policy_fails_with_failed_precondition() {
        let catalog = fixtures::catalog();
        let policy = LedgerPolicy {
            max_count: MaxCountPolicy::Reject,
            ..LedgerPolicy::default()
        };
        let current = vec![OwnedItem::new_stack("arrow", 45, Utc::now())];

        let err = plan(&catalog, &policy, &current, &req(&[("arrow", 10)]), Utc::now(), InstanceId::new).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FailedPrecondition);
        assert!(matches!(err, DomainError::MaxCountExceeded { have: 45, adding: 10, max: 50, .. }));
    }

    #[test]
    fn instance_ceiling_rejects_the_whole_call() {
        let catalog = fixtures::catalog();
        let policy = LedgerPolicy {
            max_instances_per_grant: 5,
            ..LedgerPolicy::default()
        };

        let ok = plan(&catalog, &policy, &[], &req(&[("sword", 5), ("potion", 500)]), Utc::now(), InstanceId::new)
            .unwrap();
        assert_eq!(ok.applied["sword"], 5);

        // counted across entries, stacks do not count
        let err = plan(
            &catalog,
            &policy,
            &[],
            &req(&[("sword", 3), ("shield", 3), ("potion", 1)]),
            Utc::now(),
            InstanceId::new,
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let err = plan(&catalog, &policy, &[], &req(&[("sword", 50_000_000)]), Utc::now(), InstanceId::new)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "items", .. }));
    }
}
