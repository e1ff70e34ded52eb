use crate::engine::Changes;
use crate::error::{AppResult, DomainError};
use crate::models::inventory::{Holding, ItemProperties, OwnedItem};
use crate::models::types::InstanceId;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyPlan {
    pub changes: Changes,
}

/// Merge property updates into the given instances. Every referenced instance
/// must be among `rows`, otherwise the whole update fails.
pub fn plan(
    rows: &[OwnedItem],
    updates: &HashMap<InstanceId, ItemProperties>,
    now: DateTime<Utc>,
) -> AppResult<PropertyPlan> {
    if updates.is_empty() {
        return Err(DomainError::Validation {
            field: "instances",
            message: "nothing to update".into(),
        });
    }

    let ordered: BTreeMap<&InstanceId, &ItemProperties> = updates.iter().collect();
    let mut plan = PropertyPlan::default();

    for (instance_id, update) in ordered {
        let Some(row) = rows.iter().find(|r| r.instance_id() == Some(*instance_id)) else {
            return Err(DomainError::InstanceNotFound(*instance_id));
        };

        let mut row = row.clone();
        if let Holding::Instance { properties, .. } = &mut row.holding {
            properties.merge(update);
        }
        row.touch(now);
        plan.changes.upserts.push(row);
    }

    Ok(plan)
}
