//! Pure inventory computations.
//!
//! Every function here takes the catalog, the policy and a snapshot of the rows
//! it needs, and returns the rows to write. Nothing in this module performs I/O,
//! so the same plan can be committed against any store.

use crate::error::{AppResult, DomainError};
use crate::models::catalog::{Catalog, ItemDefinition};
use crate::models::inventory::OwnedItem;
use crate::models::types::{InstanceId, ItemKey};

pub mod consume;
pub mod grant;
pub mod list;
pub mod properties;

pub use consume::{ConsumePlan, ConsumeRequest, RewardRequest, RewardTarget};
pub use grant::GrantPlan;
pub use properties::PropertyPlan;

/// Row mutations produced by a plan, committed in one transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    pub upserts: Vec<OwnedItem>,
    pub deleted_instances: Vec<InstanceId>,
    pub deleted_stacks: Vec<ItemKey>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deleted_instances.is_empty() && self.deleted_stacks.is_empty()
    }
}

/// Look up a definition, failing with `InvalidArgument` for unknown ids
pub(crate) fn definition<'a>(catalog: &'a Catalog, item_id: &str) -> AppResult<&'a ItemDefinition> {
    catalog
        .get(item_id)
        .ok_or_else(|| DomainError::UnknownItem(item_id.to_string()))
}

/// Deltas on input must be strictly positive
pub(crate) fn positive_quantity(field: &'static str, key: &str, quantity: i64) -> AppResult<u64> {
    if quantity <= 0 {
        return Err(DomainError::Validation {
            field,
            message: format!("quantity for {key} must be positive, got {quantity}"),
        });
    }
    Ok(quantity as u64)
}
