use crate::models::catalog::ItemDefinition;
use crate::models::types::{InstanceId, ItemKey, NumericProps, StringProps};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-instance custom state (durability, charges, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemProperties {
    #[serde(default)]
    pub string_properties: StringProps,
    #[serde(default)]
    pub numeric_properties: NumericProps,
}

impl ItemProperties {
    /// Merge `update` into self. Keys present in the update overwrite, all
    /// other keys are left alone.
    pub fn merge(&mut self, update: &ItemProperties) {
        for (k, v) in &update.string_properties {
            self.string_properties.insert(k.clone(), v.clone());
        }
        for (k, v) in &update.numeric_properties {
            self.numeric_properties.insert(k.clone(), *v);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.string_properties.is_empty() && self.numeric_properties.is_empty()
    }
}

/// Whether a row is a fungible stack or a single identified instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Holding {
    /// One row per player and item, count may be zero when empty stacks are kept
    Stack { count: u64 },
    /// One row per unit, always an implicit count of 1
    Instance {
        instance_id: InstanceId,
        properties: ItemProperties,
    },
}

/// A row of a player's inventory
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedItem {
    /// Catalog key of the item
    pub item_id: ItemKey,

    pub holding: Holding,

    /// Set once, when the row is created
    pub owned_at: DateTime<Utc>,

    /// Refreshed on every mutation, never before `owned_at`
    pub updated_at: DateTime<Utc>,
}

impl OwnedItem {
    pub fn new_stack(item_id: &str, count: u64, now: DateTime<Utc>) -> Self {
        Self {
            item_id: item_id.to_string(),
            holding: Holding::Stack { count },
            owned_at: now,
            updated_at: now,
        }
    }

    pub fn new_instance(item_id: &str, instance_id: InstanceId, now: DateTime<Utc>) -> Self {
        Self {
            item_id: item_id.to_string(),
            holding: Holding::Instance {
                instance_id,
                properties: ItemProperties::default(),
            },
            owned_at: now,
            updated_at: now,
        }
    }

    /// Units represented by this row
    pub fn count(&self) -> u64 {
        match &self.holding {
            Holding::Stack { count } => *count,
            Holding::Instance { .. } => 1,
        }
    }

    pub fn instance_id(&self) -> Option<InstanceId> {
        match &self.holding {
            Holding::Stack { .. } => None,
            Holding::Instance { instance_id, .. } => Some(*instance_id),
        }
    }

    pub fn is_instance(&self) -> bool {
        matches!(self.holding, Holding::Instance { .. })
    }

    /// Key under which this row shows up in an inventory view
    pub fn view_key(&self) -> String {
        match &self.holding {
            Holding::Stack { .. } => self.item_id.clone(),
            Holding::Instance { instance_id, .. } => instance_id.to_string(),
        }
    }

    /// Bump `updated_at`, clamped so it never precedes `owned_at`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.owned_at);
    }
}

/// Merged view of a definition and (optionally) the owned row, as returned to
/// callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: ItemKey,
    pub name: String,
    pub description: String,
    pub category: String,
    pub item_sets: Vec<String>,
    pub stackable: bool,
    pub consumable: bool,
    pub max_count: u64,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    pub string_properties: StringProps,
    pub numeric_properties: NumericProps,
    /// Unix seconds, absent in catalog views
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owned_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<i64>,
}

impl InventoryItem {
    /// Catalog-only entry, nothing owned
    pub fn from_definition(def: &ItemDefinition) -> Self {
        Self {
            id: def.id.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
            category: def.category.clone(),
            item_sets: def.item_sets.clone(),
            stackable: def.stackable,
            consumable: def.consumable,
            max_count: def.max_count,
            count: 0,
            instance_id: None,
            string_properties: def.string_properties.clone(),
            numeric_properties: def.numeric_properties.clone(),
            owned_time: None,
            update_time: None,
        }
    }

    /// Definition fields merged with an owned row. Instance properties take
    /// precedence over the catalog defaults.
    pub fn from_owned(def: &ItemDefinition, row: &OwnedItem) -> Self {
        let mut item = Self::from_definition(def);
        item.count = row.count();
        item.owned_time = Some(row.owned_at.timestamp());
        item.update_time = Some(row.updated_at.timestamp());

        if let Holding::Instance { instance_id, properties } = &row.holding {
            item.instance_id = Some(*instance_id);
            item.string_properties.extend(properties.string_properties.clone());
            item.numeric_properties.extend(properties.numeric_properties.clone());
        }

        item
    }
}

/// Inventory view, keyed by item id (stacks, catalog entries) or instance id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: HashMap<String, InventoryItem>,
}

impl Inventory {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&InventoryItem> {
        self.items.get(key)
    }

    /// All entries for a given catalog item
    pub fn by_item<'a>(&'a self, item_id: &'a str) -> impl Iterator<Item = &'a InventoryItem> + 'a {
        self.items.values().filter(move |i| i.id == item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_unrelated_keys() {
        let mut props = ItemProperties::default();
        props.string_properties.insert("color".into(), "red".into());
        props.numeric_properties.insert("durability".into(), 10.0);

        let mut update = ItemProperties::default();
        update.string_properties.insert("engraving".into(), "Ada".into());
        update.numeric_properties.insert("durability".into(), 7.5);
        props.merge(&update);

        assert_eq!(props.string_properties["color"], "red");
        assert_eq!(props.string_properties["engraving"], "Ada");
        assert_eq!(props.numeric_properties["durability"], 7.5);
    }

    #[test]
    fn touch_never_moves_before_owned_at() {
        let owned = Utc::now();
        let mut row = OwnedItem::new_stack("gem", 1, owned);
        row.touch(owned - chrono::Duration::seconds(30));
        assert_eq!(row.updated_at, owned);
    }
}
