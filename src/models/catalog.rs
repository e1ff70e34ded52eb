use crate::models::types::{ItemKey, NumericProps, StringProps};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Item definition as loaded from the catalog file. Never mutated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    /// Catalog key (e.g. "health_potion")
    pub id: ItemKey,

    /// Localization code of the display name
    pub name: String,

    /// Localization code of the description
    pub description: String,

    /// Category used by list filters (e.g. "weapons")
    pub category: String,

    /// Sets this item belongs to, in declaration order
    pub item_sets: Vec<String>,

    /// Fungible items are tracked as a single count per player
    pub stackable: bool,

    /// Whether the item may be consumed at all
    pub consumable: bool,

    /// Upper bound on the owned count (or instance count). 0 means unbounded.
    pub max_count: u64,

    /// Reward table rolled when the item is consumed
    pub consume_reward: Option<String>,

    /// Catalog-level default properties, shown in list views
    pub string_properties: StringProps,
    pub numeric_properties: NumericProps,
}

impl ItemDefinition {
    #[inline]
    pub fn is_bounded(&self) -> bool {
        self.max_count > 0
    }

    /// How many more units can be owned given the current count.
    /// `None` when the item is unbounded.
    pub fn headroom(&self, current: u64) -> Option<u64> {
        if self.is_bounded() {
            Some(self.max_count.saturating_sub(current))
        } else {
            None
        }
    }

    pub fn in_category(&self, category: &str) -> bool {
        category.is_empty() || self.category == category
    }
}

/// Immutable set of item definitions, shared as `Arc<Catalog>` and handed to
/// every engine call.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: HashMap<ItemKey, ItemDefinition>,
}

impl Catalog {
    pub fn new(items: impl IntoIterator<Item = ItemDefinition>) -> Self {
        Self {
            items: items.into_iter().map(|d| (d.id.clone(), d)).collect(),
        }
    }

    pub fn get(&self, item_id: &str) -> Option<&ItemDefinition> {
        self.items.get(item_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemDefinition> {
        self.items.values()
    }

    /// All definitions in the given category (empty = all)
    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a ItemDefinition> + 'a {
        self.items.values().filter(move |d| d.in_category(category))
    }
}
