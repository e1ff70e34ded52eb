use crate::models::catalog::Catalog;
use crate::models::inventory::{Inventory, InventoryItem, OwnedItem};

/// Every catalog definition in the category (empty = all), keyed by item id
pub fn catalog_view(catalog: &Catalog, category: &str) -> Inventory {
    Inventory {
        items: catalog
            .in_category(category)
            .map(|def| (def.id.clone(), InventoryItem::from_definition(def)))
            .collect(),
    }
}

/// A player's rows merged with their definitions, keyed by item id for stacks and
/// by instance id for instances. Only rows that exist are listed.
pub fn owned_view(catalog: &Catalog, rows: &[OwnedItem], category: &str) -> Inventory {
    let mut inventory = Inventory::default();
    for row in rows {
        let Some(def) = catalog.get(&row.item_id) else {
            tracing::warn!(item_id = %row.item_id, "owned item missing from catalog, skipped");
            continue;
        };
        if def.in_category(category) {
            inventory.items.insert(row.view_key(), InventoryItem::from_owned(def, row));
        }
    }
    inventory
}

/// View of just the given rows
pub fn view_of<'a>(catalog: &Catalog, rows: impl IntoIterator<Item = &'a OwnedItem>) -> Inventory {
    let rows: Vec<OwnedItem> = rows.into_iter().cloned().collect();
    owned_view(catalog, &rows, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures;
    use crate::models::types::InstanceId;
    use chrono::Utc;

    #[test]
    fn catalog_mode_filters_by_category() {
        let catalog = fixtures::catalog();
        assert_eq!(catalog_view(&catalog, "").len(), catalog.len());

        let weapons = catalog_view(&catalog, "weapons");
        assert_eq!(weapons.len(), 2);
        assert!(weapons.get("sword").is_some());
        assert_eq!(weapons.get("sword").unwrap().count, 0);
    }

    #[test]
    fn owned_mode_keys_instances_by_instance_id() {
        let catalog = fixtures::catalog();
        let now = Utc::now();
        let a = InstanceId::new();
        let b = InstanceId::new();
        let rows = vec![
            OwnedItem::new_stack("potion", 4, now),
            OwnedItem::new_instance("sword", a, now),
            OwnedItem::new_instance("sword", b, now),
            OwnedItem::new_stack("ghost", 1, now),
        ];

        let view = owned_view(&catalog, &rows, "");
        assert_eq!(view.len(), 3);
        assert_eq!(view.get("potion").unwrap().count, 4);
        assert_eq!(view.get(&a.to_string()).unwrap().instance_id, Some(a));
        assert_eq!(view.by_item("sword").count(), 2);

        let consumables = owned_view(&catalog, &rows, "consumables");
        assert_eq!(consumables.len(), 1);
    }

    #[test]
    fn owned_mode_omits_never_owned_items() {
        let catalog = fixtures::catalog();
        let view = owned_view(&catalog, &[], "");
        assert!(view.is_empty());
    }
}
