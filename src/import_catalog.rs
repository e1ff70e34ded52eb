use crate::error::{AppResult, ConfigErrorKind, DomainError, InfraError};
use crate::models::catalog::{Catalog, ItemDefinition};
use crate::models::reward::RewardTable;
use crate::models::types::{NumericProps, StringProps};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

// ====== catalog YAML models ======

#[derive(Debug, Deserialize)]
struct CatalogYaml {
    #[serde(default)]
    items: BTreeMap<String, ItemYaml>,
    #[serde(default)]
    reward_tables: HashMap<String, RewardTable>,
}

#[derive(Debug, Deserialize)]
struct ItemYaml {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    item_sets: Vec<String>,
    #[serde(default)]
    stackable: bool,
    #[serde(default = "default_true")]
    consumable: bool,
    #[serde(default)]
    max_count: u64, // 0 = unbounded
    #[serde(default)]
    consume_reward: Option<String>,
    #[serde(default)]
    string_properties: StringProps,
    #[serde(default)]
    numeric_properties: NumericProps,
}

fn default_true() -> bool {
    true
}

/// A validated catalog file
#[derive(Debug, Clone)]
pub struct LoadedCatalog {
    pub catalog: Catalog,
    pub reward_tables: HashMap<String, RewardTable>,
}

/// Read and validate a catalog file from disk
pub fn load_catalog<P: AsRef<Path>>(path: P) -> AppResult<LoadedCatalog> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|e| InfraError::Config {
        path: path.to_path_buf(),
        source: ConfigErrorKind::Read(e),
    })?;

    let loaded = parse_catalog(&data).map_err(|e| match e {
        DomainError::Infra(InfraError::Config { source, .. }) => DomainError::Infra(InfraError::Config {
            path: path.to_path_buf(),
            source,
        }),
        other => other,
    })?;

    tracing::info!(path = %path.display(), items = loaded.catalog.len(), tables = loaded.reward_tables.len(), "catalog loaded");
    Ok(loaded)
}

/// Parse and validate catalog YAML
pub fn parse_catalog(yaml: &str) -> AppResult<LoadedCatalog> {
    let file: CatalogYaml = serde_yaml::from_str(yaml).map_err(|e| InfraError::Config {
        path: "<catalog>".into(),
        source: ConfigErrorKind::Catalog(e),
    })?;

    for (key, table) in &file.reward_tables {
        if table.rolls == 0 {
            return Err(DomainError::InvalidData(format!("reward table {key}: rolls must be at least 1")));
        }
        if table.entries.is_empty() {
            return Err(DomainError::InvalidData(format!("reward table {key}: no entries")));
        }
        if let Some(pos) = table.entries.iter().position(|e| e.weight == 0) {
            return Err(DomainError::InvalidData(format!(
                "reward table {key}: entry {pos} has zero weight"
            )));
        }
    }

    let mut items = Vec::with_capacity(file.items.len());
    for (id, item) in file.items {
        let id = id.trim().to_string();
        if id.is_empty() {
            return Err(DomainError::InvalidData("item with empty id".into()));
        }
        if let Some(reward_ref) = &item.consume_reward {
            if !file.reward_tables.contains_key(reward_ref) {
                return Err(DomainError::InvalidData(format!(
                    "item {id}: consume_reward {reward_ref} is not a reward table"
                )));
            }
        }

        items.push(ItemDefinition {
            id,
            name: item.name,
            description: item.description,
            category: item.category,
            item_sets: item.item_sets,
            stackable: item.stackable,
            consumable: item.consumable,
            max_count: item.max_count,
            consume_reward: item.consume_reward,
            string_properties: item.string_properties,
            numeric_properties: item.numeric_properties,
        });
    }

    Ok(LoadedCatalog {
        catalog: Catalog::new(items),
        reward_tables: file.reward_tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reward::Reward;

    const SAMPLE: &str = r#"
items:
  health_potion:
    name: item.health_potion.name
    description: item.health_potion.desc
    category: consumables
    item_sets: [starter, alchemy]
    stackable: true
    max_count: 99
    consume_reward: potion_bonus
  iron_sword:
    name: item.iron_sword.name
    category: weapons
    numeric_properties:
      durability: 100
  trophy:
    name: item.trophy.name
    category: trophies
    stackable: true
    consumable: false

reward_tables:
  potion_bonus:
    rolls: 2
    entries:
      - weight: 3
        reward: { kind: currency, currency: gold, amount: 5 }
      - weight: 1
        reward: { kind: cosmetic, cosmetic_id: sparkle }
"#;

    #[test]
    fn parses_items_and_tables() {
        let loaded = parse_catalog(SAMPLE).unwrap();
        assert_eq!(loaded.catalog.len(), 3);

        let potion = loaded.catalog.get("health_potion").unwrap();
        assert!(potion.stackable && potion.consumable);
        assert_eq!(potion.max_count, 99);
        assert_eq!(potion.item_sets, vec!["starter", "alchemy"]);

        let sword = loaded.catalog.get("iron_sword").unwrap();
        assert!(!sword.stackable);
        assert_eq!(sword.max_count, 0);
        assert_eq!(sword.numeric_properties["durability"], 100.0);

        assert!(!loaded.catalog.get("trophy").unwrap().consumable);

        let table = &loaded.reward_tables["potion_bonus"];
        assert_eq!(table.rolls, 2);
        assert_eq!(
            table.entries[1].reward,
            Reward::Cosmetic {
                cosmetic_id: "sparkle".into()
            }
        );
    }

    #[test]
    fn dangling_reward_reference_is_rejected() {
        let yaml = r#"
items:
  potion:
    name: p
    consume_reward: missing
"#;
        let err = parse_catalog(yaml).unwrap_err();
        assert!(matches!(err, DomainError::InvalidData(ref m) if m.contains("missing")));
    }

    #[test]
    fn zero_weight_entry_is_rejected() {
        let yaml = r#"
reward_tables:
  t:
    entries:
      - weight: 0
        reward: { kind: cosmetic, cosmetic_id: x }
"#;
        assert!(matches!(parse_catalog(yaml), Err(DomainError::InvalidData(_))));
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = parse_catalog("items: [not, a, map]").unwrap_err();
        assert!(matches!(err, DomainError::Infra(InfraError::Config { .. })));
    }
}
