use anyhow::Context;
use clap::Parser;
use inventory_ledger::import_catalog;
use std::collections::BTreeMap;
use std::path::PathBuf;

// cargo run --bin check-catalog -- --path data/catalog.yaml

#[derive(Debug, Parser)]
#[command(name = "check-catalog", version, about = "Validate an item catalog file")]
struct Args {
    /// Catalog file to check
    #[arg(long, default_value = "data/catalog.yaml")]
    path: PathBuf,

    /// List every item, not just the per-category counts
    #[arg(long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let loaded =
        import_catalog::load_catalog(&args.path).with_context(|| format!("invalid catalog {}", args.path.display()))?;

    let mut by_category: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for def in loaded.catalog.iter() {
        by_category.entry(def.category.as_str()).or_default().push(def.id.as_str());
    }

    println!("{}: {} items, {} reward tables", args.path.display(), loaded.catalog.len(), loaded.reward_tables.len());
    for (category, mut items) in by_category {
        items.sort_unstable();
        let label = if category.is_empty() { "(none)" } else { category };
        println!("  {label}: {}", items.len());
        if args.verbose {
            for item in items {
                println!("    - {item}");
            }
        }
    }

    Ok(())
}
