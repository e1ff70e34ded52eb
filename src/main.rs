use anyhow::Context;
use clap::Parser;
use inventory_ledger::{Registry, config, import_catalog, net::http};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "inventory-ledger", version, about = "Player inventory ledger server")]
struct Args {
    /// TOML config file, applied on top of the defaults (environment wins)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the catalog file from the config
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let _ = dotenvy::from_filename(".env");
    let mut cfg = match &args.config {
        Some(path) => config::Config::load(path)?.with_env()?,
        None => config::Config::from_env()?,
    };
    if let Some(path) = args.catalog {
        cfg.catalog_path = path;
    }
    let cfg = Arc::new(cfg);

    let loaded = import_catalog::load_catalog(&cfg.catalog_path)
        .with_context(|| format!("loading catalog {}", cfg.catalog_path.display()))?;

    let registry = Arc::new(Registry::connect(cfg.clone(), loaded).await?);

    let addr: SocketAddr = cfg.http_addr.parse()?;
    tracing::info!(%addr, store = ?cfg.store, "inventory ledger listening");
    if let Err(e) = http::serve(addr, registry).await {
        tracing::error!(error = %e, "http server failed");
        return Err(e.into());
    }

    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, prelude::*};

    color_eyre::install().map_err(|e| anyhow::anyhow!("{e}"))?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::uptime()),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();

    Ok(())
}
