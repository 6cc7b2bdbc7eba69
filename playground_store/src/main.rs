//! Standalone store binary.
//!
//! Usage:
//!   cargo run -p playground_store -- [--addr 127.0.0.1:40100] [--config cfg.json]
//!       [--items 50]
//!
//! Serves presence and resources until interrupted.

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use playground_shared::config::PlaygroundConfig;
use playground_store::StoreServer;
use tracing::info;

struct Args {
    config: Option<PathBuf>,
    addr: Option<String>,
    items: Option<usize>,
}

fn parse_args() -> Args {
    let mut out = Args {
        config: None,
        addr: None,
        items: None,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                out.config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                out.addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--items" if i + 1 < args.len() => {
                out.items = args[i + 1].parse().ok();
                i += 2;
            }
            _ => i += 1,
        }
    }
    out
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let mut cfg = match &args.config {
        Some(path) => PlaygroundConfig::from_path(path)?,
        None => PlaygroundConfig::default(),
    };
    if let Some(addr) = args.addr {
        cfg.store_addr = addr;
    }
    if let Some(items) = args.items {
        cfg.resources.item_count = items;
    }
    info!(
        addr = %cfg.store_addr,
        items = cfg.resources.item_count,
        respawn_ms = cfg.resources.respawn_ms,
        "Starting store"
    );

    let server = StoreServer::bind(cfg).await.context("bind store")?;
    info!(local = %server.local_addr()?, "Store listening");
    server.run().await
}
