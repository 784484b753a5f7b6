//! bep-index-node binary entry point.
//!
//! Usage:
//! ```bash
//! bep-index-node --config index-node.toml
//! ```

use bep_index_node::{Config, IndexNode, NodeError};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), NodeError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let path = get_config_path();
    let config = if path.exists() {
        Config::from_file(&path)?
    } else {
        tracing::warn!("Config file {} not found, using defaults", path.display());
        Config::default()
    };

    tracing::info!("bep-index-node v{}", env!("CARGO_PKG_VERSION"));
    let node = IndexNode::start(config).await?;

    for status in node.aggregator().folder_status_list() {
        tracing::info!(
            "Folder {} ({}): {} files, {} dirs, {} bytes, {} index updates missing",
            status.info.label,
            status.info.folder_id,
            status.stats.file_count,
            status.stats.dir_count,
            status.stats.size,
            status.missing_index_updates()
        );
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    node.stop().await;
    Ok(())
}

fn get_config_path() -> PathBuf {
    std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("index-node.toml"))
}
