#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use std::path::PathBuf;

use herald_common::{HeraldConfig, tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    herald::logging::init();

    let config_path = find_config_file()?;
    let config = HeraldConfig::load(&config_path)?;
    tracing::info!(path = %config_path.display(), "Loaded configuration");

    let result = herald::run(&config).await?;
    let summary = result.summary();

    if result.is_success() {
        tracing::info!(%summary, "Run finished");
    } else {
        tracing::warn!(%summary, "Run finished with failures");
    }

    println!("All emails sent");
    Ok(())
}

/// Find the configuration file using the following precedence:
/// 1. `HERALD_CONFIG` environment variable
/// 2. ./herald.config.ron (current working directory)
/// 3. /etc/herald/herald.config.ron (system-wide config)
fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var("HERALD_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "HERALD_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        PathBuf::from("./herald.config.ron"),
        PathBuf::from("/etc/herald/herald.config.ron"),
    ];

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - HERALD_CONFIG environment variable\n{paths_tried}"
    )
}
