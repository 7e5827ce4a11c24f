use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::config::ReviewConfig;
use crate::repository::SqliteStore;

/// Open the configured SQLite store, creating its directory when needed
pub async fn init_database(config: &ReviewConfig) -> Result<SqliteStore> {
    let db_config = config
        .database
        .as_ref()
        .context("Database not configured: add a [database] section to qa-review.toml")?;

    if let Some(dir) = sqlite_file(&db_config.url).and_then(Path::parent) {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
        }
    }

    info!("Initializing database at {}", db_config.url);
    let store = SqliteStore::connect(
        &db_config.url,
        db_config.max_connections,
        db_config.auto_migrate,
    )
    .await
    .with_context(|| format!("Failed to open database {}", db_config.url))?;
    info!("Database initialized successfully");

    Ok(store)
}

/// Close database connections gracefully
pub async fn shutdown_database(store: &SqliteStore) {
    store.shutdown().await;
}

/// File path behind a `sqlite:` URL, if it names one
fn sqlite_file(url: &str) -> Option<&Path> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    match path {
        "" | ":memory:" => None,
        _ => Some(Path::new(path)),
    }
}
