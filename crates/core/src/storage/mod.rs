use crate::config::Settings;
use crate::domain::contract::snapshots_from_values;
use crate::domain::Snapshot;
use anyhow::Context;
use serde_json::Value;
use std::sync::Arc;

pub mod file;
pub mod memory;
pub mod postgres;

pub use file::FileHistoryStore;
pub use memory::MemoryHistoryStore;
pub use postgres::PgHistoryStore;

/// Single-blob persistence for the whole history. Last write wins.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn load(&self) -> anyhow::Result<Vec<Snapshot>>;

    async fn save(&self, history: &[Snapshot]) -> anyhow::Result<()>;
}

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Decodes a stored blob, dropping entries that no longer match the snapshot shape.
pub fn decode_history(blob: Value) -> anyhow::Result<Vec<Snapshot>> {
    let Value::Array(items) = blob else {
        anyhow::bail!("stored history must be a JSON array");
    };
    Ok(snapshots_from_values(items))
}

pub fn encode_history(history: &[Snapshot]) -> anyhow::Result<Value> {
    serde_json::to_value(history).context("failed to serialize history")
}

/// Postgres when `DATABASE_URL` is set and reachable, otherwise the JSON file at
/// `HISTORY_PATH`.
pub async fn open_store(settings: &Settings) -> Arc<dyn HistoryStore> {
    if let Ok(db_url) = settings.require_database_url() {
        match PgHistoryStore::connect(db_url).await {
            Ok(store) => return Arc::new(store),
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "history database unavailable; falling back to file store")
            }
        }
    }

    let path = settings.history_path();
    tracing::info!(path = %path.display(), "using file history store");
    Arc::new(FileHistoryStore::new(path))
}
