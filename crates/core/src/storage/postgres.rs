use crate::domain::Snapshot;
use crate::storage::{decode_history, encode_history, HistoryStore};
use anyhow::Context;

const DEFAULT_KEY: &str = "history";

/// Keeps the history as one JSONB blob in `history_blobs`.
#[derive(Debug, Clone)]
pub struct PgHistoryStore {
    pool: sqlx::PgPool,
    key: String,
}

impl PgHistoryStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            pool,
            key: DEFAULT_KEY.to_string(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub async fn connect(db_url: &str) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;
        crate::storage::migrate(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait::async_trait]
impl HistoryStore for PgHistoryStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn load(&self) -> anyhow::Result<Vec<Snapshot>> {
        let blob: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT value FROM history_blobs WHERE key = $1")
                .persistent(false)
                .bind(&self.key)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("select history_blobs failed (key={})", self.key))?;

        match blob {
            Some(blob) => decode_history(blob),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, history: &[Snapshot]) -> anyhow::Result<()> {
        let blob = encode_history(history)?;
        sqlx::query(
            "INSERT INTO history_blobs (key, value, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
        )
        .persistent(false)
        .bind(&self.key)
        .bind(blob)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert history_blobs failed (key={})", self.key))?;

        tracing::debug!(key = %self.key, entries = history.len(), "history saved");
        Ok(())
    }
}
