use crate::domain::Snapshot;
use crate::storage::{decode_history, HistoryStore};
use anyhow::Context;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl HistoryStore for FileHistoryStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn load(&self) -> anyhow::Result<Vec<Snapshot>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let blob = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("{} is not valid JSON", self.path.display()))?;
        decode_history(blob)
    }

    async fn save(&self, history: &[Snapshot]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let body = serde_json::to_vec_pretty(history).context("failed to serialize history")?;

        // Write then rename.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), entries = history.len(), "history saved");
        Ok(())
    }
}
