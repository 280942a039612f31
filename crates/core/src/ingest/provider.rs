use crate::config::Settings;
use crate::domain::contract::snapshots_from_values;
use crate::domain::Snapshot;
use crate::ingest::parse::parse_snapshots;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;

/// Bulk loader for raw snapshots produced outside this process.
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_snapshots(&self) -> Result<Vec<Snapshot>>;
}

/// HTTP endpoint (preferred) or snapshot directory, whichever is configured.
pub fn source_from_settings(settings: &Settings) -> Result<Option<Arc<dyn SnapshotSource>>> {
    if settings.snapshot_source_url.is_some() {
        let source = HttpSnapshotSource::from_settings(settings)?;
        return Ok(Some(Arc::new(source)));
    }
    if let Some(dir) = settings.snapshot_dir.as_deref() {
        return Ok(Some(Arc::new(DirectorySnapshotSource::new(dir))));
    }
    Ok(None)
}

/// Expects a JSON array of snapshot-shaped objects.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    retries: u32,
}

impl HttpSnapshotSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let url = settings.require_snapshot_source_url()?.to_string();
        let api_key = settings.snapshot_source_api_key.clone();

        let timeout_secs = std::env::var("SNAPSHOT_SOURCE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("SNAPSHOT_SOURCE_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build snapshot source http client")?;

        Ok(Self {
            http,
            url,
            api_key,
            retries,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(&self) -> Result<Value> {
        let res = self
            .http
            .get(&self.url)
            .headers(self.headers()?)
            .send()
            .await
            .context("snapshot source request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read snapshot source response")?;

        if !status.is_success() {
            anyhow::bail!("snapshot source HTTP {status}: {text}");
        }

        serde_json::from_str::<Value>(&text)
            .with_context(|| format!("snapshot source response is not valid JSON: {text}"))
    }
}

#[async_trait::async_trait]
impl SnapshotSource for HttpSnapshotSource {
    fn source_name(&self) -> &'static str {
        "http_json"
    }

    async fn fetch_snapshots(&self) -> Result<Vec<Snapshot>> {
        let mut attempt: u32 = 0;
        let raw = loop {
            attempt += 1;
            match self.fetch_once().await {
                Ok(raw) => break raw,
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, error = %err, "snapshot source fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        };

        snapshots_from_response(raw)
    }
}

fn snapshots_from_response(raw: Value) -> Result<Vec<Snapshot>> {
    let Value::Array(items) = raw else {
        anyhow::bail!("snapshot source must return a JSON array");
    };
    Ok(snapshots_from_values(items))
}

/// Reads every `*.json` file in a directory, in file-name order.
#[derive(Debug, Clone)]
pub struct DirectorySnapshotSource {
    dir: PathBuf,
}

impl DirectorySnapshotSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn json_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("failed to read snapshot dir {}", self.dir.display()))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("failed to list snapshot dir")?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait::async_trait]
impl SnapshotSource for DirectorySnapshotSource {
    fn source_name(&self) -> &'static str {
        "directory"
    }

    async fn fetch_snapshots(&self) -> Result<Vec<Snapshot>> {
        let files = self.json_files().await?;
        let mut out = Vec::new();
        let mut skipped: usize = 0;

        for path in &files {
            let text = match tokio::fs::read_to_string(path).await {
                Ok(text) => text,
                Err(err) => {
                    skipped += 1;
                    tracing::warn!(path = %path.display(), error = %err, "unreadable snapshot file; skipping");
                    continue;
                }
            };
            match parse_snapshots(&text) {
                Some(snapshots) => out.extend(snapshots),
                None => {
                    skipped += 1;
                    tracing::warn!(path = %path.display(), "no snapshot in file; skipping");
                }
            }
        }

        tracing::info!(
            dir = %self.dir.display(),
            files = files.len(),
            snapshots = out.len(),
            skipped,
            "loaded snapshot directory"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_must_be_array() {
        assert!(snapshots_from_response(json!({"date": "2025-08-22"})).is_err());

        let out = snapshots_from_response(json!([
            {"date": "2025-08-22", "tickers": {"OKLO": {"close": 10}}},
            {"date": "2025-08-23", "tickers": {"OKLO": "broken"}}
        ]))
        .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn directory_source_reads_json_files_and_skips_junk() {
        let dir = std::env::temp_dir().join(format!("nextday-src-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        tokio::fs::write(
            dir.join("2025-08-22.json"),
            r#"{"date":"2025-08-22","tickers":{"OKLO":{"close":10}}}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(
            dir.join("2025-08-21.json"),
            "```json\n{\"date\":\"2025-08-21\",\"tickers\":{}}\n```",
        )
        .await
        .unwrap();
        tokio::fs::write(dir.join("broken.json"), "{ nope").await.unwrap();
        tokio::fs::write(dir.join("notes.txt"), r#"{"date":"2025-08-20"}"#)
            .await
            .unwrap();

        let source = DirectorySnapshotSource::new(&dir);
        let out = source.fetch_snapshots().await.unwrap();
        let dates: Vec<String> = out.iter().map(|s| s.date.to_string()).collect();
        assert_eq!(dates, vec!["2025-08-21", "2025-08-22"]);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = std::env::temp_dir().join(format!("nextday-missing-{}", uuid::Uuid::new_v4()));
        let source = DirectorySnapshotSource::new(dir);
        assert!(source.fetch_snapshots().await.is_err());
    }
}
