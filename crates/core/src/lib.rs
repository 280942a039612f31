pub mod chart;
pub mod domain;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod service;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;
    use std::time::Duration;

    const DEFAULT_HISTORY_PATH: &str = "data/history.json";
    const DEFAULT_PREDICTIONS_PATH: &str = "data/latest_ml_predictions.json";
    const DEFAULT_PIPELINE_LOG_DIR: &str = "data/pipeline-logs";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub history_path: Option<String>,
        pub snapshot_dir: Option<String>,
        pub snapshot_source_url: Option<String>,
        pub snapshot_source_api_key: Option<String>,
        pub predictions_path: Option<String>,
        pub pipeline_command: Option<String>,
        pub pipeline_log_dir: Option<String>,
        pub snapshot_refresh_secs: Option<u64>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let snapshot_refresh_secs = match non_empty_var("SNAPSHOT_REFRESH_SECS") {
                Some(s) => Some(
                    s.parse::<u64>()
                        .with_context(|| format!("SNAPSHOT_REFRESH_SECS is not a number: {s}"))?,
                ),
                None => None,
            };

            Ok(Self {
                database_url: non_empty_var("DATABASE_URL"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                history_path: non_empty_var("HISTORY_PATH"),
                snapshot_dir: non_empty_var("SNAPSHOT_DIR"),
                snapshot_source_url: non_empty_var("SNAPSHOT_SOURCE_URL"),
                snapshot_source_api_key: non_empty_var("SNAPSHOT_SOURCE_API_KEY"),
                predictions_path: non_empty_var("PREDICTIONS_PATH"),
                pipeline_command: non_empty_var("PIPELINE_COMMAND"),
                pipeline_log_dir: non_empty_var("PIPELINE_LOG_DIR"),
                snapshot_refresh_secs,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_snapshot_dir(&self) -> anyhow::Result<&str> {
            self.snapshot_dir
                .as_deref()
                .context("SNAPSHOT_DIR is required")
        }

        pub fn require_snapshot_source_url(&self) -> anyhow::Result<&str> {
            self.snapshot_source_url
                .as_deref()
                .context("SNAPSHOT_SOURCE_URL is required")
        }

        pub fn require_pipeline_command(&self) -> anyhow::Result<&str> {
            self.pipeline_command
                .as_deref()
                .context("PIPELINE_COMMAND is required")
        }

        pub fn history_path(&self) -> PathBuf {
            PathBuf::from(
                self.history_path
                    .as_deref()
                    .unwrap_or(DEFAULT_HISTORY_PATH),
            )
        }

        pub fn predictions_path(&self) -> PathBuf {
            PathBuf::from(
                self.predictions_path
                    .as_deref()
                    .unwrap_or(DEFAULT_PREDICTIONS_PATH),
            )
        }

        pub fn pipeline_log_dir(&self) -> PathBuf {
            PathBuf::from(
                self.pipeline_log_dir
                    .as_deref()
                    .unwrap_or(DEFAULT_PIPELINE_LOG_DIR),
            )
        }

        pub fn snapshot_refresh_period(&self) -> Option<Duration> {
            self.snapshot_refresh_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}
