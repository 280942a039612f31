use crate::config::Settings;
use anyhow::Context;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use uuid::Uuid;

const FAILURE_TAIL_BYTES: u64 = 4 * 1024;

/// Fire-and-forget launcher for the external training/prediction pipeline.
///
/// The child writes stdout and stderr to `<log_dir>/<run_id>.log`, so it keeps running
/// after the caller exits.
#[derive(Debug, Clone)]
pub struct PipelineTrigger {
    command: String,
    log_dir: PathBuf,
}

impl PipelineTrigger {
    pub fn new(command: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            log_dir: log_dir.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Option<Self> {
        settings
            .pipeline_command
            .as_deref()
            .map(|command| Self::new(command, settings.pipeline_log_dir()))
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn log_path(&self, run_id: Uuid) -> PathBuf {
        self.log_dir.join(format!("{run_id}.log"))
    }

    /// Spawns the command and returns immediately. The exit status is only logged,
    /// with the tail of the run log on failure.
    pub fn trigger(&self) -> anyhow::Result<Uuid> {
        let run_id = Uuid::new_v4();
        let log_path = self.log_path(run_id);

        std::fs::create_dir_all(&self.log_dir).with_context(|| {
            format!("failed to create pipeline log dir {}", self.log_dir.display())
        })?;
        let log = std::fs::File::create(&log_path)
            .with_context(|| format!("failed to create pipeline log {}", log_path.display()))?;
        let log_err = log
            .try_clone()
            .context("failed to share pipeline log handle")?;

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .with_context(|| format!("failed to spawn pipeline command: {}", self.command))?;

        tracing::info!(%run_id, command = %self.command, log = %log_path.display(), "pipeline started");

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => tracing::info!(%run_id, "pipeline finished"),
                Ok(status) => {
                    let tail = log_tail(&log_path, FAILURE_TAIL_BYTES).await;
                    tracing::warn!(
                        %run_id,
                        %status,
                        log = %log_path.display(),
                        output = %tail.trim(),
                        "pipeline exited with failure"
                    );
                }
                Err(err) => tracing::error!(%run_id, error = %err, "pipeline wait failed"),
            }
        });

        Ok(run_id)
    }
}

/// Last `max_bytes` of a file, lossily decoded. Empty when the file can't be read.
async fn log_tail(path: &Path, max_bytes: u64) -> String {
    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return String::new();
    };
    let len = file.metadata().await.map(|m| m.len()).unwrap_or(0);
    if len > max_bytes && file.seek(SeekFrom::Start(len - max_bytes)).await.is_err() {
        return String::new();
    }

    let mut buf = Vec::new();
    if file.take(max_bytes).read_to_end(&mut buf).await.is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}
