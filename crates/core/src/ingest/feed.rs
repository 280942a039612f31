use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Latest per-ticker forecast written by the external model pipeline
/// (`{"ml_predictions": {"OKLO": 0.42}}`). Independent of history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionFeed {
    #[serde(default)]
    pub ml_predictions: BTreeMap<String, f64>,
}

impl PredictionFeed {
    pub fn is_empty(&self) -> bool {
        self.ml_predictions.is_empty()
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.ml_predictions.get(ticker).copied()
    }
}

pub async fn read_prediction_feed(path: &Path) -> anyhow::Result<Option<PredictionFeed>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read prediction feed {}", path.display()))
        }
    };
    let feed = serde_json::from_str::<PredictionFeed>(&text)
        .with_context(|| format!("prediction feed {} is not valid", path.display()))?;
    Ok(Some(feed))
}

/// Missing predictions are a normal state, so every failure degrades to an empty feed.
pub async fn load_prediction_feed(path: &Path) -> PredictionFeed {
    match read_prediction_feed(path).await {
        Ok(Some(feed)) => feed,
        Ok(None) => {
            tracing::debug!(path = %path.display(), "no prediction feed yet");
            PredictionFeed::default()
        }
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "prediction feed unavailable");
            PredictionFeed::default()
        }
    }
}
