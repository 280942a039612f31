use crate::domain::snapshot::Snapshot;
use anyhow::{ensure, Context};
use chrono::NaiveDate;
use serde_json::Value;

/// True for a JSON object carrying a string `date` field.
pub fn has_string_date(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.get("date"))
        .is_some_and(Value::is_string)
}

/// Minimal shape check for a raw snapshot-shaped value.
pub fn validate_snapshot_value(value: &Value) -> anyhow::Result<()> {
    let obj = value
        .as_object()
        .context("snapshot must be a JSON object")?;
    let date = obj
        .get("date")
        .and_then(Value::as_str)
        .context("snapshot must carry a string `date`")?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("snapshot date is not YYYY-MM-DD: {date}"))?;

    if let Some(tickers) = obj.get("tickers") {
        let tickers = tickers
            .as_object()
            .context("`tickers` must be an object")?;
        for symbol in tickers.keys() {
            ensure!(!symbol.trim().is_empty(), "ticker symbol must be non-empty");
        }
    }

    Ok(())
}

/// Validates and decodes one raw value.
pub fn snapshot_from_value(value: Value) -> anyhow::Result<Snapshot> {
    validate_snapshot_value(&value)?;
    let date = value
        .get("date")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    serde_json::from_value::<Snapshot>(value)
        .with_context(|| format!("snapshot {date} does not match the snapshot schema"))
}

/// Decodes a batch, excluding entries that fail the shape check instead of failing the batch.
pub fn snapshots_from_values(values: impl IntoIterator<Item = Value>) -> Vec<Snapshot> {
    let mut out = Vec::new();
    let mut excluded: usize = 0;
    for (idx, value) in values.into_iter().enumerate() {
        match snapshot_from_value(value) {
            Ok(snapshot) => out.push(snapshot),
            Err(err) => {
                excluded += 1;
                tracing::warn!(idx, error = %format!("{err:#}"), "excluding shape-invalid snapshot");
            }
        }
    }

    if excluded != 0 {
        tracing::debug!(kept = out.len(), excluded, "snapshot batch decoded");
    }
    out
}
