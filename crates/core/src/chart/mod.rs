use crate::domain::{HistoryIndex, Snapshot};
use crate::time::{next_trade_date, previous_trade_date};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const PREDICTION_SUFFIX: &str = "_PRED";

pub fn prediction_key(series: &str) -> String {
    format!("{series}{PREDICTION_SUFFIX}")
}

/// One chart point. Serialized flat: `{"date": "...", "OKLO": 11.0, "OKLO_PRED": 11.275}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRow {
    pub date: NaiveDate,

    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl ChartRow {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            values: BTreeMap::new(),
        }
    }

    /// Finite value for a series, if any.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied().filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChartOptions {
    #[serde(default = "default_true")]
    pub include_close: bool,
    #[serde(default = "default_true")]
    pub with_predictions: bool,
    #[serde(default)]
    pub normalize: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            include_close: true,
            with_predictions: true,
            normalize: false,
        }
    }
}

pub fn to_actual_rows(history: &[Snapshot], include_close: bool) -> Vec<ChartRow> {
    history
        .iter()
        .map(|entry| {
            let mut row = ChartRow::new(entry.date);
            if include_close {
                for (symbol, record) in &entry.tickers {
                    row.values.insert(symbol.clone(), record.close);
                }
                for (symbol, benchmark) in &entry.benchmarks {
                    row.values.insert(symbol.clone(), benchmark.close());
                }
            }
            row
        })
        .collect()
}

/// Series in `entry` carrying a forecast, as `(series, close, predicted_pct)`.
fn forecasts(entry: &Snapshot) -> impl Iterator<Item = (&str, f64, f64)> + '_ {
    let tickers = entry.tickers.iter().filter_map(|(symbol, record)| {
        record
            .predicted_next_day_pct
            .map(|pct| (symbol.as_str(), record.close, pct))
    });
    let benchmarks = entry.benchmarks.iter().filter_map(|(symbol, benchmark)| {
        benchmark
            .predicted_next_day_pct()
            .map(|pct| (symbol.as_str(), benchmark.close(), pct))
    });
    tickers.chain(benchmarks).filter(|(_, _, pct)| pct.is_finite())
}

/// Overlays each row with the previous trade date's forecast applied to the row's own
/// actual value, then appends one forecast-only row for the next trade date.
pub fn with_predictions(base_rows: &[ChartRow], history: &[Snapshot]) -> Vec<ChartRow> {
    let index = HistoryIndex::new(history);

    let mut out: Vec<ChartRow> = base_rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            let Some(previous) =
                previous_trade_date(row.date, &index).and_then(|date| index.get(date))
            else {
                return row;
            };

            for (series, _, pct) in forecasts(previous) {
                if let Some(actual) = row.value(series) {
                    row.values
                        .insert(prediction_key(series), actual * (1.0 + pct / 100.0));
                }
            }
            row
        })
        .collect();

    if let Some(future) = history.last().and_then(future_row) {
        out.push(future);
    }
    out
}

fn future_row(last: &Snapshot) -> Option<ChartRow> {
    let mut row = ChartRow::new(next_trade_date(last.date));
    for (series, close, pct) in forecasts(last) {
        if close.is_finite() {
            row.values
                .insert(prediction_key(series), close * (1.0 + pct / 100.0));
        }
    }
    (!row.values.is_empty()).then_some(row)
}

/// Rebases each listed series so its value in the first row is 100. Series whose first
/// value is missing or zero are left as they are.
pub fn normalize<S: AsRef<str>>(rows: &[ChartRow], series_keys: &[S]) -> Vec<ChartRow> {
    let mut out = rows.to_vec();
    let Some(first) = rows.first() else {
        return out;
    };

    for key in series_keys {
        let key = key.as_ref();
        if let Some(base) = first.value(key) {
            rebase(&mut out, key, base);
        }
    }
    out
}

/// `normalize` over every key, except a `_PRED` series takes its base from the actual
/// series it forecasts (forecasts never have a first-row value).
pub fn normalize_with_predictions(rows: &[ChartRow]) -> Vec<ChartRow> {
    let mut out = rows.to_vec();
    let Some(first) = rows.first() else {
        return out;
    };

    for key in series_keys(rows) {
        let base_key = key.strip_suffix(PREDICTION_SUFFIX).unwrap_or(&key);
        if let Some(base) = first.value(base_key) {
            rebase(&mut out, &key, base);
        }
    }
    out
}

fn rebase(rows: &mut [ChartRow], key: &str, base: f64) {
    if base == 0.0 {
        return;
    }
    for row in rows.iter_mut() {
        if let Some(v) = row.values.get_mut(key) {
            if v.is_finite() {
                *v = *v / base * 100.0;
            }
        }
    }
}

/// Every series key present in any row, sorted.
pub fn series_keys(rows: &[ChartRow]) -> Vec<String> {
    rows.iter()
        .flat_map(|row| row.values.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn project(history: &[Snapshot], options: &ChartOptions) -> Vec<ChartRow> {
    let mut rows = to_actual_rows(history, options.include_close);
    if options.with_predictions {
        rows = with_predictions(&rows, history);
    }
    if options.normalize {
        rows = normalize_with_predictions(&rows);
    }
    rows
}
