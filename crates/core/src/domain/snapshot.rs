use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One day's report. Unknown fields (summary, verdict, ohlcv, macro/news annotations,
/// next-day labels) are kept in `extra` and written back out untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: NaiveDate,

    #[serde(default)]
    pub tickers: BTreeMap<String, TickerRecord>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub benchmarks: BTreeMap<String, Benchmark>,

    /// Only trusted on the chronologically latest entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<RunningTotals>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Snapshot {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            tickers: BTreeMap::new(),
            benchmarks: BTreeMap::new(),
            totals: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerRecord {
    pub close: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pct_change: Option<f64>,

    /// Forecast made on this date for the next trading day, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_next_day_pct: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<Call>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,

    // Derived by the metrics aggregator from the prior day's forecast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_error_pct: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_pnl: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TickerRecord {
    pub fn new(close: f64) -> Self {
        Self {
            close,
            pct_change: None,
            predicted_next_day_pct: None,
            call: None,
            confidence: None,
            action: None,
            abs_error_pct: None,
            daily_pnl: None,
            quality_score: None,
            correct: None,
            extra: Map::new(),
        }
    }

    /// Drops the fields the metrics aggregator derives from the prior day.
    pub fn clear_scores(&mut self) {
        self.abs_error_pct = None;
        self.daily_pnl = None;
        self.quality_score = None;
        self.correct = None;
    }

    /// True when the record carries every field the running totals aggregate over.
    pub fn is_scored(&self) -> bool {
        self.predicted_next_day_pct.is_some()
            && self.pct_change.is_some()
            && self.abs_error_pct.is_some()
            && self.daily_pnl.is_some()
            && self.quality_score.is_some()
    }
}

/// Discretized directional forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    #[serde(alias = "positive", alias = "POSITIVE")]
    Positive,
    #[serde(alias = "neutral", alias = "NEUTRAL")]
    Neutral,
    #[serde(alias = "negative", alias = "NEGATIVE")]
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(alias = "buy", alias = "BUY")]
    Buy,
    #[serde(alias = "hold", alias = "HOLD")]
    Hold,
    #[serde(alias = "sell", alias = "SELL")]
    Sell,
}

/// Benchmarks arrive either as a bare close (e.g. VIX) or as a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Benchmark {
    Close(f64),
    Detailed(BenchmarkRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub close: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_next_day_pct: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Benchmark {
    pub fn close(&self) -> f64 {
        match self {
            Benchmark::Close(close) => *close,
            Benchmark::Detailed(record) => record.close,
        }
    }

    pub fn predicted_next_day_pct(&self) -> Option<f64> {
        match self {
            Benchmark::Close(_) => None,
            Benchmark::Detailed(record) => record.predicted_next_day_pct,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunningTotals {
    pub correct: usize,
    pub incorrect: usize,
    pub success_rate: f64,
    pub total_pnl: f64,
    pub avg_abs_error_pct: f64,
    pub avg_quality_score: f64,
    pub trade_count: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_call: Option<CallOutcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst_call: Option<CallOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub ticker: String,
    pub date: NaiveDate,
    pub pnl: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn benchmark_accepts_bare_number_and_record() {
        let v = json!({
            "date": "2025-08-22",
            "tickers": {"OKLO": {"close": 10}},
            "benchmarks": {
                "VIX": 15.2,
                "SPY": {"close": 640.5, "predicted_next_day_pct": 0.3}
            }
        });

        let s: Snapshot = serde_json::from_value(v).unwrap();
        assert_eq!(s.benchmarks["VIX"].close(), 15.2);
        assert_eq!(s.benchmarks["VIX"].predicted_next_day_pct(), None);
        assert_eq!(s.benchmarks["SPY"].close(), 640.5);
        assert_eq!(s.benchmarks["SPY"].predicted_next_day_pct(), Some(0.3));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let v = json!({
            "date": "2025-08-22",
            "summary": "quiet day",
            "ohlcv": {"OKLO": {"open": 9.5, "high": 10.2}},
            "tickers": {"OKLO": {"close": 10, "streak": 3, "call": "positive"}}
        });

        let s: Snapshot = serde_json::from_value(v).unwrap();
        assert_eq!(s.extra["summary"], json!("quiet day"));
        assert_eq!(s.tickers["OKLO"].extra["streak"], json!(3));
        assert_eq!(s.tickers["OKLO"].call, Some(Call::Positive));

        let out = serde_json::to_value(&s).unwrap();
        assert_eq!(out["ohlcv"]["OKLO"]["high"], json!(10.2));
        assert_eq!(out["tickers"]["OKLO"]["streak"], json!(3));
        assert_eq!(out["tickers"]["OKLO"]["call"], json!("Positive"));
        assert!(out.get("totals").is_none());
    }

    #[test]
    fn partial_totals_do_not_invalidate_snapshot() {
        let v = json!({
            "date": "2025-08-22",
            "tickers": {},
            "totals": {"success_rate": 0.5}
        });
        let s: Snapshot = serde_json::from_value(v).unwrap();
        assert_eq!(s.totals.unwrap().success_rate, 0.5);
    }

    #[test]
    fn rejects_unknown_call_label() {
        let v = json!({
            "date": "2025-08-22",
            "tickers": {"OKLO": {"close": 10, "call": "Sideways"}}
        });
        assert!(serde_json::from_value::<Snapshot>(v).is_err());
    }
}
