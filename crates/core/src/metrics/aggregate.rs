use crate::domain::{CallOutcome, RunningTotals, Snapshot, TickerRecord};
use crate::metrics::scoring::ScoringPolicy;
use serde::Serialize;

/// Scores every entry against the one before it and attaches fresh running totals to the
/// last entry. Only forecasts (`predicted_next_day_pct`, `call`) and realized moves
/// (`pct_change`) are read; derived fields from the input are discarded first, so the
/// output depends only on the current neighbours of each entry.
pub fn compute_metrics(history: &[Snapshot], policy: &ScoringPolicy) -> Vec<Snapshot> {
    let mut out = history.to_vec();
    for entry in out.iter_mut() {
        entry.tickers.values_mut().for_each(TickerRecord::clear_scores);
    }

    for i in 1..history.len() {
        let previous = &history[i - 1];
        let current = &mut out[i];

        for (symbol, record) in current.tickers.iter_mut() {
            let Some(prior) = previous.tickers.get(symbol) else {
                continue;
            };
            annotate(record, prior, policy);
        }
    }

    let totals = running_totals(&out);
    if let Some(last) = out.last_mut() {
        last.totals = Some(totals);
    }

    out
}

fn annotate(record: &mut TickerRecord, prior: &TickerRecord, policy: &ScoringPolicy) {
    if prior.predicted_next_day_pct.is_none() && prior.call.is_none() {
        return;
    }
    let Some(actual_pct) = record.pct_change else {
        return;
    };

    let predicted_pct = prior.predicted_next_day_pct.unwrap_or(0.0);
    let score = policy.score_day(predicted_pct, actual_pct, prior.call);

    record.abs_error_pct = Some(score.abs_error_pct);
    record.daily_pnl = Some(score.daily_pnl);
    record.quality_score = Some(score.quality_score);
    record.correct = Some(score.direction_correct);
}

/// Totals over every scored ticker record in the history. Best and worst calls keep the
/// first record on ties.
pub fn running_totals(history: &[Snapshot]) -> RunningTotals {
    let mut total_pnl = 0.0;
    let mut total_error = 0.0;
    let mut total_quality = 0.0;
    let mut trade_count: usize = 0;
    let mut hits: usize = 0;
    let mut best: Option<CallOutcome> = None;
    let mut worst: Option<CallOutcome> = None;

    for entry in history {
        for (symbol, record) in &entry.tickers {
            if !record.is_scored() {
                continue;
            }
            let (Some(pnl), Some(error), Some(quality)) =
                (record.daily_pnl, record.abs_error_pct, record.quality_score)
            else {
                continue;
            };

            total_pnl += pnl;
            total_error += error;
            total_quality += quality;
            trade_count += 1;
            if record.correct == Some(true) {
                hits += 1;
            }

            let outcome = || CallOutcome {
                ticker: symbol.clone(),
                date: entry.date,
                pnl,
            };
            if best.as_ref().map_or(true, |b| pnl > b.pnl) {
                best = Some(outcome());
            }
            if worst.as_ref().map_or(true, |w| pnl < w.pnl) {
                worst = Some(outcome());
            }
        }
    }

    if trade_count == 0 {
        return RunningTotals::default();
    }

    let n = trade_count as f64;
    let success_rate = hits as f64 / n;
    let correct = (success_rate * n).round() as usize;

    RunningTotals {
        correct,
        incorrect: trade_count - correct,
        success_rate,
        total_pnl,
        avg_abs_error_pct: total_error / n,
        avg_quality_score: total_quality / n,
        trade_count,
        best_call: best,
        worst_call: worst,
    }
}

/// Per-day view over the tickers of a single entry that already carry derived fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DayMetrics {
    pub total_pnl: f64,
    pub total_quality_score: f64,
    pub total_abs_error_pct: f64,
    pub trade_count: usize,
    pub hit_count: usize,
}

impl DayMetrics {
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hit_count as f64, self.trade_count)
    }

    pub fn avg_quality_score(&self) -> f64 {
        ratio(self.total_quality_score, self.trade_count)
    }

    pub fn avg_abs_error_pct(&self) -> f64 {
        ratio(self.total_abs_error_pct, self.trade_count)
    }
}

fn ratio(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub fn day_metrics(entry: &Snapshot) -> DayMetrics {
    let mut out = DayMetrics::default();
    for record in entry.tickers.values() {
        let (Some(pnl), Some(quality), Some(error)) =
            (record.daily_pnl, record.quality_score, record.abs_error_pct)
        else {
            continue;
        };
        out.total_pnl += pnl;
        out.total_quality_score += quality;
        out.total_abs_error_pct += error;
        out.trade_count += 1;
        if record.correct == Some(true) {
            out.hit_count += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::merge_history;
    use chrono::NaiveDate;
    use serde_json::json;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn history() -> Vec<Snapshot> {
        serde_json::from_value(json!([
            {
                "date": "2025-08-21",
                "tickers": {
                    "OKLO": {"close": 10.0, "pct_change": 0.5, "predicted_next_day_pct": 3.0, "call": "Positive"},
                    "RKLB": {"close": 20.0, "pct_change": -0.3, "predicted_next_day_pct": -1.0}
                }
            },
            {
                "date": "2025-08-22",
                "tickers": {
                    "OKLO": {"close": 10.2, "pct_change": 2.0, "predicted_next_day_pct": 1.0},
                    "RKLB": {"close": 19.8, "pct_change": 1.0, "call": "Neutral"},
                    "NEW": {"close": 5.0, "pct_change": 4.0, "predicted_next_day_pct": 0.5}
                }
            },
            {
                "date": "2025-08-25",
                "tickers": {
                    "OKLO": {"close": 10.0, "pct_change": -2.0, "predicted_next_day_pct": 0.0},
                    "RKLB": {"close": 19.8, "pct_change": 0.0, "predicted_next_day_pct": 0.2}
                }
            }
        ]))
        .unwrap()
    }

    #[test]
    fn first_entry_and_unmatched_tickers_stay_unannotated() {
        let out = compute_metrics(&history(), &ScoringPolicy::default());

        assert!(out[0].tickers.values().all(|t| t.daily_pnl.is_none()));
        assert!(out[1].tickers["NEW"].daily_pnl.is_none());
        assert!(out[0].totals.is_none());
        assert!(out[1].totals.is_none());
    }

    #[test]
    fn scores_against_prior_day_forecast() {
        let out = compute_metrics(&history(), &ScoringPolicy::default());

        let oklo = &out[1].tickers["OKLO"];
        assert!(approx(oklo.abs_error_pct.unwrap(), 1.0));
        assert!(approx(oklo.daily_pnl.unwrap(), 18.0));
        assert!(approx(oklo.quality_score.unwrap(), 96.0));
        assert_eq!(oklo.correct, Some(true));

        // Short on -1.0 forecast, stock rose 1%.
        let rklb = &out[1].tickers["RKLB"];
        assert!(approx(rklb.daily_pnl.unwrap(), -12.0));
        assert_eq!(rklb.correct, Some(false));

        // Neutral call with no numeric forecast defaults the forecast to 0.
        let rklb = &out[2].tickers["RKLB"];
        assert_eq!(rklb.daily_pnl, Some(0.0));
        assert_eq!(rklb.correct, Some(true));
        assert!(approx(rklb.abs_error_pct.unwrap(), 0.0));
    }

    #[test]
    fn totals_land_on_last_entry_only() {
        let out = compute_metrics(&history(), &ScoringPolicy::default());
        let totals = out[2].totals.as_ref().unwrap();

        // 2025-08-22 RKLB has no forecast of its own, so it is not aggregated.
        assert_eq!(totals.trade_count, 3);
        assert_eq!(totals.correct + totals.incorrect, 3);

        let best = totals.best_call.as_ref().unwrap();
        assert_eq!(best.ticker, "OKLO");
        assert_eq!(best.date, NaiveDate::from_ymd_opt(2025, 8, 22).unwrap());
        let worst = totals.worst_call.as_ref().unwrap();
        assert_eq!(worst.ticker, "OKLO");
        assert_eq!(worst.date, NaiveDate::from_ymd_opt(2025, 8, 25).unwrap());
        // Long on +1.0 forecast, stock fell 2%.
        assert!(approx(worst.pnl, -22.0));
    }

    #[test]
    fn totals_ties_keep_first() {
        let h: Vec<Snapshot> = serde_json::from_value(json!([
            {"date": "2025-08-21", "tickers": {
                "AAA": {"close": 1.0, "predicted_next_day_pct": 1.0},
                "BBB": {"close": 1.0, "predicted_next_day_pct": 1.0}
            }},
            {"date": "2025-08-22", "tickers": {
                "AAA": {"close": 1.0, "pct_change": 1.0, "predicted_next_day_pct": 1.0},
                "BBB": {"close": 1.0, "pct_change": 1.0, "predicted_next_day_pct": 1.0}
            }}
        ]))
        .unwrap();

        let out = compute_metrics(&h, &ScoringPolicy::default());
        let totals = out[1].totals.as_ref().unwrap();
        assert_eq!(totals.best_call.as_ref().unwrap().ticker, "AAA");
        assert_eq!(totals.worst_call.as_ref().unwrap().ticker, "AAA");
        assert_eq!(totals.correct, 2);
        assert!(approx(totals.success_rate, 1.0));
    }

    #[test]
    fn recompute_is_idempotent() {
        let policy = ScoringPolicy::default();
        let once = compute_metrics(&history(), &policy);
        let twice = compute_metrics(&once, &policy);
        assert_eq!(once, twice);
    }

    #[test]
    fn backfilled_day_rescores_its_successor() {
        let policy = ScoringPolicy::default();
        let h: Vec<Snapshot> = serde_json::from_value(json!([
            {"date": "2025-08-21", "tickers": {"OKLO": {"close": 10.0, "predicted_next_day_pct": 3.0}}},
            {"date": "2025-08-25", "tickers": {"OKLO": {"close": 10.2, "pct_change": 2.0, "predicted_next_day_pct": 1.0}}}
        ]))
        .unwrap();
        let backfill: Vec<Snapshot> = serde_json::from_value(json!([
            {"date": "2025-08-22", "tickers": {"OKLO": {"close": 10.1, "pct_change": 1.0}}}
        ]))
        .unwrap();

        let annotated = compute_metrics(&h, &policy);
        assert!(approx(annotated[1].tickers["OKLO"].daily_pnl.unwrap(), 18.0));

        let from_annotated = compute_metrics(&merge_history(&annotated, &backfill), &policy);
        let from_raw = compute_metrics(&merge_history(&h, &backfill), &policy);

        let oklo = &from_annotated[2].tickers["OKLO"];
        assert_eq!(oklo.daily_pnl, None);
        assert_eq!(oklo.abs_error_pct, None);
        assert_eq!(oklo.quality_score, None);
        assert_eq!(oklo.correct, None);
        assert_eq!(from_annotated[2].totals.as_ref().unwrap().trade_count, 0);
        assert_eq!(from_annotated, from_raw);
    }

    #[test]
    fn derived_fields_on_first_entry_are_dropped() {
        let mut h = history();
        let oklo = h[0].tickers.get_mut("OKLO").unwrap();
        oklo.abs_error_pct = Some(1.0);
        oklo.daily_pnl = Some(500.0);
        oklo.quality_score = Some(50.0);
        oklo.correct = Some(true);

        let out = compute_metrics(&h, &ScoringPolicy::default());
        assert_eq!(out[0].tickers["OKLO"].daily_pnl, None);
        assert_eq!(out, compute_metrics(&history(), &ScoringPolicy::default()));
    }

    #[test]
    fn stale_totals_on_earlier_entries_are_left_alone() {
        let mut h = history();
        h[0].totals = Some(RunningTotals {
            trade_count: 99,
            ..RunningTotals::default()
        });
        let out = compute_metrics(&h, &ScoringPolicy::default());
        assert_eq!(out[0].totals.as_ref().unwrap().trade_count, 99);
        assert_eq!(out[2].totals.as_ref().unwrap().trade_count, 3);
    }

    #[test]
    fn empty_and_single_entry_histories() {
        assert!(compute_metrics(&[], &ScoringPolicy::default()).is_empty());

        let single = vec![Snapshot::new(NaiveDate::from_ymd_opt(2025, 8, 22).unwrap())];
        let out = compute_metrics(&single, &ScoringPolicy::default());
        assert_eq!(out[0].totals, Some(RunningTotals::default()));
    }

    #[test]
    fn does_not_mutate_input() {
        let h = history();
        let before = h.clone();
        let _ = compute_metrics(&h, &ScoringPolicy::default());
        assert_eq!(h, before);
    }

    #[test]
    fn day_metrics_sums_one_entry() {
        let out = compute_metrics(&history(), &ScoringPolicy::default());

        let day = day_metrics(&out[1]);
        assert_eq!(day.trade_count, 2);
        assert_eq!(day.hit_count, 1);
        assert!(approx(day.total_pnl, 6.0));
        assert!(approx(day.hit_rate(), 0.5));

        let first = day_metrics(&out[0]);
        assert_eq!(first, DayMetrics::default());
        assert_eq!(first.avg_quality_score(), 0.0);
    }
}
