use crate::domain::contract::snapshots_from_values;
use crate::domain::Snapshot;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;

/// Adds `incoming` entries whose date is not already present. Existing entries win and are
/// never overwritten; the result is sorted by date with no duplicates.
pub fn merge_history(existing: &[Snapshot], incoming: &[Snapshot]) -> Vec<Snapshot> {
    let mut by_date: BTreeMap<NaiveDate, Snapshot> = BTreeMap::new();
    for entry in existing.iter().chain(incoming) {
        by_date
            .entry(entry.date)
            .or_insert_with(|| entry.clone());
    }
    by_date.into_values().collect()
}

/// Merge from an untyped batch. Anything other than a JSON array leaves `existing` as is;
/// shape-invalid elements are dropped.
pub fn merge_raw(existing: &[Snapshot], incoming: &Value) -> Vec<Snapshot> {
    let Value::Array(items) = incoming else {
        tracing::warn!("ignoring non-array snapshot batch");
        return existing.to_vec();
    };
    let incoming = snapshots_from_values(items.iter().cloned());
    merge_history(existing, &incoming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snap(date: &str, tag: &str) -> Snapshot {
        let mut s = Snapshot::new(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap());
        s.extra.insert("tag".to_string(), tag.into());
        s
    }

    fn dates(h: &[Snapshot]) -> Vec<String> {
        h.iter().map(|s| s.date.to_string()).collect()
    }

    #[test]
    fn existing_wins_and_result_is_sorted() {
        let existing = vec![snap("2025-08-22", "old"), snap("2025-08-20", "old")];
        let incoming = vec![snap("2025-08-21", "new"), snap("2025-08-22", "new")];

        let merged = merge_history(&existing, &incoming);
        assert_eq!(dates(&merged), vec!["2025-08-20", "2025-08-21", "2025-08-22"]);
        assert_eq!(merged[2].extra["tag"], "old");
        assert_eq!(merged[1].extra["tag"], "new");
    }

    #[test]
    fn duplicates_inside_incoming_keep_first() {
        let incoming = vec![snap("2025-08-21", "a"), snap("2025-08-21", "b")];
        let merged = merge_history(&[], &incoming);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].extra["tag"], "a");
    }

    #[test]
    fn merge_is_idempotent() {
        let existing = vec![snap("2025-08-20", "h"), snap("2025-08-25", "h")];
        let batch = vec![
            snap("2025-08-22", "x"),
            snap("2025-08-20", "x"),
            snap("2025-08-26", "x"),
        ];

        let once = merge_history(&existing, &batch);
        let twice = merge_history(&once, &batch);
        assert_eq!(once, twice);
        assert!(once.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn raw_non_array_is_noop() {
        let existing = vec![snap("2025-08-20", "h")];
        let merged = merge_raw(&existing, &json!({"date": "2025-08-21"}));
        assert_eq!(merged, existing);
    }

    #[test]
    fn raw_batch_drops_invalid_entries() {
        let existing = vec![snap("2025-08-20", "h")];
        let merged = merge_raw(
            &existing,
            &json!([
                {"date": "2025-08-21", "tickers": {"OKLO": {"close": 9}}},
                {"date": "bad"},
                {"tickers": {}}
            ]),
        );
        assert_eq!(dates(&merged), vec!["2025-08-20", "2025-08-21"]);
    }
}
