use crate::domain::snapshot::Snapshot;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Date-keyed view over a history slice.
#[derive(Debug, Clone, Default)]
pub struct HistoryIndex<'a> {
    by_date: BTreeMap<NaiveDate, &'a Snapshot>,
}

impl<'a> HistoryIndex<'a> {
    pub fn new(history: &'a [Snapshot]) -> Self {
        let mut by_date = BTreeMap::new();
        for entry in history {
            // First occurrence wins, same as merge.
            by_date.entry(entry.date).or_insert(entry);
        }
        Self { by_date }
    }

    pub fn get(&self, date: NaiveDate) -> Option<&'a Snapshot> {
        self.by_date.get(&date).copied()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.by_date.contains_key(&date)
    }

    pub fn latest(&self) -> Option<&'a Snapshot> {
        self.by_date.values().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_by_date_and_keeps_first_duplicate() {
        let d1 = NaiveDate::from_ymd_opt(2025, 8, 22).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 8, 25).unwrap();

        let mut first = Snapshot::new(d1);
        first.extra.insert("tag".to_string(), "first".into());
        let mut dup = Snapshot::new(d1);
        dup.extra.insert("tag".to_string(), "dup".into());
        let history = vec![Snapshot::new(d2), first, dup];

        let index = HistoryIndex::new(&history);
        assert_eq!(index.len(), 2);
        assert!(index.contains(d1));
        assert_eq!(index.get(d1).unwrap().extra["tag"], "first");
        assert_eq!(index.latest().unwrap().date, d2);
    }
}
