use crate::chart::{project, ChartOptions, ChartRow};
use crate::domain::{RunningTotals, Snapshot};
use crate::ingest::{merge_history, parse_snapshots, SnapshotSource};
use crate::metrics::{compute_metrics, day_metrics, DayMetrics, ScoringPolicy};
use crate::storage::HistoryStore;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub type SharedHistory = Arc<Vec<Snapshot>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub added: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub yesterday: Option<DayMetrics>,
    pub today: Option<DayMetrics>,
}

/// Owns the in-memory history. Every mutation builds a new history, persists it
/// (best effort) and publishes it to subscribers.
pub struct HistoryService {
    store: Arc<dyn HistoryStore>,
    source: Option<Arc<dyn SnapshotSource>>,
    policy: ScoringPolicy,
    tx: watch::Sender<SharedHistory>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn HistoryStore>, policy: ScoringPolicy) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Vec::new()));
        Self {
            store,
            source: None,
            policy,
            tx,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Reads the stored history. A failed read leaves the service with an empty history.
    pub async fn load(&self) -> usize {
        let stored = match self.store.load().await {
            Ok(history) => history,
            Err(err) => {
                tracing::warn!(store = self.store.name(), error = %format!("{err:#}"), "history load failed; starting empty");
                Vec::new()
            }
        };

        let history = compute_metrics(&merge_history(&[], &stored), &self.policy);
        let total = history.len();
        self.publish(history);
        tracing::info!(store = self.store.name(), total, "history loaded");
        total
    }

    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<SharedHistory> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn history(&self) -> SharedHistory {
        self.tx.borrow().clone()
    }

    /// Pulls the snapshot source. `None` when no source is configured; an unreachable
    /// source counts as zero new entries.
    pub async fn refresh(&self) -> Option<MergeOutcome> {
        let source = self.source.as_ref()?;
        let incoming = match source.fetch_snapshots().await {
            Ok(incoming) => incoming,
            Err(err) => {
                tracing::warn!(source = source.source_name(), error = %format!("{err:#}"), "snapshot source unavailable");
                Vec::new()
            }
        };
        Some(self.add_snapshots(&incoming).await)
    }

    /// `None` when the text holds no dated snapshot.
    pub async fn add_text(&self, text: &str) -> Option<MergeOutcome> {
        let incoming = parse_snapshots(text)?;
        Some(self.add_snapshots(&incoming).await)
    }

    pub async fn add_snapshots(&self, incoming: &[Snapshot]) -> MergeOutcome {
        let current = self.history();
        let merged = merge_history(&current, incoming);
        let outcome = MergeOutcome {
            added: merged.len().saturating_sub(current.len()),
            total: merged.len(),
        };

        if outcome.added == 0 {
            tracing::debug!(incoming = incoming.len(), "no new dates to merge");
            return outcome;
        }

        self.commit(compute_metrics(&merged, &self.policy)).await;
        tracing::info!(added = outcome.added, total = outcome.total, "snapshots merged");
        outcome
    }

    pub async fn recompute(&self) -> usize {
        let history = compute_metrics(&self.history(), &self.policy);
        let total = history.len();
        self.commit(history).await;
        total
    }

    pub async fn clear(&self) {
        self.commit(Vec::new()).await;
        tracing::info!("history cleared");
    }

    pub fn latest_totals(&self) -> Option<RunningTotals> {
        self.history().last().and_then(|entry| entry.totals.clone())
    }

    pub fn day_metrics(&self, date: NaiveDate) -> Option<DayMetrics> {
        self.history()
            .iter()
            .find(|entry| entry.date == date)
            .map(day_metrics)
    }

    pub fn day_summary(&self) -> DaySummary {
        let history = self.history();
        let mut recent = history.iter().rev().map(day_metrics);
        let today = recent.next();
        let yesterday = recent.next();
        DaySummary { yesterday, today }
    }

    pub fn chart(&self, options: &ChartOptions) -> Vec<ChartRow> {
        project(&self.history(), options)
    }

    pub fn export_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self.history().as_slice()).context("failed to export history")
    }

    /// Calls `refresh` every `period` until the handle is aborted.
    pub fn spawn_auto_refresh(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; startup already loaded.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Some(outcome) = service.refresh().await {
                    tracing::debug!(added = outcome.added, total = outcome.total, "auto refresh");
                }
            }
        })
    }

    async fn commit(&self, history: Vec<Snapshot>) {
        if let Err(err) = self.store.save(&history).await {
            tracing::error!(store = self.store.name(), error = %format!("{err:#}"), "history save failed");
        }
        self.publish(history);
    }

    fn publish(&self, history: Vec<Snapshot>) {
        self.tx.send_replace(Arc::new(history));
    }
}
