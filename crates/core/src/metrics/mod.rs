pub mod aggregate;
pub mod scoring;

pub use aggregate::{compute_metrics, day_metrics, running_totals, DayMetrics};
pub use scoring::{DayScore, Move, ScoringPolicy, TradeDirection};
