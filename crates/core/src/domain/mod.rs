pub mod contract;
pub mod history;
pub mod snapshot;

pub use history::HistoryIndex;
pub use snapshot::{
    Action, Benchmark, BenchmarkRecord, Call, CallOutcome, RunningTotals, Snapshot, TickerRecord,
};
