pub mod error;
pub mod feed;
pub mod merge;
pub mod parse;
pub mod provider;

pub use error::ParseDiagnosticsError;
pub use feed::{load_prediction_feed, PredictionFeed};
pub use merge::{merge_history, merge_raw};
pub use parse::{parse_snapshots, try_parse_snapshots};
pub use provider::{DirectorySnapshotSource, HttpSnapshotSource, SnapshotSource};
