use crate::domain::contract::{has_string_date, snapshot_from_value, snapshots_from_values};
use crate::domain::Snapshot;
use crate::ingest::error::{ParseDiagnosticsError, StrategyFailure};
use serde_json::Value;

const FENCE: &str = "```";
const FENCE_TAGS: [&str; 2] = ["json", "snapshot"];
const EXCERPT_CHARS: usize = 200;

enum Attempt {
    Parsed(Vec<Snapshot>),
    /// Not applicable to this input; try the next strategy.
    Skipped(String),
    /// Input was understood but holds no snapshot; stop here.
    Rejected(String),
}

type Strategy = fn(&str) -> Attempt;

// Tried in order; the first `Parsed` wins.
const STRATEGIES: [(&str, Strategy); 3] = [
    ("fenced_blocks", parse_fenced_blocks),
    ("whole_text", parse_whole_text),
    ("line_objects", parse_line_objects),
];

/// Extracts snapshots from pasted text: fenced ```json blocks, a JSON array, a single
/// JSON object, or newline-separated objects. Empty input yields an empty list.
pub fn try_parse_snapshots(text: &str) -> Result<Vec<Snapshot>, ParseDiagnosticsError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut attempts = Vec::new();
    for (name, strategy) in STRATEGIES {
        match strategy(trimmed) {
            Attempt::Parsed(snapshots) => {
                tracing::debug!(strategy = name, count = snapshots.len(), "parsed snapshots");
                return Ok(snapshots);
            }
            Attempt::Skipped(detail) => attempts.push(StrategyFailure {
                strategy: name,
                detail,
            }),
            Attempt::Rejected(detail) => {
                attempts.push(StrategyFailure {
                    strategy: name,
                    detail,
                });
                break;
            }
        }
    }

    Err(ParseDiagnosticsError {
        attempts,
        excerpt: trimmed.chars().take(EXCERPT_CHARS).collect(),
    })
}

/// Like `try_parse_snapshots`, but logs the diagnostics and returns `None` on failure.
pub fn parse_snapshots(text: &str) -> Option<Vec<Snapshot>> {
    match try_parse_snapshots(text) {
        Ok(snapshots) => Some(snapshots),
        Err(err) => {
            tracing::warn!(error = %err, excerpt = %err.excerpt, "snapshot ingestion failed");
            None
        }
    }
}

/// Bodies of fenced blocks tagged `json` or `snapshot`. Fences pair up open/close; the
/// tag is the word right after the opening fence, so inline blocks are read too.
pub fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let tag_len = after_open
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(after_open.len());
        let (tag, body_and_rest) = after_open.split_at(tag_len);
        let Some(close) = body_and_rest.find(FENCE) else {
            break;
        };

        if FENCE_TAGS.contains(&tag.to_ascii_lowercase().as_str()) {
            out.push(body_and_rest[..close].trim());
        }
        rest = &body_and_rest[close + FENCE.len()..];
    }
    out
}

fn parse_fenced_blocks(text: &str) -> Attempt {
    let blocks = fenced_blocks(text);
    if blocks.is_empty() {
        return Attempt::Skipped("no fenced snapshot blocks".to_string());
    }

    let mut out = Vec::new();
    for (idx, block) in blocks.iter().enumerate() {
        let parsed = serde_json::from_str::<Value>(block)
            .map_err(anyhow::Error::from)
            .and_then(snapshot_from_value);
        match parsed {
            Ok(snapshot) => out.push(snapshot),
            Err(err) => tracing::debug!(idx, error = %format!("{err:#}"), "skipping fenced block"),
        }
    }

    if out.is_empty() {
        return Attempt::Skipped(format!("none of {} fenced blocks parsed", blocks.len()));
    }
    Attempt::Parsed(out)
}

fn parse_whole_text(text: &str) -> Attempt {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(v) => v,
        Err(err) => return Attempt::Skipped(format!("not valid JSON: {err}")),
    };

    match value {
        Value::Array(items) => {
            let dated = items.into_iter().filter(has_string_date);
            let out = snapshots_from_values(dated);
            if out.is_empty() {
                Attempt::Rejected("array holds no dated snapshot objects".to_string())
            } else {
                Attempt::Parsed(out)
            }
        }
        value if has_string_date(&value) => match snapshot_from_value(value) {
            Ok(snapshot) => Attempt::Parsed(vec![snapshot]),
            Err(err) => Attempt::Rejected(format!("{err:#}")),
        },
        _ => Attempt::Rejected("JSON is neither an array nor a dated object".to_string()),
    }
}

/// Splits before every `{` that starts a line and parses each chunk on its own.
fn split_line_objects(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices("\n{") {
        chunks.push(&text[start..idx]);
        start = idx + 1;
    }
    chunks.push(&text[start..]);
    chunks
        .into_iter()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

fn parse_line_objects(text: &str) -> Attempt {
    let values = split_line_objects(text)
        .into_iter()
        .filter_map(|chunk| serde_json::from_str::<Value>(chunk).ok())
        .filter(has_string_date);
    let out = snapshots_from_values(values);
    if out.is_empty() {
        return Attempt::Rejected("no line-delimited chunk parsed as a dated object".to_string());
    }
    Attempt::Parsed(out)
}
