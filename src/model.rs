use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dimensionality of the temporal feature encoding (see `features`).
pub const FEATURE_DIM: usize = 13;

/// Dense position of a record within one snapshot generation.
/// Stale after any rebuild; never hand out across a swap.
pub type Handle = usize;

/// A single payload value carried through the store untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Coerce a raw table cell: numeric-looking cells become numbers,
    /// everything else stays text.
    pub fn from_cell(cell: &str) -> Self {
        let trimmed = cell.trim();
        match trimmed.parse::<f64>() {
            Ok(n) => FieldValue::Number(n),
            Err(_) => FieldValue::Text(trimmed.to_string()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }
}

/// The atomic unit of the dataset: a parsed timestamp plus opaque
/// payload fields in source column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: NaiveDateTime,
    pub fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Outcome of a successful bulk load or restore.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSummary {
    pub accepted: usize,
    pub dropped: usize,
    pub range: Option<(NaiveDateTime, NaiveDateTime)>,
}

/// One ranked neighbor, handle resolved to its full record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub handle: Handle,
    pub distance: f64,
    pub record: Record,
}

/// Result of a query: hits in non-decreasing distance order, the
/// wall-clock time spent inside the index, and the normalized query
/// timestamp echoed back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub query_timestamp: NaiveDateTime,
    pub elapsed_ms: f64,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Error, PartialEq)]
pub enum LoadError {
    #[error("no timestamp column found (expected one of: timestamp, Timestamp, datetime, Date, time)")]
    MissingTimestampColumn,
    #[error("input is not a recognized tabular encoding")]
    UnsupportedFormat,
    #[error("no rows with a valid timestamp remained after filtering")]
    EmptyAfterFiltering,
}

#[derive(Debug, Error, PartialEq)]
pub enum AppendError {
    #[error("field '{0}' is not part of the existing schema")]
    SchemaMismatch(String),
    #[error("cannot coerce '{0}' to a timestamp")]
    InvalidTimestamp(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum SearchError {
    #[error("no dataset loaded")]
    DatasetNotLoaded,
    #[error("'{0}' is not a valid timestamp")]
    InvalidTimestampFormat(String),
    #[error("unknown index '{0}'")]
    UnknownIndex(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("no dataset loaded")]
    NotLoaded,
    #[error("snapshot serialization failed: {0}")]
    Encode(String),
    #[error("snapshot deserialization failed: {0}")]
    Decode(String),
}
