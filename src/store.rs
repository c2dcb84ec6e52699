use chrono::NaiveDateTime;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use tracing::warn;

use crate::features::{self, FeatureVector};
use crate::model::{AppendError, FieldValue, Handle, LoadError, LoadSummary, Record, SnapshotError};
use crate::parser::Table;

/// Primary timestamp column name, then the fallback priority list checked
/// when the primary is absent.
pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const TIMESTAMP_ALIASES: &[&str] = &["Timestamp", "datetime", "Date", "time"];

/// Canonical, ordered, append-only collection of ingested records.
/// Handles are dense positions; indices derive everything else from here.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    columns: Vec<String>,
    timestamp_column: String,
    records: Vec<Record>,
}

fn resolve_timestamp_column(columns: &[String]) -> Option<String> {
    if columns.iter().any(|c| c == TIMESTAMP_COLUMN) {
        return Some(TIMESTAMP_COLUMN.to_string());
    }
    TIMESTAMP_ALIASES
        .iter()
        .find(|alias| columns.iter().any(|c| c == *alias))
        .map(|alias| alias.to_string())
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace-style construction from a decoded table. Rows whose
    /// timestamp cell fails to parse are dropped and counted, not fatal;
    /// a load that filters away every row is.
    pub fn from_table(table: &Table) -> Result<(Self, LoadSummary), LoadError> {
        let timestamp_column =
            resolve_timestamp_column(&table.columns).ok_or(LoadError::MissingTimestampColumn)?;
        let ts_idx = table
            .columns
            .iter()
            .position(|c| *c == timestamp_column)
            .ok_or(LoadError::MissingTimestampColumn)?;

        let mut records = Vec::with_capacity(table.rows.len());
        let mut dropped = 0usize;

        for row in &table.rows {
            let Some(timestamp) = features::parse_timestamp(&row[ts_idx]) else {
                dropped += 1;
                continue;
            };
            let fields = table
                .columns
                .iter()
                .zip(row)
                .enumerate()
                .filter(|(i, _)| *i != ts_idx)
                .map(|(_, (name, cell))| (name.clone(), FieldValue::from_cell(cell)))
                .collect();
            records.push(Record { timestamp, fields });
        }

        if records.is_empty() {
            return Err(LoadError::EmptyAfterFiltering);
        }
        if dropped > 0 {
            warn!(dropped, accepted = records.len(), "dropped rows with invalid timestamps");
        }

        let store = Self {
            columns: table.columns.clone(),
            timestamp_column,
            records,
        };
        let summary = LoadSummary {
            accepted: store.records.len(),
            dropped,
            range: store.time_range(),
        };
        Ok((store, summary))
    }

    /// Append exactly one record.
    ///
    /// On a non-empty store the entry's field names must be a subset of the
    /// existing columns; new fields cannot be introduced here. An empty
    /// store adopts the entry's fields as its schema. Unlike bulk load,
    /// an unparseable timestamp is rejected outright.
    pub fn append(&mut self, fields: &[(String, FieldValue)]) -> Result<Handle, AppendError> {
        if self.columns.is_empty() {
            let names: Vec<String> = fields.iter().map(|(n, _)| n.clone()).collect();
            self.timestamp_column = resolve_timestamp_column(&names)
                .ok_or_else(|| AppendError::InvalidTimestamp("<missing>".to_string()))?;
            self.columns = names;
        } else {
            for (name, _) in fields {
                if !self.columns.iter().any(|c| c == name) {
                    return Err(AppendError::SchemaMismatch(name.clone()));
                }
            }
        }

        let ts_value = fields
            .iter()
            .find(|(n, _)| *n == self.timestamp_column)
            .map(|(_, v)| v)
            .ok_or_else(|| AppendError::InvalidTimestamp("<missing>".to_string()))?;
        let timestamp = coerce_timestamp(ts_value)?;

        let payload = fields
            .iter()
            .filter(|(n, _)| *n != self.timestamp_column)
            .cloned()
            .collect();
        self.records.push(Record {
            timestamp,
            fields: payload,
        });
        Ok(self.records.len() - 1)
    }

    /// Feature vectors for the current contents, in handle order.
    pub fn snapshot_features(&self) -> Vec<FeatureVector> {
        self.records
            .iter()
            .map(|r| features::encode_datetime(r.timestamp))
            .collect()
    }

    pub fn get(&self, handle: Handle) -> Option<&Record> {
        self.records.get(handle)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let min = self.records.iter().map(|r| r.timestamp).min()?;
        let max = self.records.iter().map(|r| r.timestamp).max()?;
        Some((min, max))
    }
}

fn coerce_timestamp(value: &FieldValue) -> Result<NaiveDateTime, AppendError> {
    match value {
        FieldValue::Text(text) => features::parse_timestamp(text)
            .ok_or_else(|| AppendError::InvalidTimestamp(text.clone())),
        FieldValue::Number(secs) => chrono::DateTime::from_timestamp(*secs as i64, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| AppendError::InvalidTimestamp(secs.to_string())),
    }
}

// --- SNAPSHOTS ---
//
// Only the record set is persisted; indices are derived state and are
// always rebuilt from data on restore.

#[derive(Archive, RkyvDeserialize, RkyvSerialize)]
#[archive(check_bytes)]
enum SnapshotValue {
    Number(f64),
    Text(String),
}

#[derive(Archive, RkyvDeserialize, RkyvSerialize)]
#[archive(check_bytes)]
struct SnapshotRecord {
    ts_secs: i64,
    fields: Vec<(String, SnapshotValue)>,
}

#[derive(Archive, RkyvDeserialize, RkyvSerialize)]
#[archive(check_bytes)]
struct SnapshotStore {
    columns: Vec<String>,
    timestamp_column: String,
    records: Vec<SnapshotRecord>,
}

impl RecordStore {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let archived = SnapshotStore {
            columns: self.columns.clone(),
            timestamp_column: self.timestamp_column.clone(),
            records: self
                .records
                .iter()
                .map(|r| SnapshotRecord {
                    ts_secs: r.timestamp.and_utc().timestamp(),
                    fields: r
                        .fields
                        .iter()
                        .map(|(n, v)| {
                            let v = match v {
                                FieldValue::Number(x) => SnapshotValue::Number(*x),
                                FieldValue::Text(s) => SnapshotValue::Text(s.clone()),
                            };
                            (n.clone(), v)
                        })
                        .collect(),
                })
                .collect(),
        };

        let bytes = rkyv::to_bytes::<_, 4096>(&archived)
            .map_err(|e| SnapshotError::Encode(e.to_string()))?;
        Ok(bytes.into_vec())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let archived: SnapshotStore = rkyv::from_bytes(bytes)
            .map_err(|e| SnapshotError::Decode(format!("{e:?}")))?;

        let mut records = Vec::with_capacity(archived.records.len());
        for rec in archived.records {
            let timestamp = chrono::DateTime::from_timestamp(rec.ts_secs, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| {
                    SnapshotError::Decode(format!("timestamp {} out of range", rec.ts_secs))
                })?;
            let fields = rec
                .fields
                .into_iter()
                .map(|(n, v)| {
                    let v = match v {
                        SnapshotValue::Number(x) => FieldValue::Number(x),
                        SnapshotValue::Text(s) => FieldValue::Text(s),
                    };
                    (n, v)
                })
                .collect();
            records.push(Record { timestamp, fields });
        }

        Ok(Self {
            columns: archived.columns,
            timestamp_column: archived.timestamp_column,
            records,
        })
    }
}
