pub mod features;
pub mod index;
pub mod lsh;
pub mod model;
pub mod parser;
pub mod store;
pub mod vector;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use tracing::info;

use crate::features::{encode_datetime, parse_timestamp};
use crate::index::{IndexKind, VectorIndex};
use crate::model::{
    AppendError, FieldValue, Handle, LoadError, LoadSummary, Record, SearchError, SearchHit,
    SearchOutcome, SnapshotError,
};
use crate::parser::TableFormat;
use crate::store::RecordStore;
use crate::vector::Metric;

/// One generation of (record store, index set). Queries hold an `Arc` to
/// a stable generation; mutations build a complete replacement before it
/// becomes visible.
struct Snapshot {
    store: RecordStore,
    indices: HashMap<String, Box<dyn VectorIndex>>,
}

/// The temporal nearest-neighbor search engine.
///
/// An explicitly owned service object: callers hold it by reference, there
/// are no ambient globals. Mutations (`load_dataset`, `add_record`,
/// `restore`) are serialized through a writer lock and follow the
/// rebuild-then-swap discipline; every configured index is rebuilt from
/// the new record set before the single atomic swap, so concurrent
/// queries never observe a half-rebuilt index set. Rebuilding on every
/// append is O(n) and deliberate: additions here are human-triggered, not
/// high-frequency streaming.
pub struct KairosEngine {
    kinds: Vec<(String, IndexKind)>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    write_lock: Mutex<()>,
}

impl fmt::Debug for KairosEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KairosEngine")
            .field("indices", &self.index_names())
            .field("records", &self.len())
            .finish()
    }
}

/// The default registry: two exact trees, two brute-force baselines for
/// latency comparison, and the approximate LSH variant.
fn default_indices() -> Vec<(String, IndexKind)> {
    vec![
        ("kd_tree".to_string(), IndexKind::KdTree),
        ("ball_tree".to_string(), IndexKind::BallTree),
        (
            "knn_euclidean".to_string(),
            IndexKind::BruteForce(Metric::Euclidean),
        ),
        (
            "knn_manhattan".to_string(),
            IndexKind::BruteForce(Metric::Manhattan),
        ),
        ("lsh".to_string(), IndexKind::Lsh),
    ]
}

impl KairosEngine {
    pub fn new() -> Self {
        Self::with_indices(default_indices())
    }

    pub fn with_indices(kinds: Vec<(String, IndexKind)>) -> Self {
        Self {
            kinds,
            snapshot: RwLock::new(None),
            write_lock: Mutex::new(()),
        }
    }

    pub fn index_names(&self) -> Vec<String> {
        self.kinds.iter().map(|(name, _)| name.clone()).collect()
    }

    fn current(&self) -> Option<Arc<Snapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn rebuild(&self, store: RecordStore) -> Snapshot {
        let vectors = store.snapshot_features();
        let indices = self
            .kinds
            .iter()
            .map(|(name, kind)| (name.clone(), kind.build(&vectors)))
            .collect();
        Snapshot { store, indices }
    }

    fn install(&self, snapshot: Snapshot) {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Arc::new(snapshot));
    }

    /// Replace the dataset from a tabular byte source and rebuild every
    /// configured index. A failed load leaves the previous dataset fully
    /// intact and queryable.
    pub fn load_dataset(&self, bytes: &[u8], format: TableFormat) -> Result<LoadSummary, LoadError> {
        let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let table = parser::decode_table(bytes, format)?;
        let (store, summary) = RecordStore::from_table(&table)?;
        info!(
            accepted = summary.accepted,
            dropped = summary.dropped,
            "dataset loaded, rebuilding indices"
        );
        self.install(self.rebuild(store));
        Ok(summary)
    }

    /// Append a single record and rebuild every configured index. The
    /// store copy is mutated first; a rejected append never triggers a
    /// rebuild or a swap.
    pub fn add_record(&self, fields: &[(String, FieldValue)]) -> Result<Handle, AppendError> {
        let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut store = match self.current() {
            Some(snap) => snap.store.clone(),
            None => RecordStore::new(),
        };
        let handle = store.append(fields)?;
        info!(records = store.len(), "record appended, rebuilding indices");
        self.install(self.rebuild(store));
        Ok(handle)
    }

    /// k-nearest-neighbor query against a named index.
    ///
    /// Elapsed time covers the index query call only, not timestamp
    /// encoding. An empty hit list is a valid success value; the
    /// approximate index in particular may find no bucket collisions.
    pub fn search(
        &self,
        timestamp_text: &str,
        index_name: &str,
        k: usize,
    ) -> Result<SearchOutcome, SearchError> {
        let snap = self.current().ok_or(SearchError::DatasetNotLoaded)?;
        let query_timestamp = parse_timestamp(timestamp_text)
            .ok_or_else(|| SearchError::InvalidTimestampFormat(timestamp_text.to_string()))?;
        let index = snap
            .indices
            .get(index_name)
            .ok_or_else(|| SearchError::UnknownIndex(index_name.to_string()))?;

        let query = encode_datetime(query_timestamp);
        let started = Instant::now();
        let ranked = index.query(&query, k);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let hits = ranked
            .into_iter()
            .filter_map(|(handle, distance)| {
                snap.store.get(handle).map(|record| SearchHit {
                    handle,
                    distance,
                    record: record.clone(),
                })
            })
            .collect();

        Ok(SearchOutcome {
            query_timestamp,
            elapsed_ms,
            hits,
        })
    }

    pub fn record(&self, handle: Handle) -> Option<Record> {
        self.current()?.store.get(handle).cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    pub fn len(&self) -> usize {
        self.current().map(|s| s.store.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn time_range(&self) -> Option<(chrono::NaiveDateTime, chrono::NaiveDateTime)> {
        self.current()?.store.time_range()
    }

    // --- SNAPSHOTS ---

    /// Serialize the current record set. Indices are derived state and are
    /// never persisted.
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let snap = self.current().ok_or(SnapshotError::NotLoaded)?;
        snap.store.to_bytes()
    }

    /// Hydrate a previously serialized record set and rebuild all indices.
    pub fn restore(&self, bytes: &[u8]) -> Result<LoadSummary, SnapshotError> {
        let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let store = RecordStore::from_bytes(bytes)?;
        let summary = LoadSummary {
            accepted: store.len(),
            dropped: 0,
            range: store.time_range(),
        };
        info!(records = store.len(), "snapshot restored, rebuilding indices");
        self.install(self.rebuild(store));
        Ok(summary)
    }
}

impl Default for KairosEngine {
    fn default() -> Self {
        Self::new()
    }
}
