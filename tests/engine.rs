//! End-to-end scenarios across the load / append / search surface.

use kairos::features::parse_timestamp;
use kairos::model::{AppendError, FieldValue, LoadError, SearchError};
use kairos::parser::TableFormat;
use kairos::KairosEngine;

const DATASET: &str = "timestamp,power,status\n\
                       2023-01-01 00:00,10.0,ok\n\
                       2023-01-02 00:00,11.5,ok\n\
                       2023-01-03 00:00,12.0,warn\n\
                       2023-01-04 00:00,9.8,ok\n\
                       2023-01-05 00:00,10.7,ok\n";

const EXACT_INDICES: &[&str] = &["kd_tree", "ball_tree", "knn_euclidean", "knn_manhattan"];

fn loaded_engine() -> KairosEngine {
    let engine = KairosEngine::new();
    engine
        .load_dataset(DATASET.as_bytes(), TableFormat::Delimited)
        .unwrap();
    engine
}

fn entry(pairs: &[(&str, FieldValue)]) -> Vec<(String, FieldValue)> {
    pairs
        .iter()
        .map(|(n, v)| (n.to_string(), v.clone()))
        .collect()
}

#[test]
fn search_before_any_load_fails() {
    let engine = KairosEngine::new();
    let err = engine.search("2023-01-01 00:00", "kd_tree", 5).unwrap_err();
    assert_eq!(err, SearchError::DatasetNotLoaded);
}

#[test]
fn load_reports_counts_and_time_range() {
    let engine = KairosEngine::new();
    let summary = engine
        .load_dataset(DATASET.as_bytes(), TableFormat::Delimited)
        .unwrap();
    assert_eq!(summary.accepted, 5);
    assert_eq!(summary.dropped, 0);
    let (min, max) = summary.range.unwrap();
    assert_eq!(min, parse_timestamp("2023-01-01 00:00").unwrap());
    assert_eq!(max, parse_timestamp("2023-01-05 00:00").unwrap());
}

#[test]
fn chronologically_nearest_records_win() {
    let engine = loaded_engine();
    let outcome = engine.search("2023-01-03 00:00", "kd_tree", 3).unwrap();
    assert_eq!(outcome.hits.len(), 3);

    // The record at the query timestamp itself comes first, at distance 0.
    assert_eq!(outcome.hits[0].handle, 2);
    assert_eq!(outcome.hits[0].distance, 0.0);

    // The other two are the chronological neighbors, one day away each.
    let mut handles: Vec<_> = outcome.hits.iter().map(|h| h.handle).collect();
    handles.sort();
    assert_eq!(handles, vec![1, 2, 3]);

    assert_eq!(
        outcome.query_timestamp,
        parse_timestamp("2023-01-03 00:00").unwrap()
    );
}

#[test]
fn results_are_bounded_by_k_and_sorted() {
    let engine = loaded_engine();
    for index in EXACT_INDICES {
        for k in [0, 1, 3, 5, 50] {
            let outcome = engine.search("2023-01-02 12:00", index, k).unwrap();
            assert!(outcome.hits.len() <= k);
            assert!(outcome.hits.len() <= 5);
            for pair in outcome.hits.windows(2) {
                assert!(pair[0].distance <= pair[1].distance);
            }
        }
    }
}

#[test]
fn appended_record_is_retrievable_at_distance_zero() {
    let engine = loaded_engine();
    let handle = engine
        .add_record(&entry(&[
            ("timestamp", FieldValue::Text("2023-01-06 09:30".into())),
            ("power", FieldValue::Number(13.1)),
            ("status", FieldValue::Text("ok".into())),
        ]))
        .unwrap();
    assert_eq!(handle, 5);
    assert_eq!(engine.len(), 6);

    for index in EXACT_INDICES {
        let outcome = engine.search("2023-01-06 09:30", index, 1).unwrap();
        assert_eq!(outcome.hits.len(), 1, "index {index}");
        assert_eq!(outcome.hits[0].handle, 5);
        assert_eq!(outcome.hits[0].distance, 0.0);
        assert_eq!(
            outcome.hits[0].record.timestamp,
            parse_timestamp("2023-01-06 09:30").unwrap()
        );
    }
}

#[test]
fn schema_mismatch_rejects_append_without_rebuild() {
    let engine = loaded_engine();
    let err = engine
        .add_record(&entry(&[
            ("timestamp", FieldValue::Text("2023-01-06 00:00".into())),
            ("brand_new_field", FieldValue::Number(1.0)),
        ]))
        .unwrap_err();
    assert_eq!(err, AppendError::SchemaMismatch("brand_new_field".into()));
    assert_eq!(engine.len(), 5);

    // The previous snapshot is still fully queryable.
    let outcome = engine.search("2023-01-03 00:00", "kd_tree", 1).unwrap();
    assert_eq!(outcome.hits[0].handle, 2);
}

#[test]
fn append_with_invalid_timestamp_is_rejected() {
    let engine = loaded_engine();
    let err = engine
        .add_record(&entry(&[
            ("timestamp", FieldValue::Text("not-a-date".into())),
            ("power", FieldValue::Number(1.0)),
        ]))
        .unwrap_err();
    assert_eq!(err, AppendError::InvalidTimestamp("not-a-date".into()));
    assert_eq!(engine.len(), 5);
}

#[test]
fn failed_load_leaves_previous_dataset_intact() {
    let engine = loaded_engine();

    let err = engine
        .load_dataset(b"a,b\n1,2\n", TableFormat::Delimited)
        .unwrap_err();
    assert_eq!(err, LoadError::MissingTimestampColumn);

    let err = engine
        .load_dataset(&[0xff, 0xfe], TableFormat::Delimited)
        .unwrap_err();
    assert_eq!(err, LoadError::UnsupportedFormat);

    let err = engine
        .load_dataset(b"timestamp,v\nbad,1\n", TableFormat::Delimited)
        .unwrap_err();
    assert_eq!(err, LoadError::EmptyAfterFiltering);

    // All three failures left the original five records queryable.
    assert_eq!(engine.len(), 5);
    let outcome = engine.search("2023-01-01 00:00", "ball_tree", 2).unwrap();
    assert_eq!(outcome.hits[0].handle, 0);
    assert_eq!(outcome.hits[0].distance, 0.0);
}

#[test]
fn malformed_query_timestamp_is_an_error() {
    let engine = loaded_engine();
    let err = engine.search("not-a-date", "kd_tree", 5).unwrap_err();
    assert_eq!(err, SearchError::InvalidTimestampFormat("not-a-date".into()));
}

#[test]
fn unknown_index_is_an_error() {
    let engine = loaded_engine();
    let err = engine.search("2023-01-01 00:00", "vp_tree", 5).unwrap_err();
    assert_eq!(err, SearchError::UnknownIndex("vp_tree".into()));
}

#[test]
fn lsh_results_are_a_subset_of_loaded_records() {
    let engine = loaded_engine();

    // A dataset timestamp guarantees a bucket collision with itself.
    let outcome = engine.search("2023-01-03 00:00", "lsh", 5).unwrap();
    assert!(outcome.hits.len() <= 5);
    assert!(outcome.hits.iter().any(|h| h.handle == 2 && h.distance == 0.0));
    for hit in &outcome.hits {
        assert!(hit.handle < 5);
    }

    // A query far from everything may return nothing; still a success.
    let outcome = engine.search("1970-01-01 00:00", "lsh", 5).unwrap();
    assert!(outcome.hits.len() <= 5);
}

#[test]
fn append_to_fresh_engine_defines_the_dataset() {
    let engine = KairosEngine::new();
    assert!(!engine.is_loaded());
    engine
        .add_record(&entry(&[
            ("timestamp", FieldValue::Text("2023-03-03 03:03".into())),
            ("power", FieldValue::Number(5.0)),
        ]))
        .unwrap();
    assert!(engine.is_loaded());
    let outcome = engine.search("2023-03-03 03:03", "kd_tree", 1).unwrap();
    assert_eq!(outcome.hits[0].distance, 0.0);
}

#[test]
fn tsv_spreadsheet_export_loads() {
    let engine = KairosEngine::new();
    let src = "timestamp\tpower\n2023-01-01 00:00\t1.0\n2023-01-02 00:00\t2.0\n";
    let summary = engine
        .load_dataset(src.as_bytes(), TableFormat::Spreadsheet)
        .unwrap();
    assert_eq!(summary.accepted, 2);
}

#[test]
fn snapshot_round_trip_restores_a_queryable_dataset() {
    let engine = loaded_engine();
    let bytes = engine.snapshot_bytes().unwrap();

    let restored = KairosEngine::new();
    let summary = restored.restore(&bytes).unwrap();
    assert_eq!(summary.accepted, 5);
    assert_eq!(restored.len(), 5);

    let a = engine.search("2023-01-04 00:00", "kd_tree", 3).unwrap();
    let b = restored.search("2023-01-04 00:00", "kd_tree", 3).unwrap();
    let ah: Vec<_> = a.hits.iter().map(|h| (h.handle, h.distance)).collect();
    let bh: Vec<_> = b.hits.iter().map(|h| (h.handle, h.distance)).collect();
    assert_eq!(ah, bh);
}

#[test]
fn elapsed_time_is_reported() {
    let engine = loaded_engine();
    let outcome = engine.search("2023-01-02 00:00", "knn_euclidean", 5).unwrap();
    assert!(outcome.elapsed_ms >= 0.0);
}
