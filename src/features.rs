use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::model::FEATURE_DIM;

/// Fixed-length numeric encoding of a timestamp; the unit of distance
/// comparison for every index variant.
pub type FeatureVector = [f64; FEATURE_DIM];

/// Textual forms accepted for query and ingestion timestamps.
/// Minute resolution is the canonical granularity; a bare date parses
/// to midnight.
const ACCEPTED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for fmt in ACCEPTED_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Encode a parsed timestamp.
///
/// Layout: `[unix_seconds, hour_sin, hour_cos, day_of_week, month, hour,
/// minute, day_of_month, iso_week, day_of_year, year, second_half_of_year,
/// night]`. Day-of-week is Monday=0..Sunday=6; week numbering follows the
/// ISO-8601 rule. The cyclical hour encoding uses a period of 23, matching
/// the system this replaces.
pub fn encode_datetime(dt: NaiveDateTime) -> FeatureVector {
    let hour = dt.hour() as f64;
    let night = dt.hour() >= 18 || dt.hour() <= 6;
    [
        dt.and_utc().timestamp() as f64,
        (2.0 * PI * hour / 23.0).sin(),
        (2.0 * PI * hour / 23.0).cos(),
        dt.weekday().num_days_from_monday() as f64,
        dt.month() as f64,
        hour,
        dt.minute() as f64,
        dt.day() as f64,
        dt.iso_week().week() as f64,
        dt.ordinal() as f64,
        dt.year() as f64,
        (dt.month() > 6) as u8 as f64,
        night as u8 as f64,
    ]
}

/// Total encoding of timestamp text. Never fails: unparseable input maps
/// to the all-zero vector. Callers that must distinguish bad input use
/// [`parse_timestamp`] first.
pub fn encode(text: &str) -> FeatureVector {
    match parse_timestamp(text) {
        Some(dt) => encode_datetime(dt),
        None => [0.0; FEATURE_DIM],
    }
}

/// Encode a batch in input order, one vector per input.
pub fn encode_many<'a, I>(texts: I) -> Vec<FeatureVector>
where
    I: IntoIterator<Item = &'a str>,
{
    texts.into_iter().map(encode).collect()
}
