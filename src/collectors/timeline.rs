//! Timestamp parsing and cumulative-over-time series.

use super::Breakdown;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;

/// Parse an upstream timestamp. RFC 3339 first, then a naive ISO form taken
/// as UTC. `None` means the record is skipped.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Seconds from `start` to `end`, negative when `end` comes first.
pub fn seconds_between(start: &DateTime<Utc>, end: &DateTime<Utc>) -> f64 {
    (*end - *start).num_milliseconds() as f64 / 1000.0
}

/// Calendar-date portion of a `YYYY-MM-DDT...` timestamp.
pub fn calendar_date(raw: &str) -> Option<NaiveDate> {
    let date = raw.split('T').next()?;
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()
}

/// Running total keyed by ascending date, one point per date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CumulativeSeries {
    points: Vec<(NaiveDate, u64)>,
}

impl CumulativeSeries {
    /// Tally `(date, count)` additions per date and accumulate in date order.
    pub fn from_additions<I>(additions: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, u64)>,
    {
        let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for (date, count) in additions {
            *per_day.entry(date).or_insert(0) += count;
        }

        let mut total = 0u64;
        let points = per_day
            .into_iter()
            .map(|(date, count)| {
                total += count;
                (date, total)
            })
            .collect();
        Self { points }
    }

    pub fn points(&self) -> &[(NaiveDate, u64)] {
        &self.points
    }

    /// Exposed as a breakdown labelled by `YYYY-MM-DD`.
    pub fn to_breakdown(&self) -> Breakdown {
        self.points
            .iter()
            .map(|(date, total)| (date.format("%Y-%m-%d").to_string(), *total as f64))
            .collect()
    }
}

/// Milliseconds since the epoch at UTC midnight of `date`.
pub fn utc_midnight_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp_millis())
        .unwrap_or_default()
}
