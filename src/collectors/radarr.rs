//! Radarr library, queue and history metrics.
//!
//! The movie list is the primary resource: without it nothing is reported.
//! Queue and history feed independent sub-metrics; a failure there is logged
//! and only drops the metrics derived from that call.

use super::normalize::{FileProfile, MediaFile};
use super::timeline::{calendar_date, parse_timestamp, seconds_between, CumulativeSeries};
use super::*;
use crate::client::{get_as, get_list, Upstream};
use crate::errors::CollectorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{error, info};

/// History event type filters understood by the Radarr API.
const EVENT_GRABBED: &str = "1";
const EVENT_IMPORTED: &str = "3";
const HISTORY_PAGE_SIZE: &str = "100";
const QUEUE_PAGE_SIZE: &str = "1000";

/// Grab-to-import durations at or beyond this are treated as stale pairs.
const MAX_IMPORT_SECS: f64 = 7.0 * 86_400.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    #[serde(default, deserialize_with = "crate::client::null_as_default")]
    pub has_file: bool,
    #[serde(default, deserialize_with = "crate::client::null_as_default")]
    pub size_on_disk: u64,
    #[serde(default, deserialize_with = "crate::client::null_as_default")]
    pub genres: Vec<String>,
    pub year: Option<u32>,
    pub movie_file: Option<MediaFile>,
    pub added: Option<String>,
    pub quality_profile_id: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    #[serde(default, deserialize_with = "crate::client::lenient_records")]
    pub records: Vec<HistoryRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub movie_id: Option<i64>,
    pub event_type: Option<String>,
    pub date: Option<String>,
}

pub struct RadarrCollector {
    upstream: Box<dyn Upstream>,
}

impl RadarrCollector {
    pub fn new(upstream: Box<dyn Upstream>) -> Self {
        Self { upstream }
    }

    /// Library-wide metrics derived from the movie list alone.
    pub fn library_metrics(movies: &[Movie], metrics: &mut MetricSet) {
        let with_file: Vec<&Movie> = movies.iter().filter(|m| m.has_file).collect();
        let total = movies.len();

        metrics.scalar("movies_total", total as f64);
        metrics.scalar("movies_downloaded", with_file.len() as f64);
        metrics.scalar("movies_missing", (total - with_file.len()) as f64);

        let disk: u64 = with_file.iter().map(|m| m.size_on_disk).sum();
        metrics.scalar("disk_usage_bytes", disk as f64);
        if !with_file.is_empty() {
            metrics.scalar("avg_movie_size_bytes", disk as f64 / with_file.len() as f64);
        }

        metrics.breakdown(
            "genres",
            tally(movies.iter().flat_map(|m| m.genres.iter().cloned())),
        );
        metrics.breakdown(
            "movies_by_year",
            tally(
                movies
                    .iter()
                    .filter_map(|m| m.year.filter(|y| *y > 0))
                    .map(|y| y.to_string()),
            ),
        );

        let mut profile = FileProfile::default();
        for file in with_file.iter().filter_map(|m| m.movie_file.as_ref()) {
            profile.record(file);
        }
        metrics.breakdown("filetypes", profile.filetypes);
        metrics.breakdown("video_codecs", profile.video_codecs);
        metrics.breakdown("audio_codecs", profile.audio_codecs);

        metrics.breakdown("cumulative_movies", cumulative_movies(movies).to_breakdown());

        metrics.breakdown(
            "quality_profiles",
            tally(
                movies
                    .iter()
                    .filter_map(|m| m.quality_profile_id.filter(|id| *id > 0))
                    .map(|id| format!("profile_{id}")),
            ),
        );
    }

    /// Queue totals plus the mean expected duration of active downloads.
    pub fn queue_metrics(queue: &QueuePage, metrics: &mut MetricSet) {
        super::queue_metrics(queue, metrics);
        metrics.average("avg_download_time_seconds", &active_download_durations(queue));
    }

    async fn fetch_queue(&self) -> Option<QueuePage> {
        let query = [("pageSize", QUEUE_PAGE_SIZE.to_string())];
        match get_as(self.upstream.as_ref(), "queue", &query).await {
            Ok(queue) => Some(queue),
            Err(e) => {
                error!(service = "radarr", endpoint = "queue", error = %e, "fetch failed");
                None
            }
        }
    }

    async fn fetch_history(&self, event_type: &str) -> Option<HistoryPage> {
        let query = [
            ("pageSize", HISTORY_PAGE_SIZE.to_string()),
            ("eventType", event_type.to_string()),
        ];
        match get_as(self.upstream.as_ref(), "history", &query).await {
            Ok(page) => Some(page),
            Err(e) => {
                error!(service = "radarr", endpoint = "history", event_type, error = %e, "fetch failed");
                None
            }
        }
    }

    /// Mean grab-to-import time over the latest history pages.
    async fn import_time(&self, metrics: &mut MetricSet) {
        let Some(grabbed) = self.fetch_history(EVENT_GRABBED).await else {
            return;
        };
        let grabs = grab_index(&grabbed.records);
        if grabs.is_empty() {
            return;
        }
        let Some(imported) = self.fetch_history(EVENT_IMPORTED).await else {
            return;
        };
        metrics.average(
            "avg_import_time_seconds",
            &import_durations(&grabs, &imported.records),
        );
    }
}

/// Cumulative count of movies by the date they were added.
pub fn cumulative_movies(movies: &[Movie]) -> CumulativeSeries {
    CumulativeSeries::from_additions(
        movies
            .iter()
            .filter_map(|m| m.added.as_deref().and_then(calendar_date))
            .map(|date| (date, 1)),
    )
}

/// Positive `estimatedCompletionTime - added` for downloading records.
pub fn active_download_durations(queue: &QueuePage) -> Vec<f64> {
    queue
        .records
        .iter()
        .filter(|r| r.is_downloading())
        .filter_map(|r| {
            let added = parse_timestamp(r.added.as_deref()?)?;
            let eta = parse_timestamp(r.estimated_completion_time.as_deref()?)?;
            Some(seconds_between(&added, &eta))
        })
        .filter(|secs| *secs > 0.0)
        .collect()
}

/// movie id -> grab time, from records marked `grabbed`.
pub fn grab_index(records: &[HistoryRecord]) -> HashMap<i64, DateTime<Utc>> {
    records
        .iter()
        .filter(|r| r.event_type.as_deref() == Some("grabbed"))
        .filter_map(|r| Some((r.movie_id?, parse_timestamp(r.date.as_deref()?)?)))
        .collect()
}

/// A grab/import pair counts when the import lands after the grab and
/// within the window.
pub fn is_plausible_import(secs: f64) -> bool {
    secs > 0.0 && secs < MAX_IMPORT_SECS
}

/// Durations for imports whose movie has a known grab.
pub fn import_durations(grabs: &HashMap<i64, DateTime<Utc>>, imports: &[HistoryRecord]) -> Vec<f64> {
    imports
        .iter()
        .filter_map(|r| {
            let grabbed_at = grabs.get(&r.movie_id?)?;
            let imported_at = parse_timestamp(r.date.as_deref()?)?;
            Some(seconds_between(grabbed_at, &imported_at))
        })
        .filter(|secs| is_plausible_import(*secs))
        .collect()
}

#[async_trait]
impl Collector for RadarrCollector {
    fn name(&self) -> &'static str {
        "radarr"
    }

    async fn collect(&mut self) -> Result<MetricSet, CollectorError> {
        let movies: Vec<Movie> = get_list(self.upstream.as_ref(), "movie", &[])
            .await
            .map_err(|source| CollectorError::Unavailable {
                resource: "radarr movie list",
                source,
            })?;

        let mut metrics = MetricSet::new();
        Self::library_metrics(&movies, &mut metrics);

        if let Some(queue) = self.fetch_queue().await {
            Self::queue_metrics(&queue, &mut metrics);
        }
        self.import_time(&mut metrics).await;

        info!(
            total = movies.len(),
            downloaded = movies.iter().filter(|m| m.has_file).count(),
            "collected radarr metrics"
        );
        Ok(metrics)
    }
}
