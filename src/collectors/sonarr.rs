//! Sonarr series, episode and queue metrics.

use super::normalize::{FileProfile, MediaFile};
use super::timeline::{calendar_date, CumulativeSeries};
use super::*;
use crate::client::{get_as, get_list, Upstream};
use crate::errors::CollectorError;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, info};

/// File/codec breakdowns are sampled to bound the number of episode calls.
const SAMPLE_SERIES: usize = 10;
const SAMPLE_EPISODES: usize = 5;
const QUEUE_PAGE_SIZE: &str = "1000";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "crate::client::null_as_default")]
    pub genres: Vec<String>,
    pub status: Option<String>,
    pub added: Option<String>,
    #[serde(default, deserialize_with = "crate::client::null_as_default")]
    pub statistics: SeriesStatistics,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesStatistics {
    #[serde(default, deserialize_with = "crate::client::null_as_default")]
    pub episode_count: u64,
    #[serde(default, deserialize_with = "crate::client::null_as_default")]
    pub episode_file_count: u64,
    #[serde(default, deserialize_with = "crate::client::null_as_default")]
    pub size_on_disk: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub episode_file: Option<MediaFile>,
}

pub struct SonarrCollector {
    upstream: Box<dyn Upstream>,
}

impl SonarrCollector {
    pub fn new(upstream: Box<dyn Upstream>) -> Self {
        Self { upstream }
    }

    /// Metrics derived from the series list and its per-series statistics.
    pub fn library_metrics(series: &[Series], metrics: &mut MetricSet) {
        metrics.scalar("series_total", series.len() as f64);

        let stats = || series.iter().map(|s| &s.statistics);
        let episodes: u64 = stats().map(|s| s.episode_count).sum();
        let downloaded: u64 = stats().map(|s| s.episode_file_count).sum();
        let disk: u64 = stats().map(|s| s.size_on_disk).sum();

        metrics.scalar("episodes_total", episodes as f64);
        metrics.scalar("episodes_downloaded", downloaded as f64);
        metrics.scalar("episodes_missing", episodes as f64 - downloaded as f64);
        metrics.scalar("disk_usage_bytes", disk as f64);

        let sizes: Vec<f64> = stats()
            .filter(|s| s.size_on_disk > 0)
            .map(|s| s.size_on_disk as f64)
            .collect();
        metrics.average("avg_series_size_bytes", &sizes);

        let counts: Vec<f64> = stats()
            .filter(|s| s.episode_count > 0)
            .map(|s| s.episode_count as f64)
            .collect();
        metrics.average("avg_episodes_per_series", &counts);

        metrics.breakdown(
            "genres",
            tally(series.iter().flat_map(|s| s.genres.iter().cloned())),
        );
        metrics.breakdown(
            "series_by_status",
            tally(
                series
                    .iter()
                    .map(|s| s.status.clone().unwrap_or_else(|| "unknown".to_string())),
            ),
        );
        metrics.breakdown(
            "cumulative_episodes",
            cumulative_episodes(series).to_breakdown(),
        );
    }

    /// File and codec breakdowns, only when the sample found any files.
    pub fn file_metrics(profile: FileProfile, metrics: &mut MetricSet) {
        if profile.files == 0 {
            return;
        }
        metrics.breakdown("filetypes", profile.filetypes);
        metrics.breakdown("video_codecs", profile.video_codecs);
        metrics.breakdown("audio_codecs", profile.audio_codecs);
    }

    /// First few episodes of the first few series, in API order.
    async fn sample_files(&self, series: &[Series]) -> FileProfile {
        let mut profile = FileProfile::default();
        for id in series.iter().take(SAMPLE_SERIES).filter_map(|s| s.id) {
            let query = [
                ("seriesId", id.to_string()),
                ("includeEpisodeFile", "true".to_string()),
            ];
            let fetched = get_list::<Episode>(self.upstream.as_ref(), "episode", &query).await;
            let episodes = match fetched {
                Ok(episodes) => episodes,
                Err(e) => {
                    error!(service = "sonarr", endpoint = "episode", series_id = id, error = %e, "fetch failed");
                    continue;
                }
            };
            for file in episodes
                .iter()
                .take(SAMPLE_EPISODES)
                .filter_map(|ep| ep.episode_file.as_ref())
            {
                profile.record(file);
            }
        }
        debug!(files = profile.files, "sampled sonarr episode files");
        profile
    }

    async fn fetch_queue(&self) -> Option<QueuePage> {
        let query = [("pageSize", QUEUE_PAGE_SIZE.to_string())];
        match get_as(self.upstream.as_ref(), "queue", &query).await {
            Ok(queue) => Some(queue),
            Err(e) => {
                error!(service = "sonarr", endpoint = "queue", error = %e, "fetch failed");
                None
            }
        }
    }
}

/// Downloaded episode files attributed to the date each series was added.
pub fn cumulative_episodes(series: &[Series]) -> CumulativeSeries {
    CumulativeSeries::from_additions(series.iter().filter_map(|s| {
        let files = s.statistics.episode_file_count;
        if files == 0 {
            return None;
        }
        Some((calendar_date(s.added.as_deref()?)?, files))
    }))
}

#[async_trait]
impl Collector for SonarrCollector {
    fn name(&self) -> &'static str {
        "sonarr"
    }

    async fn collect(&mut self) -> Result<MetricSet, CollectorError> {
        let series: Vec<Series> = get_list(self.upstream.as_ref(), "series", &[])
            .await
            .map_err(|source| CollectorError::Unavailable {
                resource: "sonarr series list",
                source,
            })?;

        let mut metrics = MetricSet::new();
        Self::library_metrics(&series, &mut metrics);

        let profile = self.sample_files(&series).await;
        Self::file_metrics(profile, &mut metrics);

        if let Some(queue) = self.fetch_queue().await {
            queue_metrics(&queue, &mut metrics);
        }

        info!(
            series = series.len(),
            episodes = metrics.scalar_value("episodes_downloaded").unwrap_or_default(),
            "collected sonarr metrics"
        );
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::stub::StubUpstream;
    use serde_json::json;

    fn series(v: serde_json::Value) -> Vec<Series> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_totals_from_statistics() {
        let list = series(json!([
            {"status": "continuing", "genres": ["Drama"],
             "statistics": {"episodeCount": 10, "episodeFileCount": 8, "sizeOnDisk": 800}},
            {"status": "ended", "genres": ["Drama", "Sci-Fi"],
             "statistics": {"episodeCount": 4, "episodeFileCount": 4, "sizeOnDisk": 200}},
            {"genres": []}
        ]));
        let mut m = MetricSet::new();
        SonarrCollector::library_metrics(&list, &mut m);
        assert_eq!(m.scalar_value("series_total"), Some(3.0));
        assert_eq!(m.scalar_value("episodes_total"), Some(14.0));
        assert_eq!(m.scalar_value("episodes_downloaded"), Some(12.0));
        assert_eq!(m.scalar_value("episodes_missing"), Some(2.0));
        assert_eq!(m.scalar_value("disk_usage_bytes"), Some(1000.0));
        // the empty series is left out of both averages
        assert_eq!(m.scalar_value("avg_series_size_bytes"), Some(500.0));
        assert_eq!(m.scalar_value("avg_episodes_per_series"), Some(7.0));

        let status = m.breakdown_value("series_by_status").unwrap();
        assert_eq!(status["continuing"], 1.0);
        assert_eq!(status["ended"], 1.0);
        assert_eq!(status["unknown"], 1.0);
        assert_eq!(m.breakdown_value("genres").unwrap()["Drama"], 2.0);
    }

    #[test]
    fn test_averages_absent_for_empty_library() {
        let mut m = MetricSet::new();
        SonarrCollector::library_metrics(&[], &mut m);
        assert_eq!(m.scalar_value("series_total"), Some(0.0));
        assert!(!m.contains("avg_series_size_bytes"));
        assert!(!m.contains("avg_episodes_per_series"));
    }

    #[test]
    fn test_cumulative_episodes_weights_by_file_count() {
        let list = series(json!([
            {"added": "2024-01-03T00:00:00Z", "statistics": {"episodeFileCount": 3}},
            {"added": "2024-01-01T00:00:00Z", "statistics": {"episodeFileCount": 5}},
            {"added": "2024-01-02T00:00:00Z", "statistics": {"episodeFileCount": 0}},
            {"statistics": {"episodeFileCount": 9}}
        ]));
        let b = cumulative_episodes(&list).to_breakdown();
        assert_eq!(b.len(), 2);
        assert_eq!(b["2024-01-01"], 5.0);
        assert_eq!(b["2024-01-03"], 8.0);
    }

    #[test]
    fn test_file_metrics_skipped_without_samples() {
        let mut m = MetricSet::new();
        SonarrCollector::file_metrics(FileProfile::default(), &mut m);
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn test_sampling_is_bounded() {
        let many: Vec<serde_json::Value> = (1..=12).map(|id| json!({"id": id})).collect();
        let episodes: Vec<serde_json::Value> = (0..7)
            .map(|_| json!({"episodeFile": {"relativePath": "e.mkv", "mediaInfo": {"videoCodec": "h265"}}}))
            .collect();

        let mut stub = StubUpstream::new()
            .with("series", json!(many))
            .with("queue?pageSize=1000", json!({"records": [{"status": "downloading"}]}));
        for id in 1..=12 {
            stub = stub.with(
                &format!("episode?seriesId={id}&includeEpisodeFile=true"),
                json!(episodes),
            );
        }
        let mut collector = SonarrCollector::new(Box::new(stub));
        let m = collector.collect().await.unwrap();

        assert_eq!(m.breakdown_value("filetypes").unwrap()["mkv"], 50.0);
        assert_eq!(m.breakdown_value("video_codecs").unwrap()["HEVC"], 50.0);
        assert_eq!(m.scalar_value("queue_total"), Some(1.0));
        assert_eq!(m.scalar_value("queue_downloading"), Some(1.0));
    }

    #[tokio::test]
    async fn test_malformed_series_is_skipped() {
        let stub = StubUpstream::new().with(
            "series",
            json!([
                {"statistics": {"episodeCount": 6, "episodeFileCount": 6, "sizeOnDisk": 600}},
                {"genres": null, "statistics": null},
                {"statistics": {"episodeCount": "six"}}
            ]),
        );
        let mut collector = SonarrCollector::new(Box::new(stub));
        let m = tokio_test::assert_ok!(collector.collect().await);
        assert_eq!(m.scalar_value("series_total"), Some(2.0));
        assert_eq!(m.scalar_value("episodes_total"), Some(6.0));
        assert_eq!(m.scalar_value("disk_usage_bytes"), Some(600.0));
    }

    #[tokio::test]
    async fn test_episode_failures_do_not_abort() {
        let stub = StubUpstream::new()
            .with("series", json!([{"id": 1}, {"id": 2}]))
            .failing("episode?seriesId=1&includeEpisodeFile=true", 500)
            .with(
                "episode?seriesId=2&includeEpisodeFile=true",
                json!([{"episodeFile": {"relativePath": "x.mp4"}}, {"episodeFile": null}]),
            );
        let mut collector = SonarrCollector::new(Box::new(stub));
        let m = collector.collect().await.unwrap();
        assert_eq!(m.breakdown_value("filetypes").unwrap()["mp4"], 1.0);
        assert!(!m.contains("queue_total"));
    }
}
