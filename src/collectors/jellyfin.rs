//! Jellyfin session, user and playback metrics.
//!
//! Sessions and users come from the core API. Everything else depends on the
//! user_usage_stats plugin, which may not be installed: each of those calls
//! is tried independently and simply left out when it does not answer.
//! List answers are decoded record by record, so one malformed entry only
//! drops itself.

use super::normalize::UNKNOWN;
use super::*;
use crate::client::{get_list, post_as, Query, Upstream};
use crate::errors::CollectorError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

const TOP_N: usize = 10;
const REPORT_DAYS: &str = "30";

const PLAYBACK_QUERY: &str = "SELECT ROWID, * FROM PlaybackActivity \
    WHERE DateCreated >= datetime('now', '-30 days') \
    ORDER BY DateCreated DESC";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Session {
    pub now_playing_item: Option<NowPlaying>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NowPlaying {
    #[serde(rename = "Type")]
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    pub id: Option<String>,
}

/// Tabular answer of the plugin's custom query endpoint. The plugin spells
/// the column list `colums`; both spellings are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResult {
    #[serde(
        default,
        alias = "colums",
        deserialize_with = "crate::client::null_as_default"
    )]
    pub columns: Vec<String>,
    #[serde(default, deserialize_with = "crate::client::lenient_records")]
    pub results: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Value of `column` in each row, `None` where the row has no such cell.
    fn column<'a>(&'a self, column: &str) -> impl Iterator<Item = Option<&'a Value>> + 'a {
        let idx = self.columns.iter().position(|c| c == column);
        self.results
            .iter()
            .map(move |row| idx.and_then(|i| row.get(i)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserActivity {
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "crate::client::null_as_default")]
    pub total_count: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportEntry {
    pub label: Option<String>,
    #[serde(default, deserialize_with = "crate::client::null_as_default")]
    pub count: f64,
}

pub struct JellyfinCollector {
    upstream: Box<dyn Upstream>,
}

impl JellyfinCollector {
    pub fn new(upstream: Box<dyn Upstream>) -> Self {
        Self { upstream }
    }

    /// Core API list: failures are errors.
    async fn fetch<T: DeserializeOwned>(&self, endpoint: &str) -> Option<Vec<T>> {
        match get_list(self.upstream.as_ref(), endpoint, &[]).await {
            Ok(v) => Some(v),
            Err(e) => {
                error!(service = "jellyfin", endpoint, error = %e, "fetch failed");
                None
            }
        }
    }

    /// Plugin list: absence is expected, so failures are only warnings.
    async fn plugin_list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: Query<'_>,
    ) -> Option<Vec<T>> {
        match get_list(self.upstream.as_ref(), endpoint, query).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(service = "jellyfin", endpoint, error = %e, "usage stats unavailable (is the user_usage_stats plugin installed?)");
                None
            }
        }
    }

    async fn playback_activity(&self) -> Option<QueryResult> {
        let endpoint = "user_usage_stats/submit_custom_query";
        let body = json!({
            "CustomQueryString": PLAYBACK_QUERY,
            "ReplaceUserId": true,
        });
        match post_as(self.upstream.as_ref(), endpoint, &body).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(service = "jellyfin", endpoint, error = %e, "playback query unavailable (is the user_usage_stats plugin installed?)");
                None
            }
        }
    }

    async fn report(&self, endpoint: &str, user_id: &str) -> Option<Vec<ReportEntry>> {
        let query = [
            ("days", REPORT_DAYS.to_string()),
            ("UserId", user_id.to_string()),
            ("timezoneOffset", "0".to_string()),
        ];
        self.plugin_list(endpoint, &query).await
    }
}

/// `active_streams` and `streams_by_type` from the current sessions.
pub fn session_metrics(sessions: &[Session], metrics: &mut MetricSet) {
    let playing: Vec<&NowPlaying> = sessions
        .iter()
        .filter_map(|s| s.now_playing_item.as_ref())
        .collect();
    metrics.scalar("active_streams", playing.len() as f64);
    metrics.breakdown(
        "streams_by_type",
        tally(
            playing
                .iter()
                .map(|p| p.media_type.clone().unwrap_or_else(|| UNKNOWN.to_string())),
        ),
    );
}

/// Playback method mix, 30 day total and hour-of-day distribution.
pub fn playback_metrics(activity: &QueryResult, metrics: &mut MetricSet) {
    metrics.breakdown(
        "playback_methods",
        tally(activity.column("PlaybackMethod").map(|v| match v {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => UNKNOWN.to_string(),
            Some(other) => other.to_string(),
        })),
    );
    metrics.scalar("playback_count_30d", activity.results.len() as f64);
    metrics.breakdown(
        "playback_by_hour",
        tally(
            activity
                .column("DateCreated")
                .filter_map(|v| v?.as_str().and_then(hour_of_day))
                .map(|h| h.to_string()),
        ),
    );
}

/// Hour from a `YYYY-MM-DD HH...` timestamp.
pub fn hour_of_day(raw: &str) -> Option<u32> {
    let date = raw.get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    if !matches!(raw.get(10..11)?, " " | "T") {
        return None;
    }
    let hour: u32 = raw.get(11..13)?.parse().ok()?;
    (hour < 24).then_some(hour)
}

pub fn user_play_counts(activity: &[UserActivity]) -> Breakdown {
    activity
        .iter()
        .map(|u| {
            let name = u.user_name.clone().unwrap_or_else(|| UNKNOWN.to_string());
            (name, u.total_count)
        })
        .collect()
}

/// The `TOP_N` most played entries, keyed by title.
pub fn top_played(mut entries: Vec<ReportEntry>) -> Breakdown {
    entries.sort_by(|a, b| b.count.total_cmp(&a.count));
    entries
        .into_iter()
        .take(TOP_N)
        .map(|e| (e.label.unwrap_or_else(|| UNKNOWN.to_string()), e.count))
        .collect()
}

#[async_trait]
impl Collector for JellyfinCollector {
    fn name(&self) -> &'static str {
        "jellyfin"
    }

    async fn collect(&mut self) -> Result<MetricSet, CollectorError> {
        let mut metrics = MetricSet::new();

        if let Some(sessions) = self.fetch::<Session>("Sessions").await {
            session_metrics(&sessions, &mut metrics);
        }

        let mut user_ids = Vec::new();
        if let Some(users) = self.fetch::<User>("Users").await {
            metrics.scalar("users_total", users.len() as f64);
            user_ids = users.into_iter().filter_map(|u| u.id).collect();
        }

        if let Some(activity) = self.playback_activity().await {
            playback_metrics(&activity, &mut metrics);
        }

        let query = [
            ("days", REPORT_DAYS.to_string()),
            ("timezoneOffset", "0".to_string()),
        ];
        if let Some(activity) = self
            .plugin_list::<UserActivity>("user_usage_stats/user_activity", &query)
            .await
        {
            metrics.breakdown("user_play_counts", user_play_counts(&activity));
        }

        // Reports are per-user; the first user stands in for the server.
        if let Some(user_id) = user_ids.first() {
            if let Some(movies) = self.report("user_usage_stats/MoviesReport", user_id).await {
                metrics.breakdown("top_movies", top_played(movies));
            }
            if let Some(shows) = self.report("user_usage_stats/GetTvShowsReport", user_id).await {
                metrics.breakdown("top_shows", top_played(shows));
            }
        }

        info!(
            active_streams = metrics.scalar_value("active_streams").unwrap_or_default(),
            "collected jellyfin metrics"
        );
        Ok(metrics)
    }
}
