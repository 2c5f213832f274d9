//! One-shot historical backfill of cumulative library growth.
//!
//! Re-derives the cumulative movie and episode series from the current
//! libraries and writes them as an OpenMetrics snapshot with explicit
//! timestamps, ready for `promtool tsdb create-blocks-from openmetrics`.

use crate::client::{get_list, Upstream};
use crate::collectors::radarr::{cumulative_movies, Movie};
use crate::collectors::sonarr::{cumulative_episodes, Series};
use crate::collectors::timeline::{utc_midnight_ms, CumulativeSeries};
use crate::errors::UpstreamError;
use std::io::{self, Write};

pub const MOVIES_METRIC: &str = "radarr_cumulative_movies";
pub const EPISODES_METRIC: &str = "sonarr_cumulative_episodes";

pub async fn movie_series(radarr: &dyn Upstream) -> Result<CumulativeSeries, UpstreamError> {
    let movies: Vec<Movie> = get_list(radarr, "movie", &[]).await?;
    Ok(cumulative_movies(&movies))
}

pub async fn episode_series(sonarr: &dyn Upstream) -> Result<CumulativeSeries, UpstreamError> {
    let series: Vec<Series> = get_list(sonarr, "series", &[]).await?;
    Ok(cumulative_episodes(&series))
}

/// Both series as gauges, one sample per date, then the `# EOF` marker.
pub fn write_openmetrics<W: Write>(
    movies: &CumulativeSeries,
    episodes: &CumulativeSeries,
    out: &mut W,
) -> io::Result<()> {
    write_gauge(MOVIES_METRIC, movies, out)?;
    write_gauge(EPISODES_METRIC, episodes, out)?;
    writeln!(out, "# EOF")
}

fn write_gauge<W: Write>(name: &str, series: &CumulativeSeries, out: &mut W) -> io::Result<()> {
    writeln!(out, "# TYPE {name} gauge")?;
    for (date, total) in series.points() {
        writeln!(out, "{name} {total} {}", utc_midnight_ms(*date))?;
    }
    Ok(())
}

/// Operator instructions printed after a successful run.
pub fn import_guidance(path: &str) -> String {
    format!(
        "Wrote OpenMetrics backfill file: {path}\n\
         Next steps (Prometheus >= 2.40):\n\
         1) Stop Prometheus\n\
         2) Create blocks from OpenMetrics:\n   \
            promtool tsdb create-blocks-from openmetrics {path} ./backfill-blocks\n\
         3) Move generated blocks into Prometheus data dir (e.g., /var/lib/prometheus)\n\
         4) Start Prometheus"
    )
}
