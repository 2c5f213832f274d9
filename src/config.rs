use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::warn;

/// Base URL and credential for one upstream service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub base_url: String,
    pub api_key: String,
}

impl ServiceEndpoint {
    /// Both halves must be present and non-empty. Trailing slashes are dropped.
    pub fn from_parts(url: Option<&str>, api_key: Option<&str>) -> Option<Self> {
        let url = url.map(str::trim).filter(|u| !u.is_empty())?;
        let api_key = api_key.map(str::trim).filter(|k| !k.is_empty())?;
        Some(Self {
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "media-exporter", version, about)]
pub struct Config {
    /// Radarr base URL, e.g. http://radarr:7878
    #[arg(long, env = "RADARR_URL")]
    pub radarr_url: Option<String>,

    /// Radarr API key.
    #[arg(long, env = "RADARR_API_KEY", hide_env_values = true)]
    pub radarr_api_key: Option<String>,

    /// Sonarr base URL, e.g. http://sonarr:8989
    #[arg(long, env = "SONARR_URL")]
    pub sonarr_url: Option<String>,

    /// Sonarr API key.
    #[arg(long, env = "SONARR_API_KEY", hide_env_values = true)]
    pub sonarr_api_key: Option<String>,

    /// Jellyfin base URL, e.g. http://jellyfin:8096
    #[arg(long, env = "JELLYFIN_URL")]
    pub jellyfin_url: Option<String>,

    /// Jellyfin API token.
    #[arg(long, env = "JELLYFIN_API_KEY", hide_env_values = true)]
    pub jellyfin_api_key: Option<String>,

    /// Address the /metrics endpoint listens on.
    #[arg(long, env = "EXPORTER_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    /// Port the /metrics endpoint listens on.
    #[arg(long, env = "EXPORTER_PORT", default_value_t = 9877)]
    pub port: u16,

    /// Seconds to sleep between collection cycles.
    #[arg(long, env = "SCRAPE_INTERVAL", default_value_t = 60)]
    pub scrape_interval_secs: u64,

    /// Timeout applied to every upstream call, in seconds.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    pub upstream_timeout_secs: u64,

    /// Enable JSON structured logging.
    #[arg(long, env = "EXPORTER_JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,
}

impl Config {
    pub fn radarr(&self) -> Option<ServiceEndpoint> {
        resolve("radarr", self.radarr_url.as_deref(), self.radarr_api_key.as_deref())
    }

    pub fn sonarr(&self) -> Option<ServiceEndpoint> {
        resolve("sonarr", self.sonarr_url.as_deref(), self.sonarr_api_key.as_deref())
    }

    pub fn jellyfin(&self) -> Option<ServiceEndpoint> {
        resolve(
            "jellyfin",
            self.jellyfin_url.as_deref(),
            self.jellyfin_api_key.as_deref(),
        )
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

/// Settings for the one-shot backfill tool.
#[derive(Parser, Debug, Clone)]
#[command(name = "media-backfill", version, about = "Write an OpenMetrics backfill of cumulative library growth")]
pub struct BackfillConfig {
    /// Radarr base URL. Required: the tool exits with status 2 without it.
    #[arg(long, env = "RADARR_URL")]
    pub radarr_url: Option<String>,

    /// Radarr API key. Required along with the URL.
    #[arg(long, env = "RADARR_API_KEY", hide_env_values = true)]
    pub radarr_api_key: Option<String>,

    /// Sonarr base URL. Without it the episode series is left out.
    #[arg(long, env = "SONARR_URL")]
    pub sonarr_url: Option<String>,

    /// Sonarr API key.
    #[arg(long, env = "SONARR_API_KEY", hide_env_values = true)]
    pub sonarr_api_key: Option<String>,

    /// Where the OpenMetrics snapshot is written.
    #[arg(long, env = "BACKFILL_OUT", default_value = "backfill.om")]
    pub output: std::path::PathBuf,

    /// Timeout applied to every upstream call, in seconds.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    pub upstream_timeout_secs: u64,
}

impl BackfillConfig {
    pub fn radarr(&self) -> Option<ServiceEndpoint> {
        ServiceEndpoint::from_parts(self.radarr_url.as_deref(), self.radarr_api_key.as_deref())
    }

    pub fn sonarr(&self) -> Option<ServiceEndpoint> {
        ServiceEndpoint::from_parts(self.sonarr_url.as_deref(), self.sonarr_api_key.as_deref())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

fn resolve(service: &str, url: Option<&str>, api_key: Option<&str>) -> Option<ServiceEndpoint> {
    let endpoint = ServiceEndpoint::from_parts(url, api_key);
    if endpoint.is_none() && url.is_some_and(|u| !u.trim().is_empty()) {
        warn!(service, "URL set without an API key, skipping");
    }
    endpoint
}
