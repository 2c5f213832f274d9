use thiserror::Error;

// typed errors per layer, each one easy to match on in tests

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response shape from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        source: serde_json::Error,
    },
}

impl UpstreamError {
    /// HTTP status of the failed call, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            UpstreamError::Decode { .. } => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("{resource} unavailable: {source}")]
    Unavailable {
        resource: &'static str,
        source: UpstreamError,
    },
}

#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("failed to register metric {name}: {source}")]
    Register {
        name: String,
        source: prometheus::Error,
    },

    #[error("metric {name} already exists as a {existing}")]
    KindConflict { name: String, existing: &'static str },

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },

    #[error("metrics server stopped: {0}")]
    Serve(std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no services configured: set at least one of RADARR_URL/RADARR_API_KEY, SONARR_URL/SONARR_API_KEY or JELLYFIN_URL/JELLYFIN_API_KEY")]
    NoServices,

    #[error("{service} API key is not a valid header value")]
    InvalidApiKey { service: &'static str },

    #[error("failed to build HTTP client for {service}: {source}")]
    HttpClient {
        service: &'static str,
        source: reqwest::Error,
    },
}
