//! HTTP/JSON access to the upstream services.
//!
//! Collectors only see the [`Upstream`] trait, which keeps their shaping
//! logic testable against canned payloads. [`HttpUpstream`] is the reqwest
//! implementation used at runtime.

use crate::config::ServiceEndpoint;
use crate::errors::{ConfigError, UpstreamError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Query string parameters, in request order.
pub type Query<'a> = &'a [(&'a str, String)];

#[async_trait]
pub trait Upstream: Send + Sync {
    /// GET `path` relative to the service's API root.
    async fn get(&self, path: &str, query: Query<'_>) -> Result<Value, UpstreamError>;

    /// POST a JSON body to `path` relative to the service's API root.
    async fn post(&self, path: &str, body: &Value) -> Result<Value, UpstreamError>;
}

/// GET and decode into `T`.
pub async fn get_as<T: DeserializeOwned>(
    upstream: &dyn Upstream,
    path: &str,
    query: Query<'_>,
) -> Result<T, UpstreamError> {
    let value = upstream.get(path, query).await?;
    decode(path, value)
}

/// POST and decode into `T`.
pub async fn post_as<T: DeserializeOwned>(
    upstream: &dyn Upstream,
    path: &str,
    body: &Value,
) -> Result<T, UpstreamError> {
    let value = upstream.post(path, body).await?;
    decode(path, value)
}

/// GET a JSON array and decode it record by record. Records that do not
/// fit `T` are dropped; only a non-array answer is an error.
pub async fn get_list<T: DeserializeOwned>(
    upstream: &dyn Upstream,
    path: &str,
    query: Query<'_>,
) -> Result<Vec<T>, UpstreamError> {
    let values: Vec<Value> = get_as(upstream, path, query).await?;
    Ok(decode_records(path, values))
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, UpstreamError> {
    serde_json::from_value(value).map_err(|source| UpstreamError::Decode {
        endpoint: path.to_string(),
        source,
    })
}

pub fn decode_records<T: DeserializeOwned>(endpoint: &str, values: Vec<Value>) -> Vec<T> {
    let total = values.len();
    let records: Vec<T> = values
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    if records.len() < total {
        debug!(endpoint, skipped = total - records.len(), "skipped malformed records");
    }
    records
}

/// `null` reads as the type's default.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Nested record list: `null` is empty, malformed entries are dropped.
pub fn lenient_records<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

/// How a service expects its credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `X-Api-Key` header under `/api/v3` (Radarr, Sonarr).
    ArrApiKey,
    /// `X-Emby-Token` plus `Authorization: MediaBrowser Token=..` (Jellyfin).
    MediaBrowserToken,
}

impl AuthScheme {
    fn api_root(self) -> &'static str {
        match self {
            AuthScheme::ArrApiKey => "/api/v3",
            AuthScheme::MediaBrowserToken => "",
        }
    }

    fn headers(self, api_key: &str) -> Result<HeaderMap, reqwest::header::InvalidHeaderValue> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        match self {
            AuthScheme::ArrApiKey => {
                let mut key = HeaderValue::from_str(api_key)?;
                key.set_sensitive(true);
                headers.insert("X-Api-Key", key);
            }
            AuthScheme::MediaBrowserToken => {
                let mut token = HeaderValue::from_str(api_key)?;
                token.set_sensitive(true);
                headers.insert("X-Emby-Token", token);
                let mut auth = HeaderValue::from_str(&format!("MediaBrowser Token={api_key}"))?;
                auth.set_sensitive(true);
                headers.insert(reqwest::header::AUTHORIZATION, auth);
            }
        }
        Ok(headers)
    }
}

/// reqwest-backed [`Upstream`] with a fixed per-call timeout and header auth.
pub struct HttpUpstream {
    client: Client,
    root: String,
}

impl HttpUpstream {
    pub fn new(
        service: &'static str,
        endpoint: &ServiceEndpoint,
        scheme: AuthScheme,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let headers = scheme
            .headers(&endpoint.api_key)
            .map_err(|_| ConfigError::InvalidApiKey { service })?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("media-exporter/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|source| ConfigError::HttpClient { service, source })?;

        Ok(Self {
            client,
            root: format!("{}{}", endpoint.base_url, scheme.api_root()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.root, path.trim_start_matches('/'))
    }

    async fn finish(
        url: String,
        sent: reqwest::Result<reqwest::Response>,
    ) -> Result<Value, UpstreamError> {
        let response = sent.map_err(|source| UpstreamError::Transport {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|source| UpstreamError::Transport { url, source })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn get(&self, path: &str, query: Query<'_>) -> Result<Value, UpstreamError> {
        let url = self.url(path);
        let sent = self.client.get(&url).query(query).send().await;
        Self::finish(url, sent).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, UpstreamError> {
        let url = self.url(path);
        let sent = self.client.post(&url).json(body).send().await;
        Self::finish(url, sent).await
    }
}

/// Canned upstream for collector tests.
#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers from a fixed table keyed by `path?k=v&k=v`. Unknown keys
    /// answer HTTP 404, like a service without the requested endpoint.
    #[derive(Default)]
    pub struct StubUpstream {
        responses: HashMap<String, Result<Value, u16>>,
        calls: Mutex<Vec<String>>,
    }

    impl StubUpstream {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, key: &str, body: Value) -> Self {
            self.responses.insert(key.to_string(), Ok(body));
            self
        }

        pub fn failing(mut self, key: &str, status: u16) -> Self {
            self.responses.insert(key.to_string(), Err(status));
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn answer(&self, key: String) -> Result<Value, UpstreamError> {
            self.calls.lock().unwrap().push(key.clone());
            match self.responses.get(&key) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(UpstreamError::Status {
                    url: key,
                    status: *status,
                }),
                None => Err(UpstreamError::Status {
                    url: key,
                    status: 404,
                }),
            }
        }
    }

    pub fn key(path: &str, query: Query<'_>) -> String {
        if query.is_empty() {
            return path.to_string();
        }
        let params: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{path}?{}", params.join("&"))
    }

    #[async_trait]
    impl Upstream for StubUpstream {
        async fn get(&self, path: &str, query: Query<'_>) -> Result<Value, UpstreamError> {
            self.answer(key(path, query))
        }

        async fn post(&self, path: &str, _body: &Value) -> Result<Value, UpstreamError> {
            self.answer(format!("POST {path}"))
        }
    }
}
