use anyhow::Context;
use clap::Parser;
use media_exporter::client::{AuthScheme, HttpUpstream};
use media_exporter::collectors::jellyfin::JellyfinCollector;
use media_exporter::collectors::radarr::RadarrCollector;
use media_exporter::collectors::sonarr::SonarrCollector;
use media_exporter::collectors::Collector;
use media_exporter::config::Config;
use media_exporter::driver::CycleDriver;
use media_exporter::errors::ConfigError;
use media_exporter::exporter::{Exporter, MetricRegistry};
use media_exporter::server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Collectors for every configured service, in cycle order.
fn build_collectors(config: &Config) -> Result<Vec<Box<dyn Collector>>, ConfigError> {
    let timeout = config.upstream_timeout();
    let mut collectors: Vec<Box<dyn Collector>> = Vec::new();

    if let Some(ep) = config.radarr() {
        let upstream = HttpUpstream::new("radarr", &ep, AuthScheme::ArrApiKey, timeout)?;
        collectors.push(Box::new(RadarrCollector::new(Box::new(upstream))));
        info!(url = %ep.base_url, "radarr collector initialized");
    }
    if let Some(ep) = config.sonarr() {
        let upstream = HttpUpstream::new("sonarr", &ep, AuthScheme::ArrApiKey, timeout)?;
        collectors.push(Box::new(SonarrCollector::new(Box::new(upstream))));
        info!(url = %ep.base_url, "sonarr collector initialized");
    }
    if let Some(ep) = config.jellyfin() {
        let upstream = HttpUpstream::new("jellyfin", &ep, AuthScheme::MediaBrowserToken, timeout)?;
        collectors.push(Box::new(JellyfinCollector::new(Box::new(upstream))));
        info!(url = %ep.base_url, "jellyfin collector initialized");
    }

    if collectors.is_empty() {
        return Err(ConfigError::NoServices);
    }
    Ok(collectors)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_logging(config.json_logs);
    info!(version = env!("CARGO_PKG_VERSION"), "starting media exporter");

    let collectors = build_collectors(&config).context("invalid configuration")?;

    let registry = MetricRegistry::new();
    let handle = registry.handle();
    let addr = config.listen_addr();
    let server = tokio::spawn(async move {
        if let Err(e) = server::serve(addr, handle).await {
            error!(error = %e, "metrics endpoint stopped");
        }
    });

    let driver = CycleDriver::new(collectors, Exporter::new(registry), config.scrape_interval());

    tokio::select! {
        _ = driver.run() => {}
        _ = server => {
            anyhow::bail!("metrics endpoint on {addr} exited");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }
    Ok(())
}
