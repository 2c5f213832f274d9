use anyhow::Context;
use clap::Parser;
use media_exporter::backfill::{episode_series, import_guidance, movie_series, write_openmetrics};
use media_exporter::client::{AuthScheme, HttpUpstream};
use media_exporter::collectors::timeline::CumulativeSeries;
use media_exporter::config::BackfillConfig;
use std::fs::File;
use std::io::{BufWriter, Write};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BackfillConfig::parse();
    let timeout = config.upstream_timeout();

    let Some(radarr) = config.radarr() else {
        eprintln!("Missing RADARR_URL or RADARR_API_KEY");
        std::process::exit(2);
    };

    let upstream = HttpUpstream::new("radarr", &radarr, AuthScheme::ArrApiKey, timeout)?;
    let movies = movie_series(&upstream)
        .await
        .context("fetching radarr movies")?;

    let episodes = match config.sonarr() {
        Some(sonarr) => {
            let upstream = HttpUpstream::new("sonarr", &sonarr, AuthScheme::ArrApiKey, timeout)?;
            episode_series(&upstream)
                .await
                .context("fetching sonarr series")?
        }
        None => CumulativeSeries::default(),
    };

    let path = config.output.display().to_string();
    let file = File::create(&config.output).with_context(|| format!("creating {path}"))?;
    let mut out = BufWriter::new(file);
    write_openmetrics(&movies, &episodes, &mut out)?;
    out.flush()?;

    println!("{}", import_guidance(&path));
    Ok(())
}
