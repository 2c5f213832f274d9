//! Turns collector output into Prometheus gauges.
//!
//! Gauges are created the first time a name is seen and reused on every
//! later cycle. Nothing is ever reset or unregistered, so a label that drops
//! out of a later cycle keeps its last reported value.

use crate::collectors::{MetricSet, MetricValue};
use crate::errors::ExporterError;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use tracing::warn;

/// The single label dimension of breakdown gauges.
pub const LABEL: &str = "label";

/// Owned registry with idempotent get-or-create by metric name.
#[derive(Default)]
pub struct MetricRegistry {
    registry: Registry,
    gauges: HashMap<String, Gauge>,
    breakdowns: HashMap<String, GaugeVec>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle for the scrape endpoint. Gauge updates are atomic, so
    /// reads concurrent with a cycle see each value either old or new.
    pub fn handle(&self) -> Registry {
        self.registry.clone()
    }

    pub fn gauge(&mut self, name: &str) -> Result<&Gauge, ExporterError> {
        if self.breakdowns.contains_key(name) {
            return Err(ExporterError::KindConflict {
                name: name.to_string(),
                existing: "breakdown",
            });
        }
        if !self.gauges.contains_key(name) {
            let gauge = Gauge::with_opts(Opts::new(name, format!("{name} value")))
                .map_err(|source| register_err(name, source))?;
            self.registry
                .register(Box::new(gauge.clone()))
                .map_err(|source| register_err(name, source))?;
            self.gauges.insert(name.to_string(), gauge);
        }
        Ok(&self.gauges[name])
    }

    pub fn breakdown(&mut self, name: &str) -> Result<&GaugeVec, ExporterError> {
        if self.gauges.contains_key(name) {
            return Err(ExporterError::KindConflict {
                name: name.to_string(),
                existing: "scalar",
            });
        }
        if !self.breakdowns.contains_key(name) {
            let vec = GaugeVec::new(Opts::new(name, format!("{name} breakdown")), &[LABEL])
                .map_err(|source| register_err(name, source))?;
            self.registry
                .register(Box::new(vec.clone()))
                .map_err(|source| register_err(name, source))?;
            self.breakdowns.insert(name.to_string(), vec);
        }
        Ok(&self.breakdowns[name])
    }

    /// Number of distinct metric names created so far.
    pub fn len(&self) -> usize {
        self.gauges.len() + self.breakdowns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn register_err(name: &str, source: prometheus::Error) -> ExporterError {
    ExporterError::Register {
        name: name.to_string(),
        source,
    }
}

/// Render a registry in the text exposition format.
pub fn render(registry: &Registry) -> Result<String, ExporterError> {
    let families = registry.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// `<prefix>_<key>`, unless `key` already carries the prefix.
pub fn metric_name(prefix: &str, key: &str) -> String {
    let already = key
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('_'));
    if already {
        key.to_string()
    } else {
        format!("{prefix}_{key}")
    }
}

pub struct Exporter {
    registry: MetricRegistry,
}

impl Exporter {
    pub fn new(registry: MetricRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Create-or-update a gauge for every entry of `metrics`. A metric that
    /// cannot be registered is logged and skipped. Returns the number of
    /// series written.
    pub fn export(&mut self, metrics: &MetricSet, prefix: &str) -> usize {
        let mut written = 0;
        for (key, value) in metrics {
            let name = metric_name(prefix, key);
            match self.write(&name, value) {
                Ok(n) => written += n,
                Err(e) => warn!(metric = %name, error = %e, "skipping metric"),
            }
        }
        written
    }

    fn write(&mut self, name: &str, value: &MetricValue) -> Result<usize, ExporterError> {
        match value {
            MetricValue::Scalar(v) => {
                self.registry.gauge(name)?.set(*v);
                Ok(1)
            }
            // empty breakdown: no data, which is different from zero
            MetricValue::Breakdown(counts) if counts.is_empty() => Ok(0),
            MetricValue::Breakdown(counts) => {
                let vec = self.registry.breakdown(name)?;
                for (label, v) in counts {
                    vec.with_label_values(&[label.as_str()]).set(*v);
                }
                Ok(counts.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{tally, Breakdown};

    fn exporter() -> (Exporter, Registry) {
        let registry = MetricRegistry::new();
        let handle = registry.handle();
        (Exporter::new(registry), handle)
    }

    #[test]
    fn test_metric_name_prefixing() {
        assert_eq!(metric_name("radarr", "movies_total"), "radarr_movies_total");
        assert_eq!(metric_name("radarr", "radarr_movies_total"), "radarr_movies_total");
        assert_eq!(metric_name("radarr", "radarrish"), "radarr_radarrish");
    }

    #[test]
    fn test_scalar_and_breakdown_rendered() {
        let (mut exp, handle) = exporter();
        let mut m = MetricSet::new();
        m.scalar("movies_total", 3.0);
        m.breakdown("genres", tally(["Drama", "Drama", "Comedy"]));
        assert_eq!(exp.export(&m, "radarr"), 3);

        let text = render(&handle).unwrap();
        assert!(text.contains("radarr_movies_total 3"));
        assert!(text.contains("radarr_genres{label=\"Drama\"} 2"));
        assert!(text.contains("radarr_genres{label=\"Comedy\"} 1"));
    }

    #[test]
    fn test_empty_breakdown_emits_nothing() {
        let (mut exp, handle) = exporter();
        let mut m = MetricSet::new();
        m.breakdown("filetypes", Breakdown::new());
        assert_eq!(exp.export(&m, "sonarr"), 0);
        assert!(exp.registry().is_empty());
        assert!(!render(&handle).unwrap().contains("sonarr_filetypes"));
    }

    #[test]
    fn test_values_overwrite_and_stale_labels_persist() {
        let (mut exp, handle) = exporter();
        let mut first = MetricSet::new();
        first.scalar("active_streams", 4.0);
        first.breakdown("streams_by_type", tally(["Movie", "Episode"]));
        exp.export(&first, "jellyfin");

        let mut second = MetricSet::new();
        second.scalar("active_streams", 1.0);
        second.breakdown("streams_by_type", tally(["Movie"]));
        exp.export(&second, "jellyfin");

        let text = render(&handle).unwrap();
        assert!(text.contains("jellyfin_active_streams 1"));
        assert!(text.contains("jellyfin_streams_by_type{label=\"Episode\"} 1"));
        assert_eq!(exp.registry().len(), 2);
    }

    #[test]
    fn test_kind_conflict_is_skipped() {
        let (mut exp, _) = exporter();
        let mut scalar = MetricSet::new();
        scalar.scalar("genres", 1.0);
        exp.export(&scalar, "radarr");

        let mut labelled = MetricSet::new();
        labelled.breakdown("genres", tally(["Drama"]));
        assert_eq!(exp.export(&labelled, "radarr"), 0);
        assert!(matches!(
            exp.registry.breakdown("radarr_genres"),
            Err(ExporterError::KindConflict { existing: "scalar", .. })
        ));
    }
}
