pub mod jellyfin;
pub mod normalize;
pub mod radarr;
pub mod sonarr;
pub mod timeline;

use crate::errors::CollectorError;
use async_trait::async_trait;
use std::collections::BTreeMap;

#[async_trait]
pub trait Collector: Send + Sync {
    /// name of the service, also the metric prefix
    fn name(&self) -> &'static str;

    /// fetch from the upstream API and reduce it to a flat metric set.
    async fn collect(&mut self) -> Result<MetricSet, CollectorError>;
}

/// label value -> count
pub type Breakdown = BTreeMap<String, f64>;

/// One reported value: a single gauge, or a gauge per label value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Scalar(f64),
    Breakdown(Breakdown),
}

/// One collector's output for one cycle, keyed by metric name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    values: BTreeMap<String, MetricValue>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(&mut self, key: impl Into<String>, value: impl Into<f64>) {
        self.values.insert(key.into(), MetricValue::Scalar(value.into()));
    }

    /// Only sets `key` when there is something to average.
    pub fn average(&mut self, key: impl Into<String>, samples: &[f64]) {
        if let Some(avg) = mean(samples) {
            self.scalar(key, avg);
        }
    }

    pub fn breakdown(&mut self, key: impl Into<String>, counts: Breakdown) {
        self.values.insert(key.into(), MetricValue::Breakdown(counts));
    }

    pub fn scalar_value(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            MetricValue::Scalar(v) => Some(*v),
            MetricValue::Breakdown(_) => None,
        }
    }

    pub fn breakdown_value(&self, key: &str) -> Option<&Breakdown> {
        match self.values.get(key)? {
            MetricValue::Breakdown(b) => Some(b),
            MetricValue::Scalar(_) => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricValue)> {
        self.values.iter()
    }
}

impl<'a> IntoIterator for &'a MetricSet {
    type Item = (&'a String, &'a MetricValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, MetricValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Count one occurrence of every label.
pub fn tally<I, S>(labels: I) -> Breakdown
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut counts = Breakdown::new();
    for label in labels {
        bump(&mut counts, label, 1.0);
    }
    counts
}

pub fn bump(counts: &mut Breakdown, label: impl Into<String>, by: f64) {
    *counts.entry(label.into()).or_insert(0.0) += by;
}

/// Arithmetic mean, `None` for an empty population.
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Queue payload shared by Radarr and Sonarr.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePage {
    #[serde(default, deserialize_with = "crate::client::lenient_records")]
    pub records: Vec<QueueRecord>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub status: Option<String>,
    pub added: Option<String>,
    pub estimated_completion_time: Option<String>,
}

impl QueueRecord {
    pub fn is_downloading(&self) -> bool {
        self.status.as_deref() == Some("downloading")
    }
}

/// `queue_total` and `queue_downloading`.
pub fn queue_metrics(queue: &QueuePage, metrics: &mut MetricSet) {
    let downloading = queue.records.iter().filter(|r| r.is_downloading()).count();
    metrics.scalar("queue_total", queue.records.len() as f64);
    metrics.scalar("queue_downloading", downloading as f64);
}
