//! Collection cycle: run every collector in order, export, sleep, repeat.

use crate::collectors::{Collector, MetricSet};
use crate::exporter::Exporter;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Outcome of one collector within a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorReport {
    pub name: &'static str,
    pub ok: bool,
    pub series: usize,
    pub latency_us: u64,
}

pub struct CycleDriver {
    collectors: Vec<Box<dyn Collector>>,
    exporter: Exporter,
    interval: Duration,
}

impl CycleDriver {
    /// Collectors run in the order given.
    pub fn new(collectors: Vec<Box<dyn Collector>>, exporter: Exporter, interval: Duration) -> Self {
        Self {
            collectors,
            exporter,
            interval,
        }
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    /// One full pass. A failing collector is logged and the next one still runs.
    pub async fn run_cycle(&mut self) -> Vec<CollectorReport> {
        info!("starting metric collection");
        let mut reports = Vec::with_capacity(self.collectors.len());

        for collector in self.collectors.iter_mut() {
            let name = collector.name();
            let started = Instant::now();
            let outcome = collector.collect().await;
            let elapsed = started.elapsed();

            let (ok, mut series) = match outcome {
                Ok(metrics) => (true, self.exporter.export(&metrics, name)),
                Err(e) => {
                    error!(service = name, error = %e, "collection failed");
                    (false, 0)
                }
            };

            let mut health = MetricSet::new();
            health.scalar("up", if ok { 1.0 } else { 0.0 });
            health.scalar("collection_duration_seconds", elapsed.as_secs_f64());
            series += self.exporter.export(&health, name);

            let report = CollectorReport {
                name,
                ok,
                series,
                latency_us: elapsed.as_micros() as u64,
            };
            debug!(
                service = report.name,
                ok = report.ok,
                series = report.series,
                latency_us = report.latency_us,
                "collector finished"
            );
            reports.push(report);
        }

        info!(collectors = reports.len(), "metric collection completed");
        reports
    }

    /// Cycle forever, sleeping `interval` between passes.
    pub async fn run(mut self) {
        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.interval).await;
        }
    }
}
