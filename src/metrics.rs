//! Performance metrics and statistics tracking for the scoring service.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const MAX_SAMPLES: usize = 10_000;
const MAX_MODEL_SAMPLES: usize = 1_000;

/// Metrics collector for the scoring service
pub struct PipelineMetrics {
    /// Requests scored successfully
    pub scored: AtomicU64,
    /// Requests rejected as invalid (400)
    pub rejected: AtomicU64,
    /// Requests that failed inside a model (500)
    pub failed: AtomicU64,
    /// Scored requests decided as fraud
    pub flagged: AtomicU64,
    /// Alerts by risk level
    alerts_by_level: RwLock<BTreeMap<String, u64>>,
    /// End-to-end request latency (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Per-model inference times (in microseconds)
    model_times: RwLock<BTreeMap<String, Vec<u64>>>,
    /// Final score distribution in tenths
    score_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            scored: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            flagged: AtomicU64::new(0),
            alerts_by_level: RwLock::new(BTreeMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            model_times: RwLock::new(BTreeMap::new()),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a scored request
    pub fn record_scored(&self, processing_time: Duration, score: f64, flagged: bool) {
        self.scored.fetch_add(1, Ordering::Relaxed);
        if flagged {
            self.flagged.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > MAX_SAMPLES {
                times.drain(0..MAX_SAMPLES / 2);
            }
        }

        let bucket = (score.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a published alert
    pub fn record_alert(&self, risk_level: &str) {
        if let Ok(mut by_level) = self.alerts_by_level.write() {
            *by_level.entry(risk_level.to_string()).or_insert(0) += 1;
        }
    }

    /// Record model inference time
    pub fn record_model_time(&self, model_name: &str, duration: Duration) {
        if let Ok(mut times) = self.model_times.write() {
            let model_times = times.entry(model_name.to_string()).or_default();
            model_times.push(duration.as_micros() as u64);
            if model_times.len() > MAX_MODEL_SAMPLES {
                model_times.drain(0..MAX_MODEL_SAMPLES / 2);
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        match self.processing_times.read() {
            Ok(times) => ProcessingStats::from_samples(&times),
            Err(_) => ProcessingStats::default(),
        }
    }

    /// Get per-model latency statistics
    pub fn get_model_stats(&self) -> BTreeMap<String, ProcessingStats> {
        let Ok(times) = self.model_times.read() else {
            return BTreeMap::new();
        };
        times
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(model, samples)| (model.clone(), ProcessingStats::from_samples(samples)))
            .collect()
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or_default()
    }

    pub fn get_alerts_by_level(&self) -> BTreeMap<String, u64> {
        self.alerts_by_level
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let scored = self.scored.load(Ordering::Relaxed);
        let rejected = self.rejected.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let flagged = self.flagged.load(Ordering::Relaxed);
        let flag_rate = if scored > 0 {
            (flagged as f64 / scored as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();

        info!(
            scored = scored,
            rejected = rejected,
            failed = failed,
            flagged = flagged,
            flag_rate = format!("{:.2}%", flag_rate),
            throughput = format!("{:.1} req/s", self.get_throughput()),
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            "Scoring metrics summary"
        );

        for (level, count) in self.get_alerts_by_level() {
            info!(risk_level = %level, alerts = count, "Alerts by risk level");
        }

        let score_dist = self.get_score_distribution();
        let total: u64 = score_dist.iter().sum();
        if total > 0 {
            let histogram: Vec<String> = score_dist
                .iter()
                .enumerate()
                .map(|(i, &count)| {
                    format!("{:.1}-{:.1}:{}", i as f64 / 10.0, (i + 1) as f64 / 10.0, count)
                })
                .collect();
            info!(histogram = %histogram.join(" "), "Score distribution");
        }

        for (model, stats) in self.get_model_stats() {
            info!(
                model = %model,
                calls = stats.count,
                mean_us = stats.mean_us,
                p50_us = stats.p50_us,
                p99_us = stats.p99_us,
                "Model inference time"
            );
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics over a sample window
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl ProcessingStats {
    fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        Self {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: at(0.5),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let period = Duration::from_secs(self.interval_secs.max(1));
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = PipelineMetrics::new();

        metrics.record_scored(Duration::from_micros(100), 0.5, false);
        metrics.record_scored(Duration::from_micros(200), 0.95, true);
        metrics.record_rejected();
        metrics.record_failed();
        metrics.record_alert("critical");

        assert_eq!(metrics.scored.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.flagged.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.rejected.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.get_alerts_by_level().get("critical"), Some(&1));

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[5], 1);
        assert_eq!(dist[9], 1);
    }

    #[test]
    fn test_score_of_one_lands_in_last_bucket() {
        let metrics = PipelineMetrics::new();
        metrics.record_scored(Duration::from_micros(1), 1.0, true);
        assert_eq!(metrics.get_score_distribution()[9], 1);
    }

    #[test]
    fn test_processing_stats() {
        let stats = ProcessingStats::from_samples(&[40, 10, 30, 20]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean_us, 25);
        assert_eq!(stats.p50_us, 30);
        assert_eq!(stats.max_us, 40);
        assert_eq!(stats.p99_us, 40);
    }

    #[test]
    fn test_model_stats() {
        let metrics = PipelineMetrics::new();
        metrics.record_model_time("XGBoost", Duration::from_micros(50));
        metrics.record_model_time("XGBoost", Duration::from_micros(150));
        metrics.record_model_time("LSTM", Duration::from_micros(900));

        let stats = metrics.get_model_stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["XGBoost"].count, 2);
        assert_eq!(stats["XGBoost"].mean_us, 100);
    }
}
