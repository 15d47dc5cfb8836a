use std::fmt::Write;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::FailurePolicy;

#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub concurrency: usize,
    pub trial: usize,
    pub worker: usize,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct LevelResult {
    pub concurrency: usize,
    pub trials: usize,
    /// Mean of the per-trial mean latencies. `None` when no request succeeded.
    pub mean_latency: Option<Duration>,
    /// Mean of the per-trial throughputs, in successful requests per second.
    pub mean_throughput: f64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub latency_p50: Option<Duration>,
    pub latency_p90: Option<Duration>,
    pub latency_p99: Option<Duration>,
    pub failures: Vec<FailureRecord>,
}

impl LevelResult {
    pub fn total_requests(&self) -> u64 {
        self.successful_requests + self.failed_requests
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub levels: Vec<LevelResult>,
    pub total_duration: Duration,
    pub failure_policy: FailurePolicy,
}

impl BenchmarkReport {
    pub fn total_requests(&self) -> u64 {
        self.levels.iter().map(LevelResult::total_requests).sum()
    }

    pub fn failed_requests(&self) -> u64 {
        self.levels.iter().map(|level| level.failed_requests).sum()
    }

    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>11}  {:>15}  {:>16}  {:>9}  {:>9}  {:>9}  {:>7}  {:>7}",
            "concurrency",
            "mean latency ms",
            "throughput req/s",
            "p50 ms",
            "p90 ms",
            "p99 ms",
            "ok",
            "failed"
        );
        for level in &self.levels {
            let _ = writeln!(
                out,
                "{:>11}  {:>15}  {:>16.2}  {:>9}  {:>9}  {:>9}  {:>7}  {:>7}",
                level.concurrency,
                format_latency(level.mean_latency),
                level.mean_throughput,
                format_latency(level.latency_p50),
                format_latency(level.latency_p90),
                format_latency(level.latency_p99),
                level.successful_requests,
                level.failed_requests
            );
        }
        out
    }

    pub fn to_json(&self) -> Value {
        let levels: Vec<Value> = self
            .levels
            .iter()
            .map(|level| {
                json!({
                    "concurrency": level.concurrency,
                    "trials": level.trials,
                    "mean_latency_ms": level.mean_latency.map(as_millis),
                    "mean_throughput_rps": level.mean_throughput,
                    "latency_p50_ms": level.latency_p50.map(as_millis),
                    "latency_p90_ms": level.latency_p90.map(as_millis),
                    "latency_p99_ms": level.latency_p99.map(as_millis),
                    "successful_requests": level.successful_requests,
                    "failed_requests": level.failed_requests,
                    "failures": level.failures.iter().map(|failure| json!({
                        "trial": failure.trial,
                        "worker": failure.worker,
                        "error": failure.error,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();

        json!({
            "failure_policy": self.failure_policy,
            "total_duration_ms": as_millis(self.total_duration),
            "levels": levels,
        })
    }

    /// One row per level; absent latencies are left empty.
    pub fn to_csv(&self) -> String {
        let mut out = String::from(
            "concurrency,trials,mean_latency_ms,mean_throughput_rps,p50_ms,p90_ms,p99_ms,successful,failed\n",
        );
        for level in &self.levels {
            let _ = writeln!(
                out,
                "{},{},{},{:.4},{},{},{},{},{}",
                level.concurrency,
                level.trials,
                csv_latency(level.mean_latency),
                level.mean_throughput,
                csv_latency(level.latency_p50),
                csv_latency(level.latency_p90),
                csv_latency(level.latency_p99),
                level.successful_requests,
                level.failed_requests
            );
        }
        out
    }
}

fn as_millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

pub(crate) fn format_latency(latency: Option<Duration>) -> String {
    match latency {
        Some(value) => format!("{:.2}", as_millis(value)),
        None => "n/a".to_string(),
    }
}

fn csv_latency(latency: Option<Duration>) -> String {
    latency
        .map(|value| format!("{:.4}", as_millis(value)))
        .unwrap_or_default()
}
