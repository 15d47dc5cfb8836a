use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{BenchmarkConfig, FailurePolicy};
use crate::endpoint::{Endpoint, EndpointError};
use crate::error::{AbortedRun, BenchmarkError};
use crate::report::{format_latency, BenchmarkReport, FailureRecord, LevelResult};

/// Sweeps `config.concurrency_levels` in order, running `trials_per_level`
/// sequential trials of exactly `c` concurrent calls at each level.
///
/// Under [`FailurePolicy::Abort`] the first failed call ends the run with
/// [`BenchmarkError::Aborted`], which carries the levels completed so far.
/// Under [`FailurePolicy::Exclude`] failed calls are recorded on the level and
/// left out of its latency and throughput.
pub async fn run_benchmark<E>(
    endpoint: Arc<E>,
    config: &BenchmarkConfig,
) -> Result<BenchmarkReport, BenchmarkError>
where
    E: Endpoint + ?Sized + 'static,
{
    config.validate()?;

    if config.concurrency_levels.is_empty() {
        return Ok(BenchmarkReport {
            levels: Vec::new(),
            total_duration: Duration::ZERO,
            failure_policy: config.failure_policy,
        });
    }

    let payload = Arc::new(config.payload.clone());

    for index in 0..config.warmup_requests {
        endpoint
            .invoke(&payload)
            .await
            .map_err(|source| BenchmarkError::Warmup { index, source })?;
    }
    if config.warmup_requests > 0 {
        debug!(requests = config.warmup_requests, "warm-up complete");
    }

    let start = Instant::now();
    let mut levels = Vec::with_capacity(config.concurrency_levels.len());

    for &concurrency in &config.concurrency_levels {
        let mut aggregator = LevelAggregator::new(concurrency);

        for trial in 0..config.trials_per_level {
            match run_trial(&endpoint, &payload, concurrency, config.failure_policy).await? {
                TrialOutcome::Completed(result) => {
                    debug!(
                        concurrency,
                        trial,
                        elapsed_ms = result.elapsed.as_secs_f64() * 1000.0,
                        successes = result.latencies.len(),
                        failures = result.failures.len(),
                        "trial complete"
                    );
                    aggregator.process(trial, result);
                }
                TrialOutcome::Aborted { worker, error } => {
                    let partial = BenchmarkReport {
                        levels,
                        total_duration: start.elapsed(),
                        failure_policy: config.failure_policy,
                    };
                    return Err(BenchmarkError::Aborted(Box::new(AbortedRun {
                        concurrency,
                        trial,
                        worker,
                        error,
                        partial,
                    })));
                }
            }
        }

        let level = aggregator.finalize();
        info!(
            concurrency,
            mean_latency_ms = %format_latency(level.mean_latency),
            throughput = %format!("{:.2}", level.mean_throughput),
            failed = level.failed_requests,
            "concurrency level complete"
        );
        levels.push(level);
    }

    Ok(BenchmarkReport {
        levels,
        total_duration: start.elapsed(),
        failure_policy: config.failure_policy,
    })
}

async fn run_trial<E>(
    endpoint: &Arc<E>,
    payload: &Arc<Value>,
    concurrency: usize,
    policy: FailurePolicy,
) -> Result<TrialOutcome, BenchmarkError>
where
    E: Endpoint + ?Sized + 'static,
{
    let start = Instant::now();
    let mut join_set = JoinSet::new();
    for worker in 0..concurrency {
        let endpoint = Arc::clone(endpoint);
        let payload = Arc::clone(payload);
        join_set.spawn(async move {
            let sent = Instant::now();
            let result = endpoint.invoke(&payload).await.map(drop);
            RequestOutcome {
                worker,
                latency: sent.elapsed(),
                result,
            }
        });
    }

    let mut latencies = Vec::new();
    let mut failures = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        let outcome = joined?;
        match outcome.result {
            Ok(()) => latencies.push(outcome.latency),
            Err(error) => {
                warn!(
                    concurrency,
                    worker = outcome.worker,
                    error = %error,
                    "request failed"
                );
                match policy {
                    FailurePolicy::Abort => {
                        join_set.abort_all();
                        return Ok(TrialOutcome::Aborted {
                            worker: outcome.worker,
                            error,
                        });
                    }
                    FailurePolicy::Exclude => failures.push((outcome.worker, error.to_string())),
                }
            }
        }
    }

    Ok(TrialOutcome::Completed(TrialResult {
        latencies,
        failures,
        elapsed: start.elapsed(),
    }))
}

struct RequestOutcome {
    worker: usize,
    latency: Duration,
    result: Result<(), EndpointError>,
}

enum TrialOutcome {
    Completed(TrialResult),
    Aborted { worker: usize, error: EndpointError },
}

struct TrialResult {
    latencies: Vec<Duration>,
    failures: Vec<(usize, String)>,
    elapsed: Duration,
}

impl TrialResult {
    fn mean_latency(&self) -> Option<Duration> {
        mean_duration(&self.latencies)
    }

    /// Successful requests per second. A zero elapsed time cannot be observed
    /// with a monotonic `Instant` around real calls; it reports `0.0`.
    fn throughput(&self) -> f64 {
        let elapsed_secs = self.elapsed.as_secs_f64();
        if elapsed_secs > 0.0 {
            self.latencies.len() as f64 / elapsed_secs
        } else {
            0.0
        }
    }
}

struct LevelAggregator {
    concurrency: usize,
    trials: usize,
    trial_latency_means: Vec<Duration>,
    trial_throughputs: Vec<f64>,
    latencies: Vec<Duration>,
    failures: Vec<FailureRecord>,
}

impl LevelAggregator {
    fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            trials: 0,
            trial_latency_means: Vec::new(),
            trial_throughputs: Vec::new(),
            latencies: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn process(&mut self, trial: usize, result: TrialResult) {
        self.trials += 1;
        if let Some(mean) = result.mean_latency() {
            self.trial_latency_means.push(mean);
        }
        self.trial_throughputs.push(result.throughput());
        self.latencies.extend(result.latencies);
        self.failures
            .extend(result.failures.into_iter().map(|(worker, error)| FailureRecord {
                concurrency: self.concurrency,
                trial,
                worker,
                error,
            }));
    }

    fn finalize(self) -> LevelResult {
        let mean_throughput = if self.trial_throughputs.is_empty() {
            0.0
        } else {
            self.trial_throughputs.iter().sum::<f64>() / self.trial_throughputs.len() as f64
        };

        let mut latencies = self.latencies;
        latencies.sort();

        LevelResult {
            concurrency: self.concurrency,
            trials: self.trials,
            mean_latency: mean_duration(&self.trial_latency_means),
            mean_throughput,
            successful_requests: latencies.len() as u64,
            failed_requests: self.failures.len() as u64,
            latency_p50: percentile(&latencies, 0.50),
            latency_p90: percentile(&latencies, 0.90),
            latency_p99: percentile(&latencies, 0.99),
            failures: self.failures,
        }
    }
}

fn mean_duration(durations: &[Duration]) -> Option<Duration> {
    if durations.is_empty() {
        return None;
    }
    let total: f64 = durations.iter().map(Duration::as_secs_f64).sum();
    Some(Duration::from_secs_f64(total / durations.len() as f64))
}

fn percentile(sorted_latencies: &[Duration], quantile: f64) -> Option<Duration> {
    if sorted_latencies.is_empty() {
        return None;
    }

    let clamped = quantile.clamp(0.0, 1.0);
    let idx = ((sorted_latencies.len() - 1) as f64 * clamped).round() as usize;
    sorted_latencies.get(idx).cloned()
}
