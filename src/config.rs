use serde::Serialize;
use serde_json::Value;

use crate::error::BenchmarkError;

/// How a failed endpoint call is treated. The policy is fixed for a whole run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the in-flight trial and the run on the first failed call.
    #[default]
    Abort,
    /// Record the failure and leave it out of latency and throughput.
    Exclude,
}

#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    pub concurrency_levels: Vec<usize>,
    pub trials_per_level: usize,
    pub payload: Value,
    pub failure_policy: FailurePolicy,
    pub warmup_requests: usize,
}

impl BenchmarkConfig {
    pub fn try_new(
        concurrency_levels: Vec<usize>,
        trials_per_level: usize,
        payload: Value,
    ) -> Result<Self, BenchmarkError> {
        let config = Self {
            concurrency_levels,
            trials_per_level,
            payload,
            failure_policy: FailurePolicy::default(),
            warmup_requests: 0,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn with_warmup(mut self, warmup_requests: usize) -> Self {
        self.warmup_requests = warmup_requests;
        self
    }

    /// Checks the invariants `run_benchmark` relies on. The fields are public,
    /// so the runner calls this again before issuing any request.
    pub fn validate(&self) -> Result<(), BenchmarkError> {
        if self.trials_per_level == 0 {
            return Err(BenchmarkError::InvalidConfig(
                "trials_per_level must be greater than zero".to_string(),
            ));
        }

        if let Some(position) = self.concurrency_levels.iter().position(|&c| c == 0) {
            return Err(BenchmarkError::InvalidConfig(format!(
                "concurrency level at position {} must be greater than zero",
                position
            )));
        }

        if self.payload.is_null() {
            return Err(BenchmarkError::InvalidConfig(
                "request payload must not be null".to_string(),
            ));
        }

        Ok(())
    }

    /// Total measured requests, saturating at `usize::MAX`.
    pub fn planned_requests(&self) -> usize {
        self.concurrency_levels
            .iter()
            .fold(0usize, |total, c| {
                total.saturating_add(c.saturating_mul(self.trials_per_level))
            })
    }
}

/// Powers of two from 1 up to and including `max` (when `max` is itself a power of two).
pub fn geometric_levels(max: usize) -> Vec<usize> {
    let mut levels = Vec::new();
    let mut level = 1usize;
    while level <= max {
        levels.push(level);
        match level.checked_mul(2) {
            Some(next) => level = next,
            None => break,
        }
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_zero_trials() {
        let err = BenchmarkConfig::try_new(vec![1, 2], 0, json!({"query": "q"})).unwrap_err();
        assert!(matches!(err, BenchmarkError::InvalidConfig(_)));
        assert!(err.to_string().contains("trials_per_level"));
    }

    #[test]
    fn rejects_zero_concurrency_level() {
        let err = BenchmarkConfig::try_new(vec![1, 0, 4], 3, json!({})).unwrap_err();
        assert!(err.to_string().contains("position 1"));
    }

    #[test]
    fn rejects_null_payload() {
        let err = BenchmarkConfig::try_new(vec![1], 1, Value::Null).unwrap_err();
        assert!(matches!(err, BenchmarkError::InvalidConfig(_)));
    }

    #[test]
    fn empty_levels_are_valid() {
        let config = BenchmarkConfig::try_new(Vec::new(), 5, json!({})).unwrap();
        assert_eq!(config.planned_requests(), 0);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
    }

    #[test]
    fn planned_requests_counts_every_trial() {
        let config = BenchmarkConfig::try_new(vec![1, 2, 4], 2, json!({}))
            .unwrap()
            .with_failure_policy(FailurePolicy::Exclude)
            .with_warmup(3);
        assert_eq!(config.planned_requests(), 14);
        assert_eq!(config.warmup_requests, 3);
    }

    #[test]
    fn planned_requests_saturates_on_huge_levels() {
        let config = BenchmarkConfig::try_new(vec![usize::MAX, 4], 2, json!({})).unwrap();
        assert_eq!(config.planned_requests(), usize::MAX);
    }

    #[test]
    fn geometric_levels_stop_at_max() {
        assert_eq!(geometric_levels(32), vec![1, 2, 4, 8, 16, 32]);
        assert_eq!(geometric_levels(10), vec![1, 2, 4, 8]);
        assert!(geometric_levels(0).is_empty());
    }
}
