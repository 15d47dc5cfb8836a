use thiserror::Error;
use tokio::task::JoinError;

use crate::endpoint::EndpointError;
use crate::report::BenchmarkReport;

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("invalid benchmark configuration: {0}")]
    InvalidConfig(String),

    #[error("warm-up request {index} failed: {source}")]
    Warmup {
        index: usize,
        #[source]
        source: EndpointError,
    },

    #[error(
        "benchmark aborted at concurrency {} trial {} (worker {}): {}",
        .0.concurrency, .0.trial, .0.worker, .0.error
    )]
    Aborted(Box<AbortedRun>),

    #[error("request worker failed: {0}")]
    Worker(#[from] JoinError),
}

/// Where an aborted run stopped, plus the levels that finished before it.
#[derive(Debug)]
pub struct AbortedRun {
    pub concurrency: usize,
    pub trial: usize,
    pub worker: usize,
    pub error: EndpointError,
    pub partial: BenchmarkReport,
}
