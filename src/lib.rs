mod config;
mod endpoint;
mod error;
mod payload;
mod report;
mod runner;

pub use config::{geometric_levels, BenchmarkConfig, FailurePolicy};
pub use endpoint::{Endpoint, EndpointError, HttpEndpoint};
pub use error::{AbortedRun, BenchmarkError};
pub use payload::{PayloadFormat, RerankRequest};
pub use report::{BenchmarkReport, FailureRecord, LevelResult};
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use runner::run_benchmark;
