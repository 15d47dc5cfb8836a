use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use thiserror::Error;

/// A request/response service under test. Implementations own their own
/// transport timeout; the runner never retries.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn invoke(&self, payload: &Value) -> Result<Value, EndpointError>;
}

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("request failed ({status}) {body}")]
    Status { status: StatusCode, body: String },

    #[error("response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// Failure reported by a non-HTTP endpoint implementation.
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for EndpointError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EndpointError::Timeout
        } else {
            EndpointError::Transport(err)
        }
    }
}

/// JSON-over-HTTP endpoint: every invocation is a POST of the payload.
#[derive(Clone, Debug)]
pub struct HttpEndpoint {
    client: Client,
    url: Url,
    headers: HeaderMap,
}

impl HttpEndpoint {
    pub fn try_new(
        url: impl AsRef<str>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let url = Url::parse(url.as_ref())
            .with_context(|| format!("invalid endpoint URL: {}", url.as_ref()))?;

        let mut headers = HeaderMap::new();
        if let Some(api_key) = api_key {
            if !api_key.is_empty() {
                let auth_value = format!("Bearer {}", api_key);
                let header_value = HeaderValue::from_str(&auth_value)
                    .context("failed to build Authorization header from api_key")?;
                headers.insert(AUTHORIZATION, header_value);
            }
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to construct HTTP client")?;

        Ok(Self {
            client,
            url,
            headers,
        })
    }

    pub fn add_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Parses a `Name: value` pair as given on the command line.
    pub fn add_raw_header(self, raw: &str) -> Result<Self> {
        let (name, value) = raw
            .split_once(':')
            .with_context(|| format!("header `{}` is not in `Name: value` form", raw))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .with_context(|| format!("invalid header name in `{}`", raw))?;
        let value = HeaderValue::from_str(value.trim())
            .with_context(|| format!("invalid header value in `{}`", raw))?;
        Ok(self.add_header(name, value))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Endpoint for HttpEndpoint {
    async fn invoke(&self, payload: &Value) -> Result<Value, EndpointError> {
        let response = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(EndpointError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}
