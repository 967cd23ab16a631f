pub mod slack;

use std::time::Duration;

/// Failure to post a joke. Join failures never produce one.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("{method} timed out after {timeout:?}")]
    Timeout {
        method: &'static str,
        timeout: Duration,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} request failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} returned HTTP {status}: {body}")]
    Status {
        method: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{method} rejected: {error}")]
    Api { method: &'static str, error: String },
}

#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;
    /// Post `joke` to the configured target and return it on success.
    async fn deliver(&self, joke: &str) -> Result<String, DeliveryError>;
}
