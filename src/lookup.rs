use async_trait::async_trait;
use thiserror::Error;

/// Default minimum spacing between external calls, in milliseconds.
pub const DEFAULT_CALL_SPACING_MS: u64 = 100;

/// Per-call timeout for external services, in seconds.
pub const CALL_TIMEOUT_SECS: u64 = 10;

/// How one lookup attempt failed. `NotFound` is cached as an empty success,
/// `Transient` as an error marker, and `Unconfigured` is never cached at
/// all: the enricher skips resolution entirely when credentials are absent.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("client credentials not configured")]
    Unconfigured,
    #[error("service had no match for the key")]
    NotFound,
    #[error("transient failure: {0}")]
    Transient(String),
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LookupError::Transient(format!("timeout: {err}"))
        } else {
            LookupError::Transient(err.to_string())
        }
    }
}

/// One external lookup service for one enrichment dimension.
#[async_trait]
pub trait Lookup: Send + Sync {
    type Payload: Clone + Send;

    /// False when credentials are absent. The enricher then makes zero
    /// network calls and projects every key as unknown.
    fn is_configured(&self) -> bool;

    /// Resolve one key. Implementations own authentication, rate limiting
    /// and the per-call timeout; callers own caching and retry policy.
    async fn resolve(&self, key: &str) -> Result<Self::Payload, LookupError>;
}
