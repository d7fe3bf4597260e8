//! Academic metadata sources.
//!
//! Each provider is wrapped in a [`SourceAdapter`] that turns one query into
//! a list of [`RawRecord`]s. Adapters never panic on provider trouble: HTTP
//! failures, malformed payloads and rate limiting all come back as a
//! [`SourceError`] so that the aggregator can carry on with the other calls.

pub mod arxiv;
pub mod crossref;

use crate::types::{RawRecord, SourceError};
use crate::utils::toml_config::SourcesConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub use arxiv::ArxivSource;
pub use crossref::CrossrefSource;

/// Identifiers of the built-in adapters.
pub const BUILTIN_SOURCES: &[&str] = &[arxiv::SOURCE_ID, crossref::SOURCE_ID];

/// A single academic search provider.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier, stamped on every record this adapter produces.
    fn id(&self) -> &str;

    /// Search for at most `max_results` records matching `query`.
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<RawRecord>, SourceError>;
}

/// Adapters keyed by id, in registration order.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the adapters enabled in configuration.
    pub fn from_config(config: &SourcesConfig) -> crate::types::Result<Self> {
        let mut registry = Self::new();
        for id in &config.enabled {
            match id.as_str() {
                arxiv::SOURCE_ID => {
                    registry.register(Arc::new(ArxivSource::from_config(config)?));
                }
                crossref::SOURCE_ID => {
                    registry.register(Arc::new(CrossrefSource::from_config(config)?));
                }
                other => {
                    return Err(crate::types::AppError::Configuration(format!(
                        "Unknown source '{}'. Available: {}",
                        other,
                        BUILTIN_SOURCES.join(", ")
                    )));
                }
            }
        }
        Ok(registry)
    }

    /// Register an adapter. An adapter with the same id is replaced in place.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        match self.adapters.iter().position(|a| a.id() == adapter.id()) {
            Some(pos) => self.adapters[pos] = adapter,
            None => self.adapters.push(adapter),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.iter().find(|a| a.id() == id).cloned()
    }

    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    pub fn ids(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Enforces a minimum interval between requests to one provider.
///
/// Shared by all concurrent calls of an adapter; the lock is held only while
/// reserving a slot, never across the sleep.
pub struct RequestThrottle {
    min_interval: Duration,
    next_allowed: Mutex<Option<Instant>>,
}

impl RequestThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_allowed: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for this caller's slot.
    pub async fn wait(&self) {
        let slot = {
            let mut next = self.next_allowed.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.min_interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }

    /// Push the next slot out after the provider signalled rate limiting.
    pub async fn back_off(&self, delay: Duration) {
        let mut next = self.next_allowed.lock().await;
        let until = Instant::now() + delay.max(self.min_interval);
        if next.map_or(true, |at| at < until) {
            *next = Some(until);
        }
    }
}

/// Whether an HTTP status is worth retrying later.
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Map a transport error to a [`SourceError`].
pub fn transport_error(source_id: &str, query: &str, err: &reqwest::Error) -> SourceError {
    let retryable = err.is_timeout() || err.is_connect() || err.is_request();
    let cause = if err.is_decode() {
        format!("malformed response: {}", err)
    } else {
        format!("request failed: {}", err)
    };
    SourceError::new(source_id, query, cause, retryable && !err.is_decode())
}

/// Retry-After header in seconds, if present.
pub fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Shared HTTP client construction for adapters.
pub(crate) fn build_http_client(
    user_agent: &str,
    timeout: Duration,
) -> crate::types::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| crate::types::AppError::Configuration(format!("HTTP client: {}", e)))
}

/// Check the status of a provider response, backing off the throttle on 429.
pub(crate) async fn check_status(
    response: &reqwest::Response,
    throttle: &RequestThrottle,
    source_id: &str,
    query: &str,
) -> Result<(), SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let delay = retry_after(response.headers()).unwrap_or(throttle.min_interval() * 4);
        tracing::warn!(source = source_id, ?delay, "Rate limited, backing off");
        throttle.back_off(delay).await;
    }
    Err(SourceError::new(
        source_id,
        query,
        format!("HTTP {}", status),
        is_retryable_status(status),
    ))
}
