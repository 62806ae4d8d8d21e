//! External call abstraction.
//!
//! The dispatcher sends every id of a batch through an [`ExternalCall`]. Three
//! implementations are provided:
//!
//! - [`SimulatedCall`]: succeeds with a fixed probability after a random latency
//! - [`HttpCall`]: POSTs the id to an HTTP endpoint, any 2xx counts as success
//! - [`MockCall`]: scripted outcomes and a call log, for tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::json;

use crate::error::{Result, SchedulerError};
use crate::types::ItemId;

/// Capability to process one id.
///
/// An `Ok(())` is a success; any error is recorded as a failure for that id.
/// Implementations do not need to bound their own latency: the dispatcher wraps
/// every attempt in a timeout.
#[async_trait]
pub trait ExternalCall: Send + Sync {
    async fn attempt(&self, id: ItemId) -> Result<()>;
}

#[async_trait]
impl ExternalCall for Box<dyn ExternalCall> {
    async fn attempt(&self, id: ItemId) -> Result<()> {
        (**self).attempt(id).await
    }
}

// ============================================================================
// Simulated Implementation
// ============================================================================

/// Simulated external service with random latency and random failures.
#[derive(Debug, Clone)]
pub struct SimulatedCall {
    success_probability: f64,
    min_latency: Duration,
    max_latency: Duration,
}

impl SimulatedCall {
    /// `success_probability` must lie in `[0, 1]` and `min_latency <= max_latency`;
    /// `Config::validate` checks both before this is built from configuration.
    pub fn new(success_probability: f64, min_latency: Duration, max_latency: Duration) -> Self {
        Self {
            success_probability: success_probability.clamp(0.0, 1.0),
            min_latency,
            max_latency: max_latency.max(min_latency),
        }
    }
}

#[async_trait]
impl ExternalCall for SimulatedCall {
    async fn attempt(&self, id: ItemId) -> Result<()> {
        let (latency, succeeded) = {
            let mut rng = rand::thread_rng();
            let latency_ms =
                rng.gen_range(self.min_latency.as_millis() as u64..=self.max_latency.as_millis() as u64);
            (
                Duration::from_millis(latency_ms),
                rng.gen_bool(self.success_probability),
            )
        };

        tokio::time::sleep(latency).await;

        if succeeded {
            tracing::trace!(id, latency_ms = latency.as_millis() as u64, "Simulated call succeeded");
            Ok(())
        } else {
            Err(SchedulerError::ExternalCall {
                id,
                message: "simulated external service failure".to_string(),
            })
        }
    }
}

// ============================================================================
// HTTP Implementation using reqwest
// ============================================================================

/// External call over HTTP.
///
/// Sends `POST {url}` with body `{"id": <id>}`.
#[derive(Clone)]
pub struct HttpCall {
    client: reqwest::Client,
    url: String,
}

impl HttpCall {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl ExternalCall for HttpCall {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn attempt(&self, id: ItemId) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "id": id }))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(id, error = %e, "External call request failed");
                e
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(id, status = status.as_u16(), "External call succeeded");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SchedulerError::ExternalCall {
                id,
                message: format!("upstream returned {}: {}", status.as_u16(), body),
            })
        }
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

/// Record of a call made to the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCallRecord {
    pub id: ItemId,
    pub started_at: tokio::time::Instant,
}

/// Mock external call for testing.
///
/// Succeeds immediately unless a failure or latency has been configured for the id.
///
/// # Example
/// ```ignore
/// let mock = MockCall::new();
/// mock.add_failure(2, "boom");
/// mock.add_latency(3, Duration::from_secs(10));
/// ```
#[derive(Clone, Default)]
pub struct MockCall {
    failures: Arc<Mutex<HashMap<ItemId, String>>>,
    latencies: Arc<Mutex<HashMap<ItemId, Duration>>>,
    calls: Arc<Mutex<Vec<MockCallRecord>>>,
}

impl MockCall {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every attempt for `id` fail with `message`.
    pub fn add_failure(&self, id: ItemId, message: &str) {
        self.failures.lock().insert(id, message.to_string());
    }

    /// Delay every attempt for `id` by `latency`.
    pub fn add_latency(&self, id: ItemId, latency: Duration) {
        self.latencies.lock().insert(id, latency);
    }

    /// All calls made so far, in the order they started.
    pub fn get_calls(&self) -> Vec<MockCallRecord> {
        self.calls.lock().clone()
    }

    /// Ids attempted so far, in the order they started.
    pub fn called_ids(&self) -> Vec<ItemId> {
        self.calls.lock().iter().map(|c| c.id).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl ExternalCall for MockCall {
    async fn attempt(&self, id: ItemId) -> Result<()> {
        self.calls.lock().push(MockCallRecord {
            id,
            started_at: tokio::time::Instant::now(),
        });

        let latency = self.latencies.lock().get(&id).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self.failures.lock().get(&id).cloned();
        match failure {
            Some(message) => Err(SchedulerError::ExternalCall { id, message }),
            None => Ok(()),
        }
    }
}
