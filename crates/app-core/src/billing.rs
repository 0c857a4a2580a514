//! Billing service
//!
//! The subscription changes rarely, so the service caches the last
//! response and only hits the backend when the cache goes stale.

use api_client::agent::{AgentError, ApiAgent};
use api_client::rest::ApiRequest;
use api_client::types::Subscription;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// How long a cached subscription stays fresh
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Errors that can occur during billing operations
#[derive(Debug, Error)]
pub enum BillingError {
    /// Agent error
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}

/// Result type for billing operations
pub type Result<T> = std::result::Result<T, BillingError>;

/// Billing service backing the plan and upgrade screens
pub struct BillingService {
    agent: Arc<ApiAgent>,
    cache: RwLock<Option<(Subscription, Instant)>>,
    stale_after: Duration,
}

impl BillingService {
    /// Create a billing service over the given agent
    pub fn new(agent: Arc<ApiAgent>) -> Self {
        Self {
            agent,
            cache: RwLock::new(None),
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    /// Override the cache staleness window
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Get the organization's subscription, from cache if fresh
    pub async fn subscription(&self) -> Result<Subscription> {
        {
            let cache = self.cache.read().await;
            if let Some((subscription, fetched_at)) = cache.as_ref() {
                if fetched_at.elapsed() < self.stale_after {
                    return Ok(subscription.clone());
                }
            }
        }

        self.fetch().await
    }

    /// Fetch the subscription from the backend, bypassing the cache
    pub async fn fetch(&self) -> Result<Subscription> {
        let response = self
            .agent
            .execute_authed::<Subscription>(ApiRequest::get("/billing/subscription"))
            .await?;

        let subscription = response.data;

        let mut cache = self.cache.write().await;
        *cache = Some((subscription.clone(), Instant::now()));

        Ok(subscription)
    }

    /// Drop the cached subscription
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}
