//! Client for the aggregate reviews endpoint, as used by the site's reviews
//! widget: bounded retries and at most one load in flight per loader.

use crate::retry::{with_retry, RetryPolicy};
use crate::reviews::AllReviews;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct AllReviewsEnvelope {
    pub success: bool,
    pub data: AllReviews,
    pub timestamp: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("A reviews load is already in progress")]
    AlreadyLoading,

    #[error("Reviews request failed: {0}")]
    Request(String),

    #[error("Reviews API returned HTTP {0}")]
    Status(u16),
}

pub struct ReviewsLoader {
    endpoint: String,
    client: reqwest::Client,
    policy: RetryPolicy,
    loading: AtomicBool,
}

/// Clears the in-flight flag however the load ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ReviewsLoader {
    pub fn new(api_url: &str, policy: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build reviews HTTP client")?;

        Ok(Self {
            endpoint: format!("{}/api/all-reviews", api_url.trim_end_matches('/')),
            client,
            policy,
            loading: AtomicBool::new(false),
        })
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Load both providers' reviews. A call made while another is still
    /// running returns [`LoadError::AlreadyLoading`] instead of issuing a
    /// duplicate request.
    pub async fn load_all(&self) -> Result<AllReviewsEnvelope, LoadError> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LoadError::AlreadyLoading);
        }
        let _in_flight = InFlight(&self.loading);

        info!("Loading reviews from {}", self.endpoint);
        with_retry(&self.policy, "Load all reviews", || self.fetch_once()).await
    }

    async fn fetch_once(&self) -> Result<AllReviewsEnvelope, LoadError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| LoadError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LoadError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| LoadError::Request(e.to_string()))
    }
}
