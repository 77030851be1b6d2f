//! Review aggregation across the Google Places and Facebook Graph APIs.
//!
//! Each provider is fetched independently. Single-provider calls surface
//! failures as [`ProviderError`]; [`ReviewAggregator::all_reviews`] folds each
//! provider's outcome into a [`ReviewSourceResult`] so one provider being down
//! never affects the other or the envelope.

pub mod facebook;
pub mod google;

use crate::config::Config;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

pub use facebook::FacebookReviews;

/// How much data to request from a provider.
///
/// The dedicated endpoints ask for the full field set; the aggregate endpoint
/// asks for a lighter one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    Full,
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    Facebook,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Facebook => "facebook",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Not configured")]
    NotConfigured,

    /// The provider answered but refused the request.
    #[error("{kind}: {message}")]
    Rejected {
        status: u16,
        kind: String,
        message: String,
    },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout)
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Outcome for one provider inside the aggregate envelope.
///
/// `success` is true exactly when `data` is present and `error` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSourceResult {
    success: bool,
    data: Option<Value>,
    error: Option<String>,
}

impl ReviewSourceResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Per-provider results of one aggregation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllReviews {
    pub google: ReviewSourceResult,
    pub facebook: ReviewSourceResult,
}

#[derive(Clone)]
pub struct ReviewAggregator {
    config: Arc<Config>,
    client: reqwest::Client,
}

impl ReviewAggregator {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.provider_timeout())
            .build()
            .context("Failed to build provider HTTP client")?;

        Ok(Self { config, client })
    }

    /// Full Google Places details for the configured place.
    pub async fn google_reviews(&self) -> Result<Value, ProviderError> {
        google::fetch_place_details(&self.client, &self.config, Detail::Full).await
    }

    /// Full Facebook page data plus whatever ratings the page exposes.
    pub async fn facebook_reviews(&self) -> Result<FacebookReviews, ProviderError> {
        facebook::fetch_page_reviews(&self.client, &self.config, Detail::Full).await
    }

    /// Fetch both providers concurrently. Never fails: each provider's
    /// failure is recorded in its own slot.
    pub async fn all_reviews(&self) -> AllReviews {
        let (google, facebook) = tokio::join!(
            google::fetch_place_details(&self.client, &self.config, Detail::Summary),
            facebook::fetch_page_reviews(&self.client, &self.config, Detail::Summary),
        );

        AllReviews {
            google: to_source_result(Provider::Google, google),
            facebook: to_source_result(
                Provider::Facebook,
                facebook.map(|reviews| reviews.to_summary_value()),
            ),
        }
    }
}

fn to_source_result(provider: Provider, outcome: Result<Value, ProviderError>) -> ReviewSourceResult {
    match outcome {
        Ok(data) => ReviewSourceResult::ok(data),
        Err(ProviderError::NotConfigured) => {
            debug!("{} reviews skipped: not configured", provider.name());
            ReviewSourceResult::failed(ProviderError::NotConfigured.to_string())
        }
        Err(e) => {
            error!("{} API error: {}", provider.name(), e);
            ReviewSourceResult::failed(e.to_string())
        }
    }
}
