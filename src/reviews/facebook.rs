use super::{Detail, ProviderError};
use crate::config::Config;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

const FULL_PAGE_FIELDS: &str = "name,overall_star_rating,rating_count,link,about,fan_count,category,description,hours,location,phone,website";
const SUMMARY_PAGE_FIELDS: &str = "name,overall_star_rating,rating_count,link,fan_count,about";

const FULL_RATING_FIELDS: &str =
    "review_text,reviewer{name,picture},created_time,rating,recommendation_type,has_review";
const SUMMARY_RATING_FIELDS: &str = "review_text,reviewer{name},created_time,rating,recommendation_type";

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RatingsResponse {
    #[serde(default)]
    data: Vec<Value>,
}

/// Page metadata plus the page's ratings (possibly empty).
#[derive(Debug, Clone, PartialEq)]
pub struct FacebookReviews {
    pub page: Value,
    pub ratings: Vec<Value>,
}

impl FacebookReviews {
    pub fn has_ratings(&self) -> bool {
        !self.ratings.is_empty()
    }

    /// Payload for the dedicated endpoint.
    pub fn to_full_value(&self) -> Value {
        json!({
            "page": self.page,
            "ratings": self.ratings,
            "hasRatings": self.has_ratings(),
        })
    }

    /// Payload for the aggregate endpoint.
    pub fn to_summary_value(&self) -> Value {
        json!({
            "page": self.page,
            "ratings": self.ratings,
        })
    }
}

/// Fetch page data and ratings for the configured page.
///
/// Both Graph requests go out concurrently. The page request decides the
/// outcome; ratings are not enabled for every page, so a failed ratings
/// request just yields an empty list.
pub async fn fetch_page_reviews(
    client: &reqwest::Client,
    config: &Config,
    detail: Detail,
) -> Result<FacebookReviews, ProviderError> {
    let token = config.facebook_token().ok_or(ProviderError::NotConfigured)?;

    let (page, ratings) = tokio::join!(
        fetch_page(client, config, token, detail),
        fetch_ratings(client, config, token, detail),
    );

    Ok(FacebookReviews {
        page: page?,
        ratings,
    })
}

async fn fetch_page(
    client: &reqwest::Client,
    config: &Config,
    token: &str,
    detail: Detail,
) -> Result<Value, ProviderError> {
    let fields = match detail {
        Detail::Full => FULL_PAGE_FIELDS,
        Detail::Summary => SUMMARY_PAGE_FIELDS,
    };

    let url = format!("{}/{}", config.facebook_graph_base, config.facebook_page_id);
    debug!("Fetching Facebook page {}", config.facebook_page_id);

    let response = client
        .get(&url)
        .query(&[("fields", fields), ("access_token", token)])
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, config.provider_timeout()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(graph_rejection(status.as_u16(), &body));
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, config.provider_timeout()))
}

async fn fetch_ratings(
    client: &reqwest::Client,
    config: &Config,
    token: &str,
    detail: Detail,
) -> Vec<Value> {
    let (fields, limit) = match detail {
        Detail::Full => (FULL_RATING_FIELDS, "25"),
        Detail::Summary => (SUMMARY_RATING_FIELDS, "10"),
    };

    let url = format!(
        "{}/{}/ratings",
        config.facebook_graph_base, config.facebook_page_id
    );

    let response = match client
        .get(&url)
        .query(&[("fields", fields), ("limit", limit), ("access_token", token)])
        .send()
        .await
    {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            info!(
                "Facebook ratings not available for this page ({})",
                r.status()
            );
            return Vec::new();
        }
        Err(e) => {
            info!("Facebook ratings not available for this page: {}", e);
            return Vec::new();
        }
    };

    match response.json::<RatingsResponse>().await {
        Ok(ratings) => ratings.data,
        Err(e) => {
            info!("Facebook ratings response unreadable: {}", e);
            Vec::new()
        }
    }
}

fn graph_rejection(status: u16, body: &str) -> ProviderError {
    let graph_error = serde_json::from_str::<GraphErrorBody>(body)
        .ok()
        .and_then(|b| b.error);

    let (kind, message) = match graph_error {
        Some(e) => (e.kind, e.message),
        None => (None, None),
    };

    ProviderError::Rejected {
        status,
        kind: kind.unwrap_or_else(|| "Facebook API Error".to_string()),
        message: message.unwrap_or_else(|| "Failed to fetch Facebook data".to_string()),
    }
}
