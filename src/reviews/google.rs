use super::{Detail, ProviderError};
use crate::config::Config;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const DETAILS_PATH: &str = "/maps/api/place/details/json";

const FULL_FIELDS: &str =
    "name,rating,user_ratings_total,reviews,formatted_address,url,formatted_phone_number,website";
const SUMMARY_FIELDS: &str = "name,rating,user_ratings_total,reviews,formatted_address,url";

/// Places API wraps every answer in a `status` string, even on HTTP 200.
#[derive(Debug, Deserialize)]
struct PlaceDetailsResponse {
    status: String,
    result: Option<Value>,
    error_message: Option<String>,
}

/// Fetch place details (rating, reviews, address) for the configured place.
///
/// Returns the provider's `result` object verbatim.
pub async fn fetch_place_details(
    client: &reqwest::Client,
    config: &Config,
    detail: Detail,
) -> Result<Value, ProviderError> {
    let (api_key, place_id) = config
        .google_credentials()
        .ok_or(ProviderError::NotConfigured)?;

    let fields = match detail {
        Detail::Full => FULL_FIELDS,
        Detail::Summary => SUMMARY_FIELDS,
    };

    let url = format!("{}{}", config.google_api_base, DETAILS_PATH);
    debug!("Fetching Google place details for {}", place_id);

    let response = client
        .get(&url)
        .query(&[("place_id", place_id), ("fields", fields), ("key", api_key)])
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, config.provider_timeout()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Transport(format!(
            "Google Places API error ({}): {}",
            status, body
        )));
    }

    let details: PlaceDetailsResponse = response
        .json()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, config.provider_timeout()))?;

    if details.status != "OK" {
        return Err(ProviderError::Rejected {
            status: 400,
            message: details
                .error_message
                .unwrap_or_else(|| "Failed to fetch Google reviews".to_string()),
            kind: details.status,
        });
    }

    details
        .result
        .ok_or_else(|| ProviderError::Malformed("status OK but no result".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn create_test_config(base: &str) -> Config {
        Config {
            google_api_key: Some("test-google-key".to_string()),
            google_place_id: Some("place-123".to_string()),
            google_api_base: base.to_string(),
            provider_timeout_secs: 2,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_place_details_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(DETAILS_PATH))
            .and(query_param("place_id", "place-123"))
            .and(query_param("key", "test-google-key"))
            .and(query_param("fields", FULL_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "result": {
                    "name": "BLG Legal Services",
                    "rating": 5.0,
                    "user_ratings_total": 42,
                    "reviews": [{"author_name": "Ana", "rating": 5, "text": "Great help"}]
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = create_test_config(&mock_server.uri());
        let data = fetch_place_details(&reqwest::Client::new(), &config, Detail::Full)
            .await
            .expect("should fetch details");

        assert_eq!(data["name"], "BLG Legal Services");
        assert_eq!(data["user_ratings_total"], 42);
        assert_eq!(data["reviews"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_place_details_summary_uses_lighter_fields() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(DETAILS_PATH))
            .and(query_param("fields", SUMMARY_FIELDS))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "OK", "result": {}})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = create_test_config(&mock_server.uri());
        let result = fetch_place_details(&reqwest::Client::new(), &config, Detail::Summary).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_place_details_non_ok_status_is_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(DETAILS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "REQUEST_DENIED",
                "error_message": "The provided API key is invalid."
            })))
            .mount(&mock_server)
            .await;

        let config = create_test_config(&mock_server.uri());
        let err = fetch_place_details(&reqwest::Client::new(), &config, Detail::Full)
            .await
            .unwrap_err();

        match err {
            ProviderError::Rejected {
                status,
                kind,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(kind, "REQUEST_DENIED");
                assert_eq!(message, "The provided API key is invalid.");
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_place_details_rejected_without_message_uses_default() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(DETAILS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "NOT_FOUND"})),
            )
            .mount(&mock_server)
            .await;

        let config = create_test_config(&mock_server.uri());
        let err = fetch_place_details(&reqwest::Client::new(), &config, Detail::Full)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "NOT_FOUND: Failed to fetch Google reviews");
    }

    #[tokio::test]
    async fn test_fetch_place_details_http_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(DETAILS_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&mock_server)
            .await;

        let config = create_test_config(&mock_server.uri());
        let err = fetch_place_details(&reqwest::Client::new(), &config, Detail::Full)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Transport(_)));
        assert!(err.to_string().contains("503"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_fetch_place_details_missing_result_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(DETAILS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
            .mount(&mock_server)
            .await;

        let config = create_test_config(&mock_server.uri());
        let err = fetch_place_details(&reqwest::Client::new(), &config, Detail::Full)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_fetch_place_details_not_configured_skips_network() {
        let config = Config {
            google_api_key: Some("YOUR_API_KEY_HERE".to_string()),
            google_place_id: Some("place-123".to_string()),
            // Nothing listens here; a request would fail with a transport error
            google_api_base: "http://localhost:1".to_string(),
            ..Config::default()
        };

        let err = fetch_place_details(&reqwest::Client::new(), &config, Detail::Full)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::NotConfigured));
    }
}
