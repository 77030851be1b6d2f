use crate::config::Config;
use crate::contact::{ContactError, ContactRelay, ContactSubmission};
use crate::error::ApiError;
use crate::mailer::Mailer;
use crate::rate_limit::SlidingWindowLimiter;
use crate::reviews::{ProviderError, ReviewAggregator};
use anyhow::Result;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderName, HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{error, warn};

/// Request bodies above this are refused with 413.
pub const BODY_LIMIT_BYTES: usize = 10 * 1024;

const SERVICE_NAME: &str = "BLG Legal Services API";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub reviews: ReviewAggregator,
    pub contact: Arc<ContactRelay>,
    pub limiter: Arc<SlidingWindowLimiter>,
}

impl AppState {
    pub fn new(config: Config, mailer: Option<Arc<dyn Mailer>>) -> Result<Self> {
        let config = Arc::new(config);
        let contact = ContactRelay::new(Arc::clone(&config), mailer);
        Self::from_parts(config, contact, SlidingWindowLimiter::general())
    }

    /// Assemble state from prebuilt parts (custom limits in tests).
    pub fn from_parts(
        config: Arc<Config>,
        contact: ContactRelay,
        limiter: SlidingWindowLimiter,
    ) -> Result<Self> {
        Ok(Self {
            reviews: ReviewAggregator::new(Arc::clone(&config))?,
            contact: Arc::new(contact),
            limiter: Arc::new(limiter),
            config,
        })
    }
}

/// Source address of the request, used as the rate-limit key.
///
/// `X-Forwarded-For` is honored only when the deployment sits behind a
/// trusted proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

#[async_trait]
impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if state.config.trust_proxy {
            let forwarded = parts
                .headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());

            if let Some(addr) = forwarded {
                return Ok(ClientAddr(addr.to_string()));
            }
        }

        let addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(ClientAddr(addr))
    }
}

pub fn router(state: AppState) -> Router {
    let development = state.config.is_development();

    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(api_status))
        .route("/api/reviews", get(google_reviews))
        .route("/api/facebook-reviews", get(facebook_reviews))
        .route("/api/all-reviews", get(all_reviews))
        .route("/api/contact", post(submit_contact))
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), general_rate_limit))
        .layer(cors_layer(&state.config))
        .layer(middleware::from_fn_with_state(state.clone(), security_headers))
        .layer(CompressionLayer::new())
        .layer(CatchPanicLayer::custom(move |panic: Box<dyn Any + Send + 'static>| {
            panic_response(panic, development)
        }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

// ==================== Middleware ====================

async fn general_rate_limit(
    State(state): State<AppState>,
    client: ClientAddr,
    request: Request,
    next: Next,
) -> Response {
    if !state.limiter.check(&client.0) {
        warn!("General rate limit exceeded for {}", client.0);
        return ApiError::RateLimited("Too many requests, please try again later.").into_response();
    }
    next.run(request).await
}

async fn security_headers(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    let fixed: [(HeaderName, &'static str); 5] = [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
        (header::REFERRER_POLICY, "no-referrer"),
        (HeaderName::from_static("cross-origin-resource-policy"), "cross-origin"),
        (HeaderName::from_static("x-dns-prefetch-control"), "off"),
    ];
    for (name, value) in fixed {
        headers.insert(name, HeaderValue::from_static(value));
    }

    if !state.config.is_development() {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=15552000; includeSubDomains"),
        );
    }

    response
}

fn panic_response(panic: Box<dyn Any + Send + 'static>, development: bool) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    error!("Unhandled error: {}", detail);
    ApiError::internal("Internal Server Error", detail, "Something went wrong", development)
        .into_response()
}

// ==================== Handlers ====================

async fn health(State(state): State<AppState>) -> Json<Value> {
    let config = &state.config;
    let flag = |configured: bool| if configured { "configured" } else { "not configured" };

    Json(json!({
        "status": "OK",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "environment": config.environment.as_str(),
        "configuration": {
            "googlePlaces": flag(config.is_google_configured()),
            "facebook": flag(config.is_facebook_configured()),
            "email": flag(state.contact.is_mail_configured()),
            "placeId": config.display_place_id(),
            "facebookPageId": config.facebook_page_id,
        }
    }))
}

async fn api_status(State(state): State<AppState>) -> Json<Value> {
    let config = &state.config;
    let google = config.is_google_configured();
    let facebook = config.is_facebook_configured();
    let contact_limit = state.contact.limiter();

    Json(json!({
        "status": "operational",
        "endpoints": {
            "/health": {"method": "GET", "description": "Health check"},
            "/api/reviews": {"method": "GET", "description": "Google Places reviews", "configured": google},
            "/api/facebook-reviews": {"method": "GET", "description": "Facebook page data", "configured": facebook},
            "/api/all-reviews": {"method": "GET", "description": "Combined reviews", "configured": google || facebook},
            "/api/contact": {"method": "POST", "description": "Contact form submission", "configured": true},
        },
        "rateLimit": {
            "general": format!(
                "{} requests per {} minutes",
                state.limiter.max_hits(),
                state.limiter.window().as_secs() / 60
            ),
            "contactForm": format!(
                "{} submissions per {} minutes",
                contact_limit.max_hits(),
                contact_limit.window().as_secs() / 60
            ),
        }
    }))
}

async fn google_reviews(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let data = state.reviews.google_reviews().await.map_err(|e| {
        provider_error(
            e,
            "Google API not configured",
            "Please configure GOOGLE_PLACES_API_KEY and GOOGLE_PLACE_ID in .env file",
            "Failed to fetch reviews",
            state.config.is_development(),
        )
    })?;

    Ok(Json(json!({
        "success": true,
        "source": "google",
        "data": data,
        "cached": false,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

async fn facebook_reviews(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let reviews = state.reviews.facebook_reviews().await.map_err(|e| {
        provider_error(
            e,
            "Facebook API not configured",
            "Please configure FACEBOOK_ACCESS_TOKEN in .env file",
            "Failed to fetch Facebook data",
            state.config.is_development(),
        )
    })?;

    Ok(Json(json!({
        "success": true,
        "source": "facebook",
        "data": reviews.to_full_value(),
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

/// Always 200: provider failures live inside each provider's slot.
async fn all_reviews(State(state): State<AppState>) -> Json<Value> {
    let all = state.reviews.all_reviews().await;

    Json(json!({
        "success": true,
        "data": all,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn submit_contact(
    State(state): State<AppState>,
    client: ClientAddr,
    body: Result<Json<ContactSubmission>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(submission) = body.map_err(|rejection| ApiError::InvalidBody {
        status: rejection.status(),
        message: rejection.body_text(),
    })?;

    let receipt = state
        .contact
        .submit(&client.0, submission)
        .await
        .map_err(|e| match e {
            ContactError::RateLimited => {
                ApiError::RateLimited("Too many contact form submissions, please try again later.")
            }
            ContactError::Invalid(errors) => ApiError::Validation(errors),
        })?;

    Ok(Json(json!({
        "success": true,
        "message": receipt.message,
        "reference": receipt.reference,
    })))
}

async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Endpoint {} {} not found", method, uri.path()))
}

/// Map a single-provider failure onto an HTTP error.
fn provider_error(
    err: ProviderError,
    not_configured: &'static str,
    setup_hint: &'static str,
    public_message: &str,
    development: bool,
) -> ApiError {
    match err {
        ProviderError::NotConfigured => ApiError::NotConfigured {
            error: not_configured,
            message: setup_hint,
        },
        ProviderError::Rejected {
            status,
            kind,
            message,
        } => ApiError::Upstream {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            error: kind,
            message,
        },
        other => {
            error!("Provider request failed: {}", other);
            ApiError::internal("Server error", &other, public_message, development)
        }
    }
}
