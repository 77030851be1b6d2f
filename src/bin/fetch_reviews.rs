//! Fetch reviews binary - loads the combined reviews from a running API server
//! and prints a short report, the way the site's reviews widget sees them.
//!
//! Usage:
//!   cargo run --bin fetch-reviews
//!
//! Optional:
//! - API_URL (defaults to http://localhost:3001)

use anyhow::Result;
use blg_api::{
    loader::ReviewsLoader,
    retry::RetryPolicy,
    reviews::ReviewSourceResult,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blg_api=info".parse()?),
        )
        .init();

    let api_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3001".to_string());

    let loader = ReviewsLoader::new(&api_url, RetryPolicy::reviews_loader())?;
    let envelope = loader.load_all().await?;

    info!("Reviews fetched at {}", envelope.timestamp.as_deref().unwrap_or("unknown time"));
    println!("{}", describe("Google", &envelope.data.google));
    println!("{}", describe("Facebook", &envelope.data.facebook));

    Ok(())
}

fn describe(label: &str, result: &ReviewSourceResult) -> String {
    match (result.data(), result.error()) {
        (Some(data), _) => {
            let rating = data
                .get("rating")
                .or_else(|| data.get("page").and_then(|p| p.get("overall_star_rating")))
                .map(|r| r.to_string())
                .unwrap_or_else(|| "n/a".to_string());
            let count = data
                .get("reviews")
                .or_else(|| data.get("ratings"))
                .and_then(|r| r.as_array())
                .map(|r| r.len())
                .unwrap_or(0);
            format!("✓ {}: rating {}, {} reviews", label, rating, count)
        }
        (None, error) => format!("✗ {}: {}", label, error.unwrap_or("unknown error")),
    }
}
