use anyhow::{Context, Result};
use blg_api::{
    config::Config,
    mailer::{Mailer, SmtpMailer},
    server::{self, AppState},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when variables come from the host)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blg_api=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    log_configuration(&config);

    let mailer = SmtpMailer::from_config(&config)?.map(|m| Arc::new(m) as Arc<dyn Mailer>);
    let port = config.port;
    let state = AppState::new(config, mailer)?;
    let app = server::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to {}", addr))?;

    info!("🚀 Server running on http://localhost:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

fn log_configuration(config: &Config) {
    let status = |configured: bool| if configured { "✓ configured" } else { "✗ not configured" };

    info!("Environment: {}", config.environment.as_str());
    info!("Google Places API: {}", status(config.is_google_configured()));
    info!("Facebook Graph API: {}", status(config.is_facebook_configured()));
    info!("Email notifications: {}", status(config.is_email_configured()));
    info!("Place ID: {}", config.display_place_id().unwrap_or("not set"));
    info!("Facebook page: {}", config.facebook_page_id);

    if !config.is_google_configured() && !config.is_facebook_configured() {
        warn!("No review provider configured; review endpoints will report \"not configured\"");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
