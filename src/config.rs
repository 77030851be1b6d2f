use anyhow::{Context, Result};
use std::time::Duration;

/// Values shipped in `env.example` that mean "not filled in yet".
const PLACEHOLDERS: &[&str] = &[
    "YOUR_API_KEY_HERE",
    "your_google_api_key_here",
    "YOUR_PLACE_ID_HERE",
    "your_google_place_id_here",
    "YOUR_FACEBOOK_ACCESS_TOKEN_HERE",
    "your_facebook_page_access_token_here",
];

const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:8000",
    "http://localhost:3000",
    "http://127.0.0.1:8000",
];

const DEFAULT_EMAIL_TO: &str = "law@blglegalservices.com,dgililov@gmail.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Only an explicit development mode exposes error detail; any other
    /// value is treated as production.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            _ => Environment::Production,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub environment: Environment,
    pub allowed_origins: Vec<String>,
    pub trust_proxy: bool,

    // Google Places
    pub google_api_key: Option<String>,
    pub google_place_id: Option<String>,
    pub google_api_base: String,

    // Facebook Graph
    pub facebook_page_id: String,
    pub facebook_access_token: Option<String>,
    pub facebook_graph_base: String,

    // Applies to every outbound provider request
    pub provider_timeout_secs: u64,

    // Email (SMTP)
    pub email_host: String,
    pub email_port: u16,
    pub email_user: Option<String>,
    pub email_pass: Option<String>,
    pub email_to: Vec<String>,
}

impl Default for Config {
    /// Everything optional left unset: no provider and no mail transport configured.
    fn default() -> Self {
        Self {
            port: 3001,
            environment: Environment::Development,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            trust_proxy: false,
            google_api_key: None,
            google_place_id: None,
            google_api_base: "https://maps.googleapis.com".to_string(),
            facebook_page_id: "blglegalservices".to_string(),
            facebook_access_token: None,
            facebook_graph_base: "https://graph.facebook.com/v18.0".to_string(),
            provider_timeout_secs: 10,
            email_host: "smtp.gmail.com".to_string(),
            email_port: 587,
            email_user: None,
            email_pass: None,
            email_to: split_list(DEFAULT_EMAIL_TO),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Missing credentials are not an error: the matching feature reports
    /// itself as "not configured" at request time. Only malformed values fail.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            // Server
            port: parse_var("PORT")?.unwrap_or(defaults.port),
            environment: env_var("NODE_ENV")
                .or_else(|| env_var("APP_ENV"))
                .map(|v| Environment::parse(&v))
                .unwrap_or(defaults.environment),
            allowed_origins: env_var("ALLOWED_ORIGINS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.allowed_origins),
            trust_proxy: env_var("TRUST_PROXY")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.trust_proxy),

            // Google Places
            google_api_key: env_var("GOOGLE_PLACES_API_KEY"),
            google_place_id: env_var("GOOGLE_PLACE_ID"),
            google_api_base: env_var("GOOGLE_API_BASE").unwrap_or(defaults.google_api_base),

            // Facebook Graph
            facebook_page_id: env_var("FACEBOOK_PAGE_ID").unwrap_or(defaults.facebook_page_id),
            facebook_access_token: env_var("FACEBOOK_ACCESS_TOKEN"),
            facebook_graph_base: env_var("FACEBOOK_GRAPH_BASE")
                .unwrap_or(defaults.facebook_graph_base),

            provider_timeout_secs: parse_var("PROVIDER_TIMEOUT_SECS")?
                .unwrap_or(defaults.provider_timeout_secs),

            // Email
            email_host: env_var("EMAIL_HOST").unwrap_or(defaults.email_host),
            email_port: parse_var("EMAIL_PORT")?.unwrap_or(defaults.email_port),
            email_user: env_var("EMAIL_USER"),
            email_pass: env_var("EMAIL_PASS"),
            email_to: env_var("EMAIL_TO")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.email_to),
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// API key and place ID, or `None` if either is missing or a placeholder.
    pub fn google_credentials(&self) -> Option<(&str, &str)> {
        let key = usable(self.google_api_key.as_deref())?;
        let place_id = usable(self.google_place_id.as_deref())?;
        Some((key, place_id))
    }

    pub fn is_google_configured(&self) -> bool {
        self.google_credentials().is_some()
    }

    /// Page access token, or `None` if missing or a placeholder.
    pub fn facebook_token(&self) -> Option<&str> {
        usable(self.facebook_access_token.as_deref())
    }

    pub fn is_facebook_configured(&self) -> bool {
        self.facebook_token().is_some()
    }

    /// SMTP credentials, present only when both user and password are set.
    pub fn email_credentials(&self) -> Option<(&str, &str)> {
        match (self.email_user.as_deref(), self.email_pass.as_deref()) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }

    pub fn is_email_configured(&self) -> bool {
        self.email_credentials().is_some() && !self.email_to.is_empty()
    }

    /// Place ID suitable for display, hiding placeholder values.
    pub fn display_place_id(&self) -> Option<&str> {
        usable(self.google_place_id.as_deref())
    }
}

fn usable(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && !PLACEHOLDERS.contains(v))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_var(name)
        .map(|v| v.parse::<T>().context(format!("{} has an invalid value: '{}'", name, v)))
        .transpose()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
