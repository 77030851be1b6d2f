pub mod config;
pub mod contact;
pub mod error;
pub mod loader;
pub mod mailer;
pub mod rate_limit;
pub mod retry;
pub mod reviews;
pub mod server;
