use std::env;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Runtime configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub whatsapp_api_url: String,
    pub whatsapp_api_token: String,
    pub webhook_verify_token: String,
    pub bulksms_api_url: String,
    pub bulksms_api_token: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            whatsapp_api_url: env::var("WHATSAPP_API_URL")
                .context("WHATSAPP_API_URL must be set")?,
            whatsapp_api_token: env::var("WHATSAPP_API_TOKEN")
                .context("WHATSAPP_API_TOKEN must be set")?,
            webhook_verify_token: env::var("WEBHOOK_VERIFY_TOKEN")
                .context("WEBHOOK_VERIFY_TOKEN must be set")?,
            bulksms_api_url: env::var("BULKSMS_API_URL").context("BULKSMS_API_URL must be set")?,
            bulksms_api_token: env::var("BULKSMS_API_TOKEN")
                .context("BULKSMS_API_TOKEN must be set")?,
        })
    }
}
