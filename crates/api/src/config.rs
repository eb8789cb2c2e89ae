//! Server configuration loaded from the environment

use std::path::PathBuf;

use relaybase_billing::client::DEFAULT_API_BASE;
use relaybase_billing::StripeConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,
    pub database_max_connections: u32,
    /// Public origin used for checkout return URLs, e.g. `https://relay.example`
    pub domain_name: String,
    /// HS256 secret for auth tokens
    pub auth_token_secret: String,
    pub auth_token_expiry_hours: i64,
    pub stripe: StripeConfig,
    pub content_dir: PathBuf,
    pub allowed_origins: Vec<String>,
    /// Key for admin-only endpoints; unset disables them
    pub admin_api_key: Option<String>,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

impl Config {
    /// Build the configuration, failing fast on any missing secret
    pub fn from_env() -> Result<Self, ConfigError> {
        let stripe = StripeConfig {
            webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            secret_key: required("STRIPE_SECRET_KEY")?,
            price_id: optional("STRIPE_PRICE_ID"),
            api_base: optional("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        };

        let domain_name = required("DOMAIN_NAME")?;
        if !domain_name.starts_with("http://") && !domain_name.starts_with("https://") {
            return Err(ConfigError::Invalid {
                name: "DOMAIN_NAME",
                reason: "must include the http(s) scheme".to_string(),
            });
        }

        Ok(Self {
            bind_address: optional("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            database_url: required("DATABASE_URL")?,
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            domain_name: domain_name.trim_end_matches('/').to_string(),
            auth_token_secret: required("AUTH_TOKEN_SECRET")?,
            auth_token_expiry_hours: parsed("AUTH_TOKEN_EXPIRY_HOURS", 24 * 14)?,
            stripe,
            content_dir: PathBuf::from(
                optional("CONTENT_DIR").unwrap_or_else(|| "./content".to_string()),
            ),
            allowed_origins: optional("ALLOWED_ORIGINS")
                .unwrap_or_else(|| "http://localhost:3000,http://127.0.0.1:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            admin_api_key: optional("ADMIN_API_KEY"),
        })
    }
}
