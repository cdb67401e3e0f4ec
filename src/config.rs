//! Environment-driven configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::payments::retry::RetryPolicy;
use crate::{Result, StorefrontError};

pub const WOMPI_SANDBOX_URL: &str = "https://sandbox.wompi.co/v1";
pub const WOMPI_PRODUCTION_URL: &str = "https://production.wompi.co/v1";
pub const MERCADOPAGO_URL: &str = "https://api.mercadopago.com";

#[derive(Debug, Clone)]
pub struct WompiConfig {
    pub base_url: String,
    pub public_key: String,
    pub integrity_secret: String,
    pub redirect_url: Option<String>,
    pub timeout: Duration,
}

impl WompiConfig {
    pub fn sandbox(public_key: impl Into<String>, integrity_secret: impl Into<String>) -> Self {
        Self {
            base_url: WOMPI_SANDBOX_URL.to_string(), public_key: public_key.into(),
            integrity_secret: integrity_secret.into(), redirect_url: None, timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub base_url: String,
    pub access_token: String,
    pub back_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub currency: String,
    pub wompi: WompiConfig,
    pub mercadopago: Option<MercadoPagoConfig>,
    pub payment_poll: RetryPolicy,
    /// Byte quota of each shopper session's storage.
    pub session_quota: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let port = parse_or("PORT", 8083)?;
        let currency = optional("STORE_CURRENCY").unwrap_or_else(|| "COP".to_string()).to_uppercase();

        let base_url = match optional("WOMPI_BASE_URL") {
            Some(url) => url,
            None => match optional("WOMPI_ENV").as_deref() {
                None | Some("sandbox") => WOMPI_SANDBOX_URL.to_string(),
                Some("production") => WOMPI_PRODUCTION_URL.to_string(),
                Some(other) => return Err(StorefrontError::Config(format!("Unknown WOMPI_ENV '{other}'"))),
            },
        };
        let wompi = WompiConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            public_key: required("WOMPI_PUBLIC_KEY")?,
            integrity_secret: required("WOMPI_INTEGRITY_SECRET")?,
            redirect_url: optional("WOMPI_REDIRECT_URL"),
            timeout: Duration::from_millis(parse_or("WOMPI_TIMEOUT_MS", 15_000)?),
        };

        let mercadopago = match optional("MERCADOPAGO_ACCESS_TOKEN") {
            Some(access_token) => Some(MercadoPagoConfig {
                base_url: optional("MERCADOPAGO_BASE_URL").unwrap_or_else(|| MERCADOPAGO_URL.to_string()),
                access_token,
                back_url: required("MERCADOPAGO_BACK_URL")?,
            }),
            None => None,
        };

        let payment_poll = RetryPolicy::new(
            parse_or("PAYMENT_POLL_ATTEMPTS", 5)?,
            Duration::from_millis(parse_or("PAYMENT_POLL_DELAY_MS", 1_000)?),
        );

        let session_quota = parse_or("SESSION_QUOTA_BYTES", 5 * 1024 * 1024)?;

        tracing::info!(wompi = %wompi.base_url, mercadopago = mercadopago.is_some(), "Configuration loaded");
        Ok(Self { port, currency, wompi, mercadopago, payment_poll, session_quota })
    }
}

fn optional(name: &str) -> Option<String> { env::var(name).ok().filter(|v| !v.trim().is_empty()) }

fn required(name: &str) -> Result<String> {
    optional(name).ok_or_else(|| StorefrontError::Config(format!("Missing environment variable '{name}'")))
}

fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw.parse().map_err(|e| StorefrontError::Config(format!("Invalid {name}: {e}"))),
        None => Ok(default),
    }
}
