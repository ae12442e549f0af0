use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
pub const DEFAULT_TRANSACTION_TYPE: &str = "CustomerPayBillOnline";

/// Credentials and endpoints for the Daraja gateway.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
    pub transaction_type: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("MPESA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            consumer_key: std::env::var("MPESA_CONSUMER_KEY").unwrap_or_default(),
            consumer_secret: std::env::var("MPESA_CONSUMER_SECRET").unwrap_or_default(),
            shortcode: std::env::var("MPESA_SHORTCODE").unwrap_or_else(|_| "174379".to_string()),
            passkey: std::env::var("MPESA_PASSKEY").unwrap_or_default(),
            callback_url: std::env::var("MPESA_CALLBACK_URL")
                .unwrap_or_else(|_| "https://example.com/mpesa/callback".to_string()),
            transaction_type: std::env::var("MPESA_TRANSACTION_TYPE")
                .unwrap_or_else(|_| DEFAULT_TRANSACTION_TYPE.to_string()),
            timeout: Duration::from_secs(env_parse("MPESA_HTTP_TIMEOUT_SECS", 30)),
        }
    }
}

/// Business limits and timings of the payment lifecycle.
#[derive(Clone, Debug)]
pub struct PaymentSettings {
    pub max_amount: Decimal,
    /// Window between creation and expiry of every payment.
    pub payment_timeout: chrono::Duration,
    pub max_retries: u32,
    /// Subtracted from the gateway-reported token lifetime.
    pub token_safety_margin: Duration,
    pub reaper_interval: Duration,
    pub worker_pool_size: usize,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            max_amount: dec!(150000),
            payment_timeout: chrono::Duration::minutes(5),
            max_retries: 3,
            token_safety_margin: Duration::from_secs(5 * 60),
            reaper_interval: Duration::from_secs(60),
            worker_pool_size: 8,
        }
    }
}

impl PaymentSettings {
    /// Defaults, overridden by `MPESA_MAX_AMOUNT`, `MPESA_MAX_RETRIES`,
    /// `MPESA_REAPER_INTERVAL_SECS` and `MPESA_WORKERS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_amount: std::env::var("MPESA_MAX_AMOUNT")
                .ok()
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(defaults.max_amount),
            max_retries: env_parse("MPESA_MAX_RETRIES", defaults.max_retries),
            reaper_interval: Duration::from_secs(env_parse(
                "MPESA_REAPER_INTERVAL_SECS",
                defaults.reaper_interval.as_secs(),
            )),
            worker_pool_size: env_parse("MPESA_WORKERS", defaults.worker_pool_size).max(1),
            ..defaults
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}
