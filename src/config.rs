use crate::error::PumpWatchError;
use std::time::Duration;

const DEFAULT_FEED_URL: &str = "wss://pumpportal.fun/api/data";
const DEFAULT_POOL: &str = "pump";
const DEFAULT_PRICE_ASSET: &str = "solana";
const DEFAULT_PRICE_CURRENCY: &str = "usd";
const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct Config {
    pub feed_url: String,
    pub pool: String,
    pub price_url: String,
    pub price_asset: String,
    pub price_currency: String,
    pub price_timeout: Duration,
    pub threshold_usd: f64,
    pub refresh_interval: Duration,
    pub reconnect_delay: Duration,
    /// `None` keeps every alerted id for the lifetime of the process.
    pub alerted_capacity: Option<usize>,
    pub telegram_api_url: String,
    pub telegram_token: Option<String>,
    pub chat_ids: Vec<String>,
    pub verbose: bool,
}

impl Config {
    /// Loads an optional `.env` file, then reads the process environment.
    pub fn from_env() -> Result<Self, PumpWatchError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, PumpWatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let price_asset = get("PUMPWATCH_PRICE_ASSET").unwrap_or_else(|| DEFAULT_PRICE_ASSET.into());
        let price_currency =
            get("PUMPWATCH_PRICE_CURRENCY").unwrap_or_else(|| DEFAULT_PRICE_CURRENCY.into());
        let price_url = get("PUMPWATCH_PRICE_URL").unwrap_or_else(|| {
            format!(
                "https://api.coingecko.com/api/v3/simple/price?ids={}&vs_currencies={}",
                price_asset, price_currency
            )
        });

        let threshold_usd: f64 = parse_or(get("PUMPWATCH_THRESHOLD_USD"), "PUMPWATCH_THRESHOLD_USD", 5000.0)?;
        if !threshold_usd.is_finite() || threshold_usd <= 0.0 {
            return Err(PumpWatchError::ConfigError(format!(
                "PUMPWATCH_THRESHOLD_USD must be positive, got {}",
                threshold_usd
            )));
        }

        let alerted_capacity =
            match parse_or(get("PUMPWATCH_ALERTED_CAPACITY"), "PUMPWATCH_ALERTED_CAPACITY", 0usize)? {
                0 => None,
                n => Some(n),
            };

        let chat_ids = get("TELEGRAM_CHAT_IDS")
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let verbose = get("PUMPWATCH_VERBOSE")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        Ok(Self {
            feed_url: get("PUMPWATCH_FEED_URL").unwrap_or_else(|| DEFAULT_FEED_URL.into()),
            pool: get("PUMPWATCH_POOL").unwrap_or_else(|| DEFAULT_POOL.into()),
            price_url,
            price_asset,
            price_currency,
            price_timeout: secs(get("PUMPWATCH_PRICE_TIMEOUT_SECS"), "PUMPWATCH_PRICE_TIMEOUT_SECS", 10)?,
            threshold_usd,
            refresh_interval: secs(get("PUMPWATCH_REFRESH_SECS"), "PUMPWATCH_REFRESH_SECS", 60)?,
            reconnect_delay: secs(get("PUMPWATCH_RECONNECT_SECS"), "PUMPWATCH_RECONNECT_SECS", 5)?,
            alerted_capacity,
            telegram_api_url: get("TELEGRAM_API_URL")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.into()),
            telegram_token: get("TELEGRAM_BOT_TOKEN"),
            chat_ids,
            verbose,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    key: &str,
    default: T,
) -> Result<T, PumpWatchError> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| PumpWatchError::ConfigError(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

fn secs(value: Option<String>, key: &str, default: u64) -> Result<Duration, PumpWatchError> {
    match parse_or(value, key, default)? {
        0 => Err(PumpWatchError::ConfigError(format!("{} must be at least 1", key))),
        n => Ok(Duration::from_secs(n)),
    }
}
