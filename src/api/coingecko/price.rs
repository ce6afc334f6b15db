use crate::error::PumpWatchError;
use log::{debug, error, info};
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Latest fiat price of one unit of the base asset, shared between the
/// oracle task and the token monitor. Reads as zero until the first fetch.
#[derive(Debug, Clone, Default)]
pub struct ExchangeRate(Arc<AtomicU64>);

impl ExchangeRate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, rate: f64) {
        self.0.store(rate.to_bits(), Ordering::Release);
    }

    pub fn convert(&self, base_amount: f64) -> f64 {
        base_amount * self.get()
    }
}

pub struct PriceOracle {
    client: Client,
    url: String,
    asset: String,
    currency: String,
    rate: ExchangeRate,
}

impl PriceOracle {
    pub fn new(
        url: impl Into<String>,
        asset: impl Into<String>,
        currency: impl Into<String>,
        timeout: Duration,
        rate: ExchangeRate,
    ) -> Result<Self, PumpWatchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pumpwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            asset: asset.into(),
            currency: currency.into(),
            rate,
        })
    }

    /// Fetches one quote. The shared rate is only replaced on success.
    pub async fn refresh(&self) -> Result<f64, PumpWatchError> {
        debug!("Fetching {}/{} quote from {}", self.asset, self.currency, self.url);

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PumpWatchError::QuoteError(format!("status {}: {}", status, body)));
        }

        let body: Value = response.json().await?;
        let price = extract_price(&body, &self.asset, &self.currency)?;
        self.rate.set(price);
        Ok(price)
    }

    /// Refreshes immediately and then on every `every` tick. Failures keep
    /// the previous rate and never stop the timer.
    pub async fn run(self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.refresh().await {
                Ok(price) => info!(
                    "Updated {}/{} price: {}",
                    self.asset.to_uppercase(),
                    self.currency.to_uppercase(),
                    price
                ),
                Err(e) => error!(
                    "Error fetching {} price (keeping {}): {}",
                    self.asset,
                    self.rate.get(),
                    e
                ),
            }
        }
    }
}

/// Reads `body[asset][currency]`, e.g. `{"solana":{"usd":151.2}}`.
fn extract_price(body: &Value, asset: &str, currency: &str) -> Result<f64, PumpWatchError> {
    let price = body
        .get(asset)
        .and_then(|quote| quote.get(currency))
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            PumpWatchError::QuoteError(format!("missing {}.{} in {}", asset, currency, body))
        })?;

    if !price.is_finite() || price <= 0.0 {
        return Err(PumpWatchError::QuoteError(format!(
            "non-positive {}/{} price {}",
            asset, currency, price
        )));
    }
    Ok(price)
}
