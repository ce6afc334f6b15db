mod api;
mod config;
mod error;
#[cfg(test)]
mod test_support;
mod tracker;

use api::coingecko::price::{ExchangeRate, PriceOracle};
use api::pumpportal::ws::FeedClient;
use api::telegram::notify::{self, TelegramNotifier};
use config::Config;
use env_logger::Builder;
use log::{info, warn, LevelFilter};
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use tracker::monitor::Monitor;
use tracker::registry::TokenRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = Config::from_env()?;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module(
            "pumpwatch",
            if config.verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            },
        )
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%H:%M:%S%.3f");
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();

    info!(
        "Starting pumpwatch: alerting at ${} market cap on pool '{}'",
        config.threshold_usd, config.pool
    );

    let rate = ExchangeRate::new();
    let oracle = PriceOracle::new(
        config.price_url.clone(),
        config.price_asset.clone(),
        config.price_currency.clone(),
        config.price_timeout,
        rate.clone(),
    )?;

    let notifier = Arc::new(TelegramNotifier::new(
        config.telegram_api_url.clone(),
        config.telegram_token.clone(),
        config.chat_ids.clone(),
    )?);
    if notifier.is_enabled() {
        info!("Telegram alerts go to {} chats", config.chat_ids.len());
    } else {
        warn!("TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_IDS not set, alerts will only be logged");
    }

    let (alert_tx, alert_rx) = tokio::sync::mpsc::unbounded_channel();
    let registry = TokenRegistry::new(config.threshold_usd, rate, config.alerted_capacity);
    let monitor = Monitor::new(registry, alert_tx);
    let feed = FeedClient::new(config.feed_url.clone(), config.pool.clone(), config.reconnect_delay);

    let price_handle = tokio::spawn(oracle.run(config.refresh_interval));
    let dispatch_handle = tokio::spawn(notify::run_dispatcher(notifier, alert_rx));
    let feed_handle = tokio::spawn(feed.run(monitor));

    // None of these finish on their own; the process runs until killed.
    tokio::select! {
        _ = price_handle => warn!("Price oracle stopped"),
        _ = dispatch_handle => warn!("Alert dispatcher stopped"),
        _ = feed_handle => warn!("Feed client stopped"),
    };

    info!("Shutdown complete");
    Ok(())
}
