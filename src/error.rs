use thiserror::Error;

#[derive(Error, Debug)]
pub enum PumpWatchError {
    #[error("WebSocket error: {0}")]
    WebsocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Unexpected price quote: {0}")]
    QuoteError(String),

    #[error("Telegram API error: {0}")]
    TelegramError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}
