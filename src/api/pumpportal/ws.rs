use crate::api::pumpportal::events::{FeedEvent, FeedRequest};
use crate::error::PumpWatchError;
use crate::tracker::monitor::Monitor;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
    Errored,
}

pub struct FeedClient {
    url: String,
    pool: String,
    reconnect_delay: Duration,
    state: FeedState,
}

impl FeedClient {
    pub fn new(url: impl Into<String>, pool: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            url: url.into(),
            pool: pool.into(),
            reconnect_delay,
            state: FeedState::Disconnected,
        }
    }

    /// Holds the feed open forever. Every close or failure is followed by one
    /// reconnect attempt after the fixed delay.
    pub async fn run(mut self, mut monitor: Monitor) {
        loop {
            self.transition(FeedState::Connecting);
            let ended = self.session(&mut monitor).await;
            self.end_session(ended);
            self.transition(FeedState::Disconnected);
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn session(&mut self, monitor: &mut Monitor) -> Result<(), PumpWatchError> {
        info!("Connecting to feed: {}", self.url);
        let (ws_stream, _) = connect_async(&self.url).await?;
        self.transition(FeedState::Connected);

        let (mut write, mut read) = ws_stream.split();
        write.send(encode(&FeedRequest::NewTokens {})?).await?;

        // Tokens still tracked from an earlier connection need their trade
        // subscriptions back.
        let tracked = monitor.tracked_ids();
        if !tracked.is_empty() {
            info!("Resubscribing to trades for {} tracked tokens", tracked.len());
        }
        for mint in tracked {
            write.send(encode(&FeedRequest::token_trades(mint))?).await?;
        }

        while let Some(message) = read.next().await {
            match message? {
                Message::Text(text) => {
                    let event = match FeedEvent::parse(&text, &self.pool) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("Discarding malformed feed message: {}", e);
                            continue;
                        }
                    };
                    if let Some(request) = monitor.dispatch(event) {
                        debug!("Sending {:?}", request);
                        write.send(encode(&request)?).await?;
                    }
                }
                Message::Close(frame) => {
                    info!("Feed closed by server: {:?}", frame);
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn end_session(&mut self, ended: Result<(), PumpWatchError>) {
        match ended {
            Ok(()) => {
                self.transition(FeedState::Closed);
                warn!(
                    "Feed connection closed. Reconnecting in {:?}...",
                    self.reconnect_delay
                );
            }
            Err(e) => {
                self.transition(FeedState::Errored);
                error!(
                    "Feed connection error: {}. Reconnecting in {:?}...",
                    e, self.reconnect_delay
                );
            }
        }
    }

    fn transition(&mut self, next: FeedState) {
        debug!("Feed state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

fn encode(request: &FeedRequest) -> Result<Message, PumpWatchError> {
    Ok(Message::Text(serde_json::to_string(request)?))
}
