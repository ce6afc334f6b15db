use crate::api::pumpportal::events::{FeedEvent, FeedRequest, NewTokenEvent, TradeEvent};
use crate::tracker::registry::{TokenRegistry, TrackedToken};
use log::{debug, error, info};
use tokio::sync::mpsc::UnboundedSender;

/// A token that just crossed the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub token: TrackedToken,
    pub fiat_market_cap: f64,
}

/// Turns feed events into registry updates and one-shot alerts.
///
/// Every handler runs to completion without awaiting, so a threshold check
/// and the move into the alerted set cannot interleave with another event.
pub struct Monitor {
    registry: TokenRegistry,
    alerts: UnboundedSender<Alert>,
}

impl Monitor {
    pub fn new(registry: TokenRegistry, alerts: UnboundedSender<Alert>) -> Self {
        Self { registry, alerts }
    }

    /// Returns the request the feed connection should send next, if any.
    pub fn dispatch(&mut self, event: FeedEvent) -> Option<FeedRequest> {
        match event {
            FeedEvent::NewToken(event) => self.on_new_token(event),
            FeedEvent::Trade(event) => {
                self.on_trade(event);
                None
            }
            FeedEvent::Ack | FeedEvent::Ignored => None,
        }
    }

    pub fn on_new_token(&mut self, event: NewTokenEvent) -> Option<FeedRequest> {
        let token = TrackedToken::from_event(&event);
        debug!(
            "New token {} ({}) {}: {:.2} SOL, ${:.2}, metadata {}",
            token.name,
            token.symbol,
            token.id,
            token.market_cap_sol,
            self.registry.fiat_market_cap(&token),
            token.uri.as_deref().unwrap_or("-")
        );

        if self.registry.is_alerted(&token.id) {
            debug!("Ignoring creation of already alerted token {}", token.id);
            return None;
        }

        if self.registry.qualifies(&token) {
            self.registry.mark_alerted(&token.id);
            self.emit(token);
            return None;
        }

        if self.registry.upsert_from_new_token(&event) {
            Some(FeedRequest::token_trades(event.mint))
        } else {
            None
        }
    }

    pub fn on_trade(&mut self, event: TradeEvent) {
        if !self.registry.contains(&event.mint) {
            return;
        }

        // A zero market cap carries no information; keep the last known one.
        if let Some(market_cap_sol) = event.market_cap_sol.filter(|cap| *cap > 0.0) {
            self.registry.apply_trade(&event.mint, market_cap_sol);
        }
        debug!("Trade update for {}: {:?} SOL", event.mint, event.market_cap_sol);

        if self.registry.evaluate(&event.mint) {
            if let Some(token) = self.registry.mark_alerted(&event.mint) {
                self.emit(token);
            }
        }
    }

    pub fn tracked_ids(&self) -> Vec<String> {
        self.registry.tracked_ids()
    }

    fn emit(&self, token: TrackedToken) {
        let fiat_market_cap = self.registry.fiat_market_cap(&token);
        info!(
            "Qualified token {} ({}) {} at ${:.2}, {}s after creation ({} tracked, {} alerted)",
            token.name,
            token.symbol,
            token.id,
            fiat_market_cap,
            (chrono::Utc::now() - token.created_at).num_seconds(),
            self.registry.len(),
            self.registry.alerted_len()
        );

        if let Err(e) = self.alerts.send(Alert {
            token,
            fiat_market_cap,
        }) {
            error!("Alert dispatcher is gone, dropping alert: {}", e);
        }
    }
}
