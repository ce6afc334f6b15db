use crate::api::coingecko::price::ExchangeRate;
use crate::api::pumpportal::events::NewTokenEvent;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedToken {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub uri: Option<String>,
    pub market_cap_sol: f64,
    pub created_at: DateTime<Utc>,
}

impl TrackedToken {
    pub fn from_event(event: &NewTokenEvent) -> Self {
        let created_at = event
            .timestamp
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now);

        Self {
            id: event.mint.clone(),
            name: event.name.clone(),
            symbol: event.symbol.clone(),
            uri: event.uri.clone(),
            market_cap_sol: event.market_cap_sol,
            created_at,
        }
    }
}

/// Ids that already produced their one notification.
///
/// Unbounded unless a capacity is given; with a capacity the oldest id is
/// evicted first, after which that id could alert again.
#[derive(Debug, Default)]
pub struct AlertedSet {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl AlertedSet {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns false if the id was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());

        if let Some(capacity) = self.capacity {
            while self.order.len() > capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.ids.remove(&oldest);
                }
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Tokens under watch plus the ids that already alerted. An id lives in at
/// most one of the two.
pub struct TokenRegistry {
    tokens: HashMap<String, TrackedToken>,
    alerted: AlertedSet,
    threshold_usd: f64,
    rate: ExchangeRate,
}

impl TokenRegistry {
    pub fn new(threshold_usd: f64, rate: ExchangeRate, alerted_capacity: Option<usize>) -> Self {
        Self {
            tokens: HashMap::new(),
            alerted: AlertedSet::new(alerted_capacity),
            threshold_usd,
            rate,
        }
    }

    /// Starts tracking the token unless it already alerted. A repeated
    /// creation event replaces the tracked record.
    pub fn upsert_from_new_token(&mut self, event: &NewTokenEvent) -> bool {
        if self.alerted.contains(&event.mint) {
            return false;
        }
        self.tokens
            .insert(event.mint.clone(), TrackedToken::from_event(event));
        true
    }

    /// Updates the market cap of a tracked token; false if it is not tracked.
    pub fn apply_trade(&mut self, id: &str, market_cap_sol: f64) -> bool {
        match self.tokens.get_mut(id) {
            Some(token) => {
                token.market_cap_sol = market_cap_sol;
                true
            }
            None => false,
        }
    }

    /// Whether the tracked token `id` currently qualifies for its alert.
    pub fn evaluate(&self, id: &str) -> bool {
        self.tokens
            .get(id)
            .map_or(false, |token| self.qualifies(token))
    }

    /// Fiat market cap at or above the threshold, and no earlier alert.
    pub fn qualifies(&self, token: &TrackedToken) -> bool {
        !self.alerted.contains(&token.id) && self.fiat_market_cap(token) >= self.threshold_usd
    }

    pub fn fiat_market_cap(&self, token: &TrackedToken) -> f64 {
        self.rate.convert(token.market_cap_sol)
    }

    /// Moves `id` into the alerted set, returning the tracked record if any.
    pub fn mark_alerted(&mut self, id: &str) -> Option<TrackedToken> {
        self.alerted.insert(id);
        self.tokens.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tokens.contains_key(id)
    }

    pub fn is_alerted(&self, id: &str) -> bool {
        self.alerted.contains(id)
    }

    pub fn tracked_ids(&self) -> Vec<String> {
        self.tokens.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn alerted_len(&self) -> usize {
        self.alerted.len()
    }
}
