use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const SUBSCRIBED_ACK: &str = "Successfully subscribed";

/// Outbound subscription requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum FeedRequest {
    #[serde(rename = "subscribeNewToken")]
    NewTokens {},
    #[serde(rename = "subscribeTokenTrade")]
    TokenTrades { mint: String },
}

impl FeedRequest {
    pub fn token_trades(mint: impl Into<String>) -> Self {
        FeedRequest::TokenTrades { mint: mint.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTokenEvent {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub uri: Option<String>,
    pub market_cap_sol: f64,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    pub mint: String,
    /// Absent when the trade carried no usable market cap.
    pub market_cap_sol: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Ack,
    NewToken(NewTokenEvent),
    Trade(TradeEvent),
    Ignored,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    message: Option<String>,
    tx_type: Option<String>,
    pool: Option<String>,
    mint: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
    uri: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    market_cap_sol: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    timestamp: Option<i64>,
}

impl FeedEvent {
    /// Classifies one text frame. Only creation events from `pool` are
    /// reported as new tokens.
    pub fn parse(text: &str, pool: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Ok(FeedEvent::Ignored);
        }
        let raw: RawEvent = serde_json::from_value(value)?;

        if raw
            .message
            .as_deref()
            .map_or(false, |m| m.contains(SUBSCRIBED_ACK))
        {
            return Ok(FeedEvent::Ack);
        }

        let mint = match raw.mint.filter(|m| !m.is_empty()) {
            Some(mint) => mint,
            None => return Ok(FeedEvent::Ignored),
        };

        let event = match raw.tx_type.as_deref() {
            Some("create") if raw.pool.as_deref() == Some(pool) => {
                FeedEvent::NewToken(NewTokenEvent {
                    mint,
                    name: raw.name.unwrap_or_default(),
                    symbol: raw.symbol.unwrap_or_default(),
                    uri: raw.uri,
                    market_cap_sol: raw.market_cap_sol.unwrap_or(0.0),
                    timestamp: raw.timestamp,
                })
            }
            Some("buy") | Some("sell") => FeedEvent::Trade(TradeEvent {
                mint,
                market_cap_sol: raw.market_cap_sol,
            }),
            _ => FeedEvent::Ignored,
        };
        Ok(event)
    }
}

// The feed has sent numeric fields both as numbers and as strings.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .filter(|v: &f64| v.is_finite() && *v >= 0.0))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}
