use crate::error::PumpWatchError;
use crate::tracker::monitor::Alert;
use futures::future::join_all;
use log::{debug, error, info, warn};
use num_format::{Locale, ToFormattedString};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const PARSE_MODE: &str = "Markdown";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    token: Option<String>,
    chat_ids: Vec<String>,
}

impl TelegramNotifier {
    pub fn new(
        api_url: impl Into<String>,
        token: Option<String>,
        chat_ids: Vec<String>,
    ) -> Result<Self, PumpWatchError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
            chat_ids,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some() && !self.chat_ids.is_empty()
    }

    /// Sends `text` to every configured chat. Each chat is delivered on its
    /// own; one failing chat never blocks or fails the others.
    pub async fn notify(&self, text: &str) -> DeliveryReport {
        let token = match &self.token {
            Some(token) if !self.chat_ids.is_empty() => token,
            _ => return DeliveryReport::default(),
        };

        let deliveries = self
            .chat_ids
            .iter()
            .map(|chat_id| self.deliver(token, chat_id, text));
        let results = join_all(deliveries).await;

        let mut report = DeliveryReport::default();
        for (chat_id, result) in self.chat_ids.iter().zip(results) {
            match result {
                Ok(()) => {
                    debug!("Telegram message sent to {}", chat_id);
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!("Error sending Telegram message to {}: {}", chat_id, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn deliver(&self, token: &str, chat_id: &str, text: &str) -> Result<(), PumpWatchError> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, token);
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": PARSE_MODE,
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PumpWatchError::TelegramError(format!("{} {}", status, body)));
        }
        Ok(())
    }
}

pub fn format_alert(alert: &Alert) -> String {
    format!(
        "💎 *Qualified Token Found!*\n*Name:* {} ({})\n*Mint:* `{}`\n*Market Cap:* ${}",
        escape_markdown(&alert.token.name),
        escape_markdown(&alert.token.symbol),
        alert.token.id,
        format_usd(alert.fiat_market_cap)
    )
}

/// Token names are free text; an unescaped `_` or `*` makes Telegram reject
/// the whole message.
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `6000.0` -> `6,000.00`
pub fn format_usd(amount: f64) -> String {
    let cents = (amount.max(0.0) * 100.0).round() as u64;
    format!(
        "{}.{:02}",
        (cents / 100).to_formatted_string(&Locale::en),
        cents % 100
    )
}

/// Drains alerts from the monitor. Each alert is delivered on its own task
/// so a slow chat never holds up the next alert.
pub async fn run_dispatcher(notifier: Arc<TelegramNotifier>, mut alerts: UnboundedReceiver<Alert>) {
    while let Some(alert) = alerts.recv().await {
        let text = format_alert(&alert);
        info!(
            "\n💎 Qualified Token Found!\nName: {} ({})\nMint: {}\nMarket Cap: ${}\n{}",
            alert.token.name,
            alert.token.symbol,
            alert.token.id,
            format_usd(alert.fiat_market_cap),
            "-".repeat(60)
        );

        if !notifier.is_enabled() {
            continue;
        }

        let notifier = notifier.clone();
        tokio::spawn(async move {
            let report = notifier.notify(&text).await;
            if report.failed > 0 {
                error!(
                    "Alert for {} reached {} of {} chats",
                    alert.token.id,
                    report.delivered,
                    report.delivered + report.failed
                );
            }
        });
    }
    warn!("Alert channel closed, dispatcher stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::registry::TrackedToken;
    use crate::test_support::{closed_port, HttpStub};
    use chrono::Utc;
    use tokio::sync::mpsc::unbounded_channel;

    fn alert(fiat_market_cap: f64) -> Alert {
        Alert {
            token: TrackedToken {
                id: "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU".to_string(),
                name: "Moon Cat".to_string(),
                symbol: "MCAT".to_string(),
                uri: None,
                market_cap_sol: 40.0,
                created_at: Utc::now(),
            },
            fiat_market_cap,
        }
    }

    fn chats(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn formats_usd_amounts() {
        assert_eq!(format_usd(6000.0), "6,000.00");
        assert_eq!(format_usd(1234567.891), "1,234,567.89");
        assert_eq!(format_usd(99.999), "100.00");
        assert_eq!(format_usd(0.0), "0.00");
    }

    #[test]
    fn formats_alert_message() {
        assert_eq!(
            format_alert(&alert(6000.0)),
            "💎 *Qualified Token Found!*\n*Name:* Moon Cat (MCAT)\n\
             *Mint:* `7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU`\n*Market Cap:* $6,000.00"
        );
    }

    #[test]
    fn escapes_markdown_in_token_names() {
        let mut alert = alert(6000.0);
        alert.token.name = "doge_coin [v2]".to_string();
        alert.token.symbol = "D_C*`".to_string();

        let text = format_alert(&alert);
        assert!(text.contains("*Name:* doge\\_coin \\[v2] (D\\_C\\*\\`)"));
        assert!(!text.contains("doge_coin"));
        assert!(text.contains("*Mint:* `7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU`"));
    }

    #[tokio::test]
    async fn one_failing_chat_does_not_block_the_others() {
        let stub = HttpStub::spawn(|request| {
            if request.contains("\"chat_id\":\"bad\"") {
                (400, r#"{"ok":false,"description":"chat not found"}"#.to_string())
            } else {
                (200, r#"{"ok":true}"#.to_string())
            }
        })
        .await;
        let notifier = TelegramNotifier::new(
            stub.url(""),
            Some("123:abc".to_string()),
            chats(&["247065432", "bad", "-1002251802971"]),
        )
        .unwrap();

        let report = notifier.notify("hello").await;
        assert_eq!(report, DeliveryReport { delivered: 2, failed: 1 });

        let requests = stub.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests
            .iter()
            .all(|r| r.starts_with("POST /bot123:abc/sendMessage")));
        assert!(requests.iter().all(|r| r.contains("\"parse_mode\":\"Markdown\"")));
    }

    #[tokio::test]
    async fn unreachable_api_is_reported_not_raised() {
        let notifier = TelegramNotifier::new(
            format!("http://127.0.0.1:{}", closed_port()),
            Some("123:abc".to_string()),
            chats(&["1", "2"]),
        )
        .unwrap();

        let report = notifier.notify("hello").await;
        assert_eq!(report, DeliveryReport { delivered: 0, failed: 2 });
    }

    #[tokio::test]
    async fn disabled_without_credentials() {
        let notifier = TelegramNotifier::new("http://127.0.0.1:1", None, chats(&["1"])).unwrap();
        assert!(!notifier.is_enabled());
        assert_eq!(notifier.notify("hello").await, DeliveryReport::default());

        let notifier =
            TelegramNotifier::new("http://127.0.0.1:1", Some("t".to_string()), Vec::new()).unwrap();
        assert!(!notifier.is_enabled());
    }

    #[tokio::test]
    async fn dispatcher_posts_each_alert() {
        let stub = HttpStub::spawn(|_| (200, r#"{"ok":true}"#.to_string())).await;
        let notifier = Arc::new(
            TelegramNotifier::new(stub.url("/"), Some("123:abc".to_string()), chats(&["42"]))
                .unwrap(),
        );
        let (tx, rx) = unbounded_channel();
        tx.send(alert(6000.0)).unwrap();
        drop(tx);

        run_dispatcher(notifier, rx).await;

        for _ in 0..100 {
            if !stub.requests().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains("Qualified Token Found"));
    }
}
