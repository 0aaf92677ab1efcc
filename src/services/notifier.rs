use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::json;

use crate::models::{TradeClosed, TradeOpened};

/// Minimum gap between error alerts sharing a key. A persistent
/// condition like an empty wallet would otherwise fire on every event.
const ERROR_THROTTLE: Duration = Duration::from_secs(3_600);

/// Telegram notification sink. Failures are logged but never block the
/// trading flow. Built without credentials it degrades to log-only.
#[derive(Debug)]
pub struct Notifier {
    http: reqwest::Client,
    credentials: Option<(String, String)>,
    error_sent: Mutex<HashMap<String, Instant>>,
}

impl Notifier {
    pub fn new(bot_token: Option<String>, chat_id: Option<String>) -> Self {
        let credentials = match (bot_token, chat_id) {
            (Some(token), Some(chat)) => Some((token, chat)),
            _ => None,
        };
        Self {
            http: reqwest::Client::new(),
            credentials,
            error_sent: Mutex::new(HashMap::new()),
        }
    }

    pub async fn notify_opened(&self, event: TradeOpened) {
        self.send(&format_opened(&event)).await;
    }

    pub async fn notify_closed(&self, event: TradeClosed) {
        self.send(&format_closed(&event)).await;
    }

    /// Operational alert, at most one per key per hour. Returns whether
    /// the message actually went out.
    pub async fn notify_error(&self, key: &str, message: &str) -> bool {
        {
            let mut sent = self.error_sent.lock().unwrap();
            if let Some(last) = sent.get(key) {
                if last.elapsed() < ERROR_THROTTLE {
                    tracing::debug!(key, "error alert throttled");
                    return false;
                }
            }
            sent.insert(key.to_string(), Instant::now());
        }

        self.send(&format!("*Error*\n{message}")).await;
        true
    }

    async fn send(&self, message: &str) {
        let Some((token, chat_id)) = &self.credentials else {
            tracing::info!(%message, "notification (no sink configured)");
            return;
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = json!({
            "chat_id": chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(resp) if !resp.status().is_success() => {
                tracing::warn!(status = %resp.status(), "Telegram sendMessage returned non-2xx");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "failed to send Telegram notification");
            }
        }
    }
}

fn short_addr(addr: &str) -> String {
    if addr.len() > 10 {
        format!("{}...{}", &addr[..6], &addr[addr.len() - 4..])
    } else {
        addr.to_string()
    }
}

fn format_opened(e: &TradeOpened) -> String {
    let who = e
        .target_name
        .clone()
        .unwrap_or_else(|| short_addr(&e.target_user));

    let mut msg = format!(
        "*Trade Opened*\nFollowing: {}\nMarket: {}\nOutcome: {}\nSpent: ${} @ {}",
        who,
        e.market_slug,
        e.outcome,
        e.amount_usd.round_dp(2),
        e.price,
    );
    if let Some(balance) = &e.new_balance {
        msg.push_str(&format!("\nBalance: {balance}"));
    }
    msg
}

fn format_closed(e: &TradeClosed) -> String {
    format!(
        "*Trade Closed ({})*\nFollowing: {}\nMarket: {}\nOutcome: {}\nEntry: {} / Exit: {}\nPnL: ${}",
        e.result_label(),
        short_addr(&e.target_user),
        e.market_slug,
        e.outcome,
        e.entry_price,
        e.exit_price,
        e.pnl.round_dp(2),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn opened_message_prefers_display_name() {
        let msg = format_opened(&TradeOpened {
            target_user: "0x1234567890abcdef".into(),
            target_name: Some("Whale One".into()),
            market_slug: "will-it-rain".into(),
            market_id: "0xcond".into(),
            outcome: "Yes".into(),
            amount_usd: "1.01".parse().unwrap(),
            price: "0.505".parse().unwrap(),
            new_balance: Some("$42.00".into()),
        });
        assert!(msg.contains("Whale One"));
        assert!(msg.contains("will-it-rain"));
        assert!(msg.contains("Balance: $42.00"));
    }

    #[test]
    fn closed_message_labels_result() {
        let msg = format_closed(&TradeClosed {
            target_user: "0x1234567890abcdef".into(),
            market_slug: "will-it-rain".into(),
            market_id: "0xcond".into(),
            outcome: "Yes".into(),
            amount_usd: Decimal::from(4),
            entry_price: "0.40".parse().unwrap(),
            exit_price: Decimal::ONE,
            pnl: "6.00".parse().unwrap(),
        });
        assert!(msg.contains("WON"));
        assert!(msg.contains("0x1234...cdef"));
    }

    #[tokio::test]
    async fn error_alerts_throttle_per_key() {
        let notifier = Notifier::new(None, None);

        assert!(notifier.notify_error("low-cash", "out of USDC").await);
        // Repeat within the hour is suppressed
        assert!(!notifier.notify_error("low-cash", "still out of USDC").await);
        // A different condition is not affected
        assert!(notifier.notify_error("rpc-down", "provider unreachable").await);
    }
}
