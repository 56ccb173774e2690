use super::{
    ExitNotification, NotificationSink, NotifyError, SignalNotification, StatsNotification,
};
use async_trait::async_trait;
use serde::Serialize;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Sends notifications through the Telegram Bot API
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessage {
    chat_id: String,
    text: String,
    parse_mode: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: TELEGRAM_API_BASE.to_string(),
            bot_token,
            chat_id,
        }
    }

    /// Point at a test server instead of the live API
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }

    async fn send(&self, text: String) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let payload = SendMessage {
            chat_id: self.chat_id.clone(),
            text,
            parse_mode: "Markdown".to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Platform(format!(
                "Telegram API error: {}",
                body
            )));
        }
        Ok(())
    }
}

fn format_signal(n: &SignalNotification) -> String {
    format!(
        "*{} {} SIGNAL* ({} {})\nEntry: {:.4}\nStop: {:.4}\nTarget: {:.4}\n{}",
        n.symbol,
        n.side.as_str().to_uppercase(),
        n.interval,
        n.market.as_str(),
        n.price,
        n.stop_level,
        n.target_level,
        n.time.format("%Y-%m-%d %H:%M UTC")
    )
}

fn format_exit(n: &ExitNotification) -> String {
    let outcome = if n.profit_loss >= 0.0 { "✅" } else { "❌" };
    format!(
        "*{} {} EXIT* ({} {}) {}\nReason: {}\nEntry: {:.4} → Exit: {:.4}\nP&L: ${:.2} (risked ${:.2})\n{}",
        n.symbol,
        n.side.as_str().to_uppercase(),
        n.interval,
        n.market.as_str(),
        outcome,
        n.reason,
        n.entry_price,
        n.exit_price,
        n.profit_loss,
        n.risked_amount,
        n.time.format("%Y-%m-%d %H:%M UTC")
    )
}

fn format_stats(n: &StatsNotification) -> String {
    format!(
        "*{} STATS* ({} {})\nCapital: ${:.2}\nTotal P&L: ${:.2} (+${:.2} / -${:.2})\nWins: {} long, {} short\nTarget hits: {} long, {} short\n{}",
        n.symbol,
        n.interval,
        n.market.as_str(),
        n.current_capital,
        n.total_profit_loss,
        n.total_profit,
        n.total_loss,
        n.long_wins,
        n.short_wins,
        n.long_target_hits,
        n.short_target_hits,
        n.time.format("%Y-%m-%d %H:%M UTC")
    )
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn send_signal(&self, n: &SignalNotification) -> Result<(), NotifyError> {
        self.send(format_signal(n)).await
    }

    async fn send_exit(&self, n: &ExitNotification) -> Result<(), NotifyError> {
        self.send(format_exit(n)).await
    }

    async fn send_stats(&self, n: &StatsNotification) -> Result<(), NotifyError> {
        self.send(format_stats(n)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MarketKind, Side};
    use chrono::TimeZone;

    fn exit_notification() -> ExitNotification {
        ExitNotification {
            symbol: "BTCUSDT".into(),
            interval: "1h".into(),
            market: MarketKind::Futures,
            side: Side::Long,
            entry_price: 100.0,
            exit_price: 105.0,
            profit_loss: 15.0,
            risked_amount: 10.0,
            reason: "Target Hit".into(),
            time: chrono::Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_exit_formatting() {
        let text = format_exit(&exit_notification());
        assert!(text.contains("BTCUSDT LONG EXIT"));
        assert!(text.contains("Target Hit"));
        assert!(text.contains("$15.00"));
        assert!(text.contains("2024-01-15 12:00 UTC"));
    }

    #[test]
    fn test_exit_formatting_marks_losses() {
        let mut n = exit_notification();
        n.profit_loss = -4.0;
        assert!(format_exit(&n).contains("❌"));
    }

    #[test]
    fn test_signal_formatting() {
        let n = SignalNotification {
            symbol: "ETHUSDT".into(),
            interval: "4h".into(),
            market: MarketKind::Spot,
            side: Side::Short,
            price: 2000.0,
            stop_level: 2100.0,
            target_level: 1850.0,
            time: chrono::Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        };
        let text = format_signal(&n);
        assert!(text.contains("ETHUSDT SHORT SIGNAL"));
        assert!(text.contains("Stop: 2100.0000"));
    }

    #[tokio::test]
    async fn test_send_posts_to_bot_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bottoken123/sendMessage")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new("token123".into(), "42".into())
            .with_api_base(&server.url());
        notifier.send_exit(&exit_notification()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_surfaces_platform_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bottoken123/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"description":"Bad Request"}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new("token123".into(), "42".into())
            .with_api_base(&server.url());
        let result = notifier.send_exit(&exit_notification()).await;

        assert!(matches!(result, Err(NotifyError::Platform(_))));
    }
}
