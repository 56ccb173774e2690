// Notification boundary: fire-and-forget delivery of signal/exit/stats
pub mod telegram;

use crate::models::{MarketKind, Side};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub use telegram::TelegramNotifier;

/// Delivery failures; logged by the caller and never retried
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(String),
    #[error("platform error: {0}")]
    Platform(String),
}

/// New-entry announcement
#[derive(Debug, Clone, Serialize)]
pub struct SignalNotification {
    pub symbol: String,
    pub interval: String,
    pub market: MarketKind,
    pub side: Side,
    pub price: f64,
    pub stop_level: f64,
    pub target_level: f64,
    pub time: DateTime<Utc>,
}

/// Closed-position announcement with realized or partial P&L
#[derive(Debug, Clone, Serialize)]
pub struct ExitNotification {
    pub symbol: String,
    pub interval: String,
    pub market: MarketKind,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub profit_loss: f64,
    pub risked_amount: f64,
    pub reason: String,
    pub time: DateTime<Utc>,
}

/// Periodic performance snapshot (initial, then at least every 24h)
#[derive(Debug, Clone, Serialize)]
pub struct StatsNotification {
    pub symbol: String,
    pub interval: String,
    pub market: MarketKind,
    pub current_capital: f64,
    pub total_profit_loss: f64,
    pub total_profit: f64,
    pub total_loss: f64,
    pub long_wins: u32,
    pub short_wins: u32,
    pub long_target_hits: u32,
    pub short_target_hits: u32,
    pub time: DateTime<Utc>,
}

/// Where lifecycle notifications go
///
/// Delivery is fire-and-forget: failures are logged by the caller, never
/// retried, and never block candle processing.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_signal(&self, notification: &SignalNotification) -> Result<(), NotifyError>;
    async fn send_exit(&self, notification: &ExitNotification) -> Result<(), NotifyError>;
    async fn send_stats(&self, notification: &StatsNotification) -> Result<(), NotifyError>;
}

/// Sink that only writes to the log; the default when Telegram is not
/// configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send_signal(&self, n: &SignalNotification) -> Result<(), NotifyError> {
        tracing::info!(
            "📣 [{}/{}] {} signal @ {:.4} (stop {:.4}, target {:.4})",
            n.symbol,
            n.interval,
            n.side.as_str(),
            n.price,
            n.stop_level,
            n.target_level
        );
        Ok(())
    }

    async fn send_exit(&self, n: &ExitNotification) -> Result<(), NotifyError> {
        tracing::info!(
            "🏁 [{}/{}] {} exit @ {:.4} ({}), P&L ${:.2} on ${:.2} risked",
            n.symbol,
            n.interval,
            n.side.as_str(),
            n.exit_price,
            n.reason,
            n.profit_loss,
            n.risked_amount
        );
        Ok(())
    }

    async fn send_stats(&self, n: &StatsNotification) -> Result<(), NotifyError> {
        tracing::info!(
            "📊 [{}/{}] capital ${:.2}, P&L ${:.2} (wins L{}/S{}, target hits L{}/S{})",
            n.symbol,
            n.interval,
            n.current_capital,
            n.total_profit_loss,
            n.long_wins,
            n.short_wins,
            n.long_target_hits,
            n.short_target_hits
        );
        Ok(())
    }
}
