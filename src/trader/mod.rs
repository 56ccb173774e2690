use crate::api::BinanceClient;
use crate::config::{ConnectionSettings, TraderConfig};
use crate::engine::{AlgorithmState, EngineStats, SignalEngine};
use crate::models::{Candle, TradeEvent};
use crate::notify::{
    ExitNotification, NotificationSink, SignalNotification, StatsNotification,
};
use crate::stream::{
    BackoffPolicy, ConnectionHandle, ConnectionManager, StreamHandler, Transport, WsTransport,
};
use crate::trade::TradeLifecycleTracker;
use crate::window::CandleWindow;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Stats are re-emitted at least this often even without trade activity
const STATS_HEARTBEAT: Duration = Duration::from_secs(24 * 60 * 60);

/// Drives one (symbol, interval, market) trader instance end to end
///
/// Owns the candle window, the engine state snapshot and the lifecycle
/// tracker exclusively; stream messages are handled one at a time in arrival
/// order, so none of this state needs locking.
pub struct TraderSupervisor {
    config: TraderConfig,
    rest: BinanceClient,
    engine: Box<dyn SignalEngine>,
    notifier: Arc<dyn NotificationSink>,
    window: CandleWindow,
    tracker: TradeLifecycleTracker,
    state: Option<AlgorithmState>,
    last_stats: EngineStats,
    last_stats_at: Instant,
}

impl TraderSupervisor {
    pub fn new(
        config: TraderConfig,
        rest: BinanceClient,
        engine: Box<dyn SignalEngine>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let window = CandleWindow::new(config.window_capacity);
        let tracker = TradeLifecycleTracker::new(config.clone());
        Self {
            config,
            rest,
            engine,
            notifier,
            window,
            tracker,
            state: None,
            last_stats: EngineStats::default(),
            last_stats_at: Instant::now(),
        }
    }

    /// Fetch the snapshot, seed the window, run the first evaluation and
    /// emit the initial stats snapshot
    ///
    /// Any failure here is fatal for the instance: it never starts.
    pub async fn initialize(&mut self) -> Result<()> {
        let candles = self
            .rest
            .fetch_klines(
                &self.config.symbol,
                &self.config.interval,
                self.config.window_capacity,
                self.config.market,
            )
            .await
            .map_err(|e| format!("{}: snapshot fetch failed: {}", self.config.label(), e))?;
        crate::window::validate_snapshot(&candles)?;

        tracing::info!(
            "📥 [{}] seeded window with {} candles",
            self.config.label(),
            candles.len()
        );
        self.window.seed(candles);

        let evaluation = self
            .engine
            .evaluate(&self.window.candles(), None, &self.config)
            .map_err(|e| format!("{}: initial evaluation failed: {}", self.config.label(), e))?;

        self.last_stats = evaluation.stats.clone();
        self.state = Some(evaluation.state);
        self.emit_stats();
        self.last_stats_at = Instant::now();
        Ok(())
    }

    /// Build the websocket connection manager for this instance
    pub fn open_connection(
        &self,
        settings: &ConnectionSettings,
    ) -> (ConnectionManager<WsTransport>, ConnectionHandle) {
        let url = BinanceClient::stream_url(
            &self.config.symbol,
            &self.config.interval,
            self.config.market,
        );
        ConnectionManager::new(
            WsTransport::new(url),
            BackoffPolicy::from_settings(settings),
            Duration::from_millis(settings.connect_timeout_ms),
        )
    }

    /// Run the streaming loop to completion
    ///
    /// Returns an error when the connection terminates on its own (retries
    /// exhausted); a deliberate `stop()` resolves cleanly.
    pub async fn run_with<T: Transport>(&mut self, manager: ConnectionManager<T>) -> Result<()> {
        let label = self.config.label();
        match manager.run(self).await {
            Ok(()) => {
                tracing::info!("👋 [{}] stream stopped", label);
                Ok(())
            }
            Err(err) => Err(format!("{}: fatal stream condition: {}", label, err).into()),
        }
    }

    pub fn config(&self) -> &TraderConfig {
        &self.config
    }

    fn process_candle(&mut self, candle: Candle) {
        let outcome = self.window.append(candle.clone());
        if !outcome.accepted {
            tracing::debug!(
                "[{}] duplicate candle at {} ignored",
                self.config.label(),
                candle.open_time
            );
            return;
        }

        let evaluation = match self
            .engine
            .evaluate(&self.window.candles(), self.state.as_ref(), &self.config)
        {
            Ok(evaluation) => evaluation,
            Err(err) => {
                // Retrying against the same frozen window is futile; skip the
                // candle and keep the prior state.
                tracing::warn!(
                    "[{}] engine evaluation failed, candle skipped: {}",
                    self.config.label(),
                    err
                );
                return;
            }
        };

        let events = match &self.state {
            Some(prior) => self.tracker.observe(
                prior,
                &evaluation.state,
                evaluation.signal.as_ref(),
                &candle,
            ),
            None => Vec::new(),
        };

        self.last_stats = evaluation.stats.clone();
        self.state = Some(evaluation.state);

        for event in events {
            self.dispatch(event, &candle);
        }

        if self.last_stats_at.elapsed() >= STATS_HEARTBEAT {
            tracing::info!("💓 [{}] heartbeat stats", self.config.label());
            self.emit_stats();
            self.last_stats_at = Instant::now();
        }
    }

    fn dispatch(&self, event: TradeEvent, candle: &Candle) {
        let time = DateTime::<Utc>::from_timestamp_millis(candle.close_time)
            .unwrap_or_else(Utc::now);

        match event {
            TradeEvent::Entry {
                side,
                price,
                stop_level,
                target_level,
            } => {
                tracing::info!(
                    "🎯 [{}] {} entry @ {:.4}",
                    self.config.label(),
                    side.as_str(),
                    price
                );
                let payload = SignalNotification {
                    symbol: self.config.symbol.clone(),
                    interval: self.config.interval.clone(),
                    market: self.config.market,
                    side,
                    price,
                    stop_level,
                    target_level,
                    time,
                };
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    if let Err(err) = notifier.send_signal(&payload).await {
                        tracing::warn!("signal notification failed: {}", err);
                    }
                });
            }
            TradeEvent::Exit {
                side,
                entry_price,
                exit_price,
                profit_loss,
                risked_amount,
                reason,
            } => {
                tracing::info!(
                    "🏁 [{}] {} exit, P&L ${:.2} ({})",
                    self.config.label(),
                    side.as_str(),
                    profit_loss,
                    reason.as_str()
                );
                let payload = ExitNotification {
                    symbol: self.config.symbol.clone(),
                    interval: self.config.interval.clone(),
                    market: self.config.market,
                    side,
                    entry_price,
                    exit_price,
                    profit_loss,
                    risked_amount,
                    reason: reason.as_str().to_string(),
                    time,
                };
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    if let Err(err) = notifier.send_exit(&payload).await {
                        tracing::warn!("exit notification failed: {}", err);
                    }
                });
            }
            TradeEvent::StopUpdate {
                side,
                previous_stop,
                new_stop,
            } => {
                // Stop trailing is log-only; the sink carries signal/exit/stats.
                tracing::info!(
                    "🔒 [{}] {} stop {:.4} → {:.4}",
                    self.config.label(),
                    side.as_str(),
                    previous_stop,
                    new_stop
                );
            }
        }
    }

    fn emit_stats(&self) {
        let stats = &self.last_stats;
        let payload = StatsNotification {
            symbol: self.config.symbol.clone(),
            interval: self.config.interval.clone(),
            market: self.config.market,
            current_capital: stats.current_capital,
            total_profit_loss: stats.total_profit_loss,
            total_profit: stats.total_profit,
            total_loss: stats.total_loss,
            long_wins: stats.long_wins,
            short_wins: stats.short_wins,
            long_target_hits: stats.long_target_hits,
            short_target_hits: stats.short_target_hits,
            time: Utc::now(),
        };
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.send_stats(&payload).await {
                tracing::warn!("stats notification failed: {}", err);
            }
        });
    }
}

#[async_trait]
impl StreamHandler for TraderSupervisor {
    /// Re-fetch a fresh snapshot and reseed the window before the stream
    /// reopens, so it never serves stale data across a connection gap
    async fn resync(&mut self) -> Result<()> {
        let candles = self
            .rest
            .fetch_klines(
                &self.config.symbol,
                &self.config.interval,
                self.config.window_capacity,
                self.config.market,
            )
            .await?;
        crate::window::validate_snapshot(&candles)?;
        tracing::info!(
            "🔄 [{}] resynced window with {} candles",
            self.config.label(),
            candles.len()
        );
        self.window.seed(candles);
        Ok(())
    }

    async fn on_message(&mut self, raw: &str) {
        let event: KlineEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(_) => {
                if serde_json::from_str::<serde_json::Value>(raw).is_ok() {
                    // Valid JSON without a kline payload: subscription acks,
                    // other stream kinds. Not our concern.
                    tracing::debug!("[{}] non-candle message ignored", self.config.label());
                } else {
                    tracing::warn!("[{}] malformed message dropped", self.config.label());
                }
                return;
            }
        };

        // Only completed candles advance the pipeline.
        if !event.kline.is_closed {
            return;
        }

        match event.kline.into_candle() {
            Ok(candle) => self.process_candle(candle),
            Err(err) => {
                tracing::warn!(
                    "[{}] unparseable kline dropped: {}",
                    self.config.label(),
                    err
                );
            }
        }
    }
}

/// Kline stream event; short field names follow the exchange schema
#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "k")]
    kline: KlineTick,
}

#[derive(Debug, Deserialize)]
struct KlineTick {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

impl KlineTick {
    fn into_candle(self) -> Result<Candle> {
        Ok(Candle {
            open_time: self.open_time,
            close_time: self.close_time,
            open: self.open.parse()?,
            high: self.high.parse()?,
            low: self.low.parse()?,
            close: self.close.parse()?,
            volume: self.volume.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Evaluation;
    use crate::models::{Side, Signal};
    use crate::notify::NotifyError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn test_config() -> TraderConfig {
        serde_json::from_value(serde_json::json!({
            "symbol": "BTCUSDT",
            "interval": "1h",
            "window_capacity": 50
        }))
        .unwrap()
    }

    /// Engine that counts calls and replays scripted evaluations
    struct ScriptedEngine {
        calls: Arc<AtomicU32>,
        script: Mutex<std::collections::VecDeque<crate::Result<Evaluation>>>,
    }

    impl ScriptedEngine {
        fn new(script: Vec<crate::Result<Evaluation>>) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    calls: calls.clone(),
                    script: Mutex::new(script.into()),
                },
                calls,
            )
        }
    }

    impl SignalEngine for ScriptedEngine {
        fn evaluate(
            &self,
            _window: &[Candle],
            prior: Option<&AlgorithmState>,
            _config: &TraderConfig,
        ) -> crate::Result<Evaluation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
                let state = prior.cloned().unwrap_or_default();
                let stats = EngineStats::from_state(&state);
                Ok(Evaluation {
                    state,
                    signal: None,
                    stats,
                    indicators: serde_json::Map::new(),
                })
            })
        }

        fn name(&self) -> &str {
            "ScriptedEngine"
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        entries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send_signal(&self, n: &SignalNotification) -> std::result::Result<(), NotifyError> {
            self.entries
                .lock()
                .unwrap()
                .push(format!("signal:{}", n.side.as_str()));
            Ok(())
        }

        async fn send_exit(&self, n: &ExitNotification) -> std::result::Result<(), NotifyError> {
            self.entries
                .lock()
                .unwrap()
                .push(format!("exit:{}:{}", n.side.as_str(), n.reason));
            Ok(())
        }

        async fn send_stats(&self, _n: &StatsNotification) -> std::result::Result<(), NotifyError> {
            self.entries.lock().unwrap().push("stats".to_string());
            Ok(())
        }
    }

    fn evaluation(state: AlgorithmState, signal: Option<Signal>) -> crate::Result<Evaluation> {
        let stats = EngineStats::from_state(&state);
        Ok(Evaluation {
            state,
            signal,
            stats,
            indicators: serde_json::Map::new(),
        })
    }

    fn supervisor(
        script: Vec<crate::Result<Evaluation>>,
    ) -> (TraderSupervisor, Arc<AtomicU32>, Arc<RecordingSink>) {
        let (engine, calls) = ScriptedEngine::new(script);
        let sink = Arc::new(RecordingSink::default());
        let mut trader = TraderSupervisor::new(
            test_config(),
            BinanceClient::new(),
            Box::new(engine),
            sink.clone(),
        );
        trader.state = Some(AlgorithmState::default());
        (trader, calls, sink)
    }

    fn kline_message(open_time: i64, close: f64, is_closed: bool) -> String {
        serde_json::json!({
            "e": "kline",
            "E": open_time + 100,
            "s": "BTCUSDT",
            "k": {
                "t": open_time,
                "T": open_time + 3_599_999,
                "o": format!("{}", close),
                "h": format!("{}", close + 1.0),
                "l": format!("{}", close - 1.0),
                "c": format!("{}", close),
                "v": "100.0",
                "x": is_closed
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_open_candles_are_ignored() {
        let (mut trader, calls, _) = supervisor(vec![]);

        trader
            .on_message(&kline_message(3_600_000, 100.0, false))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(trader.window.len(), 0);
    }

    #[tokio::test]
    async fn test_closed_candle_runs_pipeline() {
        let (mut trader, calls, _) = supervisor(vec![]);

        trader
            .on_message(&kline_message(3_600_000, 100.0, true))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(trader.window.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_message_dropped_without_state_change() {
        let (mut trader, calls, _) = supervisor(vec![]);

        trader.on_message("{not json").await;
        trader.on_message(r#"{"result":null,"id":1}"#).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(trader.window.len(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_candle_skips_engine() {
        let (mut trader, calls, _) = supervisor(vec![]);

        trader
            .on_message(&kline_message(3_600_000, 100.0, true))
            .await;
        trader
            .on_message(&kline_message(3_600_000, 101.0, true))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(trader.window.len(), 1);
    }

    #[tokio::test]
    async fn test_engine_failure_retains_prior_state() {
        let mut failing_state = AlgorithmState::default();
        failing_state.current_capital = 5_000.0;

        let (mut trader, calls, _) = supervisor(vec![Err("engine exploded".into())]);
        trader.state = Some(failing_state.clone());

        trader
            .on_message(&kline_message(3_600_000, 100.0, true))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Prior state untouched by the failed evaluation.
        assert_eq!(trader.state, Some(failing_state));
    }

    #[tokio::test]
    async fn test_entry_event_notifies_signal() {
        let mut state = AlgorithmState::default();
        state.in_long_trade = true;
        state.long_entry_price = 100.0;
        state.risk_amount = 10.0;

        let signal = Signal {
            side: Side::Long,
            price: 100.0,
            stop_level: 95.0,
            target_level: 105.0,
        };

        let (mut trader, _, sink) = supervisor(vec![evaluation(state, Some(signal))]);

        trader
            .on_message(&kline_message(3_600_000, 100.0, true))
            .await;
        tokio::task::yield_now().await;

        let entries = sink.entries.lock().unwrap().clone();
        assert_eq!(entries, vec!["signal:long"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_stats_after_24h() {
        let (mut trader, _, sink) = supervisor(vec![]);

        trader
            .on_message(&kline_message(3_600_000, 100.0, true))
            .await;
        tokio::task::yield_now().await;
        assert!(sink.entries.lock().unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(25 * 60 * 60)).await;

        trader
            .on_message(&kline_message(7_200_000, 101.0, true))
            .await;
        tokio::task::yield_now().await;

        let entries = sink.entries.lock().unwrap().clone();
        assert_eq!(entries, vec!["stats"]);
    }

    #[test]
    fn test_kline_tick_parsing() {
        let raw = kline_message(1_700_000_000_000, 37000.5, true);
        let event: KlineEvent = serde_json::from_str(&raw).unwrap();

        assert!(event.kline.is_closed);
        let candle = event.kline.into_candle().unwrap();
        assert_eq!(candle.open_time, 1_700_000_000_000);
        assert_eq!(candle.close, 37000.5);
        assert_eq!(candle.volume, 100.0);
    }
}
