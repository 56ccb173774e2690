use super::{AlgorithmState, EngineStats, Evaluation, SignalEngine};
use crate::config::TraderConfig;
use crate::models::{Candle, Side, Signal};
use crate::Result;

/// Built-in moving-average crossover swing engine
///
/// A deterministic reference implementation of the `SignalEngine` contract:
/// a fast/slow close-average crossover opens positions, stops sit at the
/// recent swing extreme and trail candle by candle, targets are placed at
/// `entry +/- reward_multiple * stop distance`. It exists so the binary
/// produces real lifecycle traffic without an external engine plugged in.
#[derive(Debug, Default)]
pub struct ReferenceEngine;

impl ReferenceEngine {
    pub fn new() -> Self {
        Self
    }

    fn sma(closes: &[f64], period: usize) -> Option<f64> {
        if period == 0 || closes.len() < period {
            return None;
        }
        Some(closes[closes.len() - period..].iter().sum::<f64>() / period as f64)
    }

    fn swing_low(window: &[Candle], lookback: usize) -> f64 {
        window[window.len().saturating_sub(lookback)..]
            .iter()
            .map(|c| c.low)
            .fold(f64::INFINITY, f64::min)
    }

    fn swing_high(window: &[Candle], lookback: usize) -> f64 {
        window[window.len().saturating_sub(lookback)..]
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

impl SignalEngine for ReferenceEngine {
    fn evaluate(
        &self,
        window: &[Candle],
        prior: Option<&AlgorithmState>,
        config: &TraderConfig,
    ) -> Result<Evaluation> {
        let params = &config.algorithm;
        let needed = params.slow_period + 1;
        if window.len() < needed {
            return Err(format!(
                "insufficient data: {} candles, need {}",
                window.len(),
                needed
            )
            .into());
        }

        let mut state = prior.cloned().unwrap_or_else(|| AlgorithmState {
            current_capital: config.initial_capital,
            ..AlgorithmState::default()
        });

        let candle = window
            .last()
            .ok_or("evaluate called with an empty window")?;
        let closes: Vec<f64> = window.iter().map(|c| c.close).collect();
        let prev_closes = &closes[..closes.len() - 1];

        let fast = Self::sma(&closes, params.fast_period).ok_or("fast average unavailable")?;
        let slow = Self::sma(&closes, params.slow_period).ok_or("slow average unavailable")?;
        let prev_fast =
            Self::sma(prev_closes, params.fast_period).ok_or("fast average unavailable")?;
        let prev_slow =
            Self::sma(prev_closes, params.slow_period).ok_or("slow average unavailable")?;

        let crossed_up = prev_fast <= prev_slow && fast > slow;
        let crossed_down = prev_fast >= prev_slow && fast < slow;
        let leverage = config.leverage.factor();

        // Resolve open long position first: target, then hard stop, then flip.
        if state.in_long_trade {
            if candle.high >= state.long_target_level {
                let profit = state.risk_amount * config.reward_multiple * leverage;
                state.in_long_trade = false;
                state.long_wins += 1;
                state.long_target_hits += 1;
                state.total_profit += profit;
                state.total_profit_loss += profit;
                state.current_capital += profit;
            } else if candle.low <= state.long_stop_reference {
                let loss = state.risk_amount * leverage;
                state.in_long_trade = false;
                state.total_loss += loss;
                state.total_profit_loss -= loss;
                state.current_capital -= loss;
            } else if crossed_down {
                let entry = state.long_entry_price;
                let moved = candle.close - entry;
                let pnl = if moved >= 0.0 {
                    let dist = state.long_target_level - entry;
                    let fraction = if dist > 0.0 { (moved / dist).min(1.0) } else { 0.0 };
                    fraction * state.risk_amount * config.reward_multiple * leverage
                } else {
                    let dist = entry - state.long_stop_reference;
                    let fraction = if dist > 0.0 { (-moved / dist).min(1.0) } else { 0.0 };
                    -fraction * state.risk_amount * leverage
                };
                state.in_long_trade = false;
                if pnl >= 0.0 {
                    state.long_wins += 1;
                    state.total_profit += pnl;
                } else {
                    state.total_loss += -pnl;
                }
                state.total_profit_loss += pnl;
                state.current_capital += pnl;
            } else {
                // Trail the stop up behind the swing low; never loosen it.
                let trailed = Self::swing_low(window, params.swing_lookback);
                if trailed > state.long_stop_reference {
                    state.long_stop_reference = trailed;
                }
            }
        }

        if state.in_short_trade {
            if candle.low <= state.short_target_level {
                let profit = state.risk_amount * config.reward_multiple * leverage;
                state.in_short_trade = false;
                state.short_wins += 1;
                state.short_target_hits += 1;
                state.total_profit += profit;
                state.total_profit_loss += profit;
                state.current_capital += profit;
            } else if candle.high >= state.short_stop_reference {
                let loss = state.risk_amount * leverage;
                state.in_short_trade = false;
                state.total_loss += loss;
                state.total_profit_loss -= loss;
                state.current_capital -= loss;
            } else if crossed_up {
                let entry = state.short_entry_price;
                let moved = entry - candle.close;
                let pnl = if moved >= 0.0 {
                    let dist = entry - state.short_target_level;
                    let fraction = if dist > 0.0 { (moved / dist).min(1.0) } else { 0.0 };
                    fraction * state.risk_amount * config.reward_multiple * leverage
                } else {
                    let dist = state.short_stop_reference - entry;
                    let fraction = if dist > 0.0 { (-moved / dist).min(1.0) } else { 0.0 };
                    -fraction * state.risk_amount * leverage
                };
                state.in_short_trade = false;
                if pnl >= 0.0 {
                    state.short_wins += 1;
                    state.total_profit += pnl;
                } else {
                    state.total_loss += -pnl;
                }
                state.total_profit_loss += pnl;
                state.current_capital += pnl;
            } else {
                let trailed = Self::swing_high(window, params.swing_lookback);
                if trailed < state.short_stop_reference {
                    state.short_stop_reference = trailed;
                }
            }
        }

        // Entries after exits so a flip closes the old side this candle and
        // opens the new one in the same evaluation.
        let mut signal = None;
        if crossed_up && !state.in_long_trade {
            let entry = candle.close;
            let stop = Self::swing_low(window, params.swing_lookback);
            if stop < entry {
                let target = entry + (entry - stop) * config.reward_multiple;
                state.in_long_trade = true;
                state.long_entry_price = entry;
                state.long_stop_reference = stop;
                state.long_target_level = target;
                state.risk_amount = state.current_capital * config.risk_per_trade_pct / 100.0;
                signal = Some(Signal {
                    side: Side::Long,
                    price: entry,
                    stop_level: stop,
                    target_level: target,
                });
            }
        } else if crossed_down && !state.in_short_trade {
            let entry = candle.close;
            let stop = Self::swing_high(window, params.swing_lookback);
            if stop > entry {
                let target = entry - (stop - entry) * config.reward_multiple;
                state.in_short_trade = true;
                state.short_entry_price = entry;
                state.short_stop_reference = stop;
                state.short_target_level = target;
                state.risk_amount = state.current_capital * config.risk_per_trade_pct / 100.0;
                signal = Some(Signal {
                    side: Side::Short,
                    price: entry,
                    stop_level: stop,
                    target_level: target,
                });
            }
        }

        let mut indicators = serde_json::Map::new();
        indicators.insert("fast_ma".into(), serde_json::json!(fast));
        indicators.insert("slow_ma".into(), serde_json::json!(slow));
        indicators.insert(
            "swing_low".into(),
            serde_json::json!(Self::swing_low(window, params.swing_lookback)),
        );
        indicators.insert(
            "swing_high".into(),
            serde_json::json!(Self::swing_high(window, params.swing_lookback)),
        );

        let stats = EngineStats::from_state(&state);
        Ok(Evaluation {
            state,
            signal,
            stats,
            indicators,
        })
    }

    fn name(&self) -> &str {
        "ReferenceEngine"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TraderConfig {
        serde_json::from_value(serde_json::json!({
            "symbol": "BTCUSDT",
            "interval": "1h",
            "market": "spot",
            "algorithm": { "fast_period": 3, "slow_period": 5, "swing_lookback": 5 },
            "risk_per_trade_pct": 1.0,
            "reward_multiple": 1.5,
            "initial_capital": 10000.0
        }))
        .unwrap()
    }

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: i as i64 * 3_600_000,
                close_time: (i as i64 + 1) * 3_600_000 - 1,
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_rejects_short_window() {
        let engine = ReferenceEngine::new();
        let config = test_config();
        let window = candles_from_closes(&[100.0, 101.0]);

        let result = engine.evaluate(&window, None, &config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("insufficient data"));
    }

    #[test]
    fn test_cross_up_opens_long() {
        let engine = ReferenceEngine::new();
        let config = test_config();

        // Downtrend then sharp reversal: fast average crosses above slow.
        let window =
            candles_from_closes(&[110.0, 108.0, 106.0, 104.0, 102.0, 100.0, 104.0, 109.0]);
        let eval = engine.evaluate(&window, None, &config).unwrap();

        assert!(eval.state.in_long_trade);
        let signal = eval.signal.expect("expected a long signal");
        assert_eq!(signal.side, Side::Long);
        assert!(signal.stop_level < signal.price);
        assert!(signal.target_level > signal.price);
        assert!(eval.state.risk_amount > 0.0);
        assert_eq!(eval.stats.current_capital, config.initial_capital);
    }

    #[test]
    fn test_determinism() {
        let engine = ReferenceEngine::new();
        let config = test_config();
        let window =
            candles_from_closes(&[110.0, 108.0, 106.0, 104.0, 102.0, 100.0, 104.0, 109.0]);

        let a = engine.evaluate(&window, None, &config).unwrap();
        let b = engine.evaluate(&window, None, &config).unwrap();
        assert_eq!(a.state, b.state);
        assert_eq!(a.signal, b.signal);
    }

    #[test]
    fn test_target_hit_closes_long() {
        let engine = ReferenceEngine::new();
        let config = test_config();

        let mut prior = AlgorithmState {
            in_long_trade: true,
            long_entry_price: 100.0,
            long_stop_reference: 95.0,
            long_target_level: 107.5,
            risk_amount: 100.0,
            current_capital: 10_000.0,
            ..AlgorithmState::default()
        };
        prior.total_profit_loss = 0.0;

        let mut window = candles_from_closes(&[100.0, 100.0, 100.0, 100.0, 100.0, 100.0]);
        window.last_mut().unwrap().high = 108.0;

        let eval = engine.evaluate(&window, Some(&prior), &config).unwrap();
        assert!(!eval.state.in_long_trade);
        assert_eq!(eval.state.long_target_hits, 1);
        assert_eq!(eval.state.long_wins, 1);
        assert_eq!(eval.state.total_profit, 150.0); // 100 * 1.5
        assert_eq!(eval.state.current_capital, 10_150.0);
    }

    #[test]
    fn test_stop_hit_closes_long_without_signal() {
        let engine = ReferenceEngine::new();
        let config = test_config();

        let prior = AlgorithmState {
            in_long_trade: true,
            long_entry_price: 100.0,
            long_stop_reference: 98.0,
            long_target_level: 103.0,
            risk_amount: 100.0,
            current_capital: 10_000.0,
            ..AlgorithmState::default()
        };

        let mut window = candles_from_closes(&[100.0, 100.0, 100.0, 100.0, 100.0, 100.0]);
        window.last_mut().unwrap().low = 97.5;

        let eval = engine.evaluate(&window, Some(&prior), &config).unwrap();
        assert!(!eval.state.in_long_trade);
        assert!(eval.signal.is_none());
        assert_eq!(eval.state.total_loss, 100.0);
        assert_eq!(eval.state.current_capital, 9_900.0);
    }

    #[test]
    fn test_trailing_stop_never_loosens() {
        let engine = ReferenceEngine::new();
        let config = test_config();

        let prior = AlgorithmState {
            in_long_trade: true,
            long_entry_price: 100.0,
            long_stop_reference: 99.8,
            long_target_level: 110.0,
            risk_amount: 100.0,
            current_capital: 10_000.0,
            ..AlgorithmState::default()
        };

        // Lows well below the current stop reference: stop must not move down.
        let window = candles_from_closes(&[100.0, 100.5, 101.0, 101.5, 102.0, 102.5]);
        let eval = engine.evaluate(&window, Some(&prior), &config).unwrap();

        assert!(eval.state.in_long_trade);
        assert!(eval.state.long_stop_reference >= 99.8);
    }
}
