use crate::config::TraderConfig;
use crate::engine::AlgorithmState;
use crate::models::{ActiveTrade, Candle, ExitReason, Side, TradeEvent, Signal};

/// Diffs successive algorithm states to derive trade lifecycle events
///
/// Given the prior and new state snapshots for one processed candle, the
/// tracker detects exits, entries and stop-reference updates, computes
/// realized and partial P&L, and maintains the per-side `ActiveTrade` slots.
/// Exit, entry and stop-update detection run independently and may all fire
/// for the same candle; events are emitted exits first, then entries, then
/// stop updates.
pub struct TradeLifecycleTracker {
    config: TraderConfig,
    long_trade: Option<ActiveTrade>,
    short_trade: Option<ActiveTrade>,
    // Instance-owned so concurrent trader instances never share a sequence.
    trade_counter: u64,
}

impl TradeLifecycleTracker {
    pub fn new(config: TraderConfig) -> Self {
        Self {
            config,
            long_trade: None,
            short_trade: None,
            trade_counter: 0,
        }
    }

    pub fn active_trade(&self, side: Side) -> Option<&ActiveTrade> {
        match side {
            Side::Long => self.long_trade.as_ref(),
            Side::Short => self.short_trade.as_ref(),
        }
    }

    /// Process one diff cycle and return the lifecycle events it produced
    pub fn observe(
        &mut self,
        prior: &AlgorithmState,
        new: &AlgorithmState,
        new_signal: Option<&Signal>,
        candle: &Candle,
    ) -> Vec<TradeEvent> {
        let mut events = Vec::new();

        // Exits first so a side that closes and reopens in the same candle
        // reports the old position's outcome before the new entry.
        if prior.in_long_trade && !new.in_long_trade {
            events.push(self.close_side(Side::Long, prior, new_signal, candle));
        }
        if prior.in_short_trade && !new.in_short_trade {
            events.push(self.close_side(Side::Short, prior, new_signal, candle));
        }

        if let Some(signal) = new_signal {
            events.push(self.open_side(signal, new, candle));
        }

        events.extend(self.stop_updates(prior, new));
        events
    }

    fn close_side(
        &mut self,
        side: Side,
        prior: &AlgorithmState,
        new_signal: Option<&Signal>,
        candle: &Candle,
    ) -> TradeEvent {
        let leverage = self.config.leverage.factor();
        let reward_multiple = self.config.reward_multiple;
        let risk = prior.risk_amount;

        let (entry, stop, target, target_hit) = match side {
            Side::Long => (
                prior.long_entry_price,
                prior.long_stop_reference,
                prior.long_target_level,
                candle.high >= prior.long_target_level,
            ),
            Side::Short => (
                prior.short_entry_price,
                prior.short_stop_reference,
                prior.short_target_level,
                candle.low <= prior.short_target_level,
            ),
        };

        let opposing = new_signal.is_some_and(|s| s.side == side.opposite());

        let (reason, profit_loss, exit_price) = if target_hit {
            (
                ExitReason::TargetHit,
                risk * reward_multiple * leverage,
                target,
            )
        } else if opposing {
            // Partial payoff proportional to how far price moved toward the
            // target (favorable) or the stop (adverse).
            let favorable = match side {
                Side::Long => candle.close - entry,
                Side::Short => entry - candle.close,
            };
            let pnl = if favorable >= 0.0 {
                let dist = (target - entry).abs();
                let fraction = if dist > 0.0 {
                    (favorable / dist).min(1.0)
                } else {
                    0.0
                };
                fraction * risk * reward_multiple * leverage
            } else {
                let dist = (entry - stop).abs();
                let fraction = if dist > 0.0 {
                    (-favorable / dist).min(1.0)
                } else {
                    0.0
                };
                -fraction * risk * leverage
            };
            (ExitReason::OpposingSignal, pnl, candle.close)
        } else {
            // Neither the target nor an opposing signal explains the close.
            (ExitReason::Unknown, 0.0, candle.close)
        };

        match side {
            Side::Long => self.long_trade = None,
            Side::Short => self.short_trade = None,
        }

        TradeEvent::Exit {
            side,
            entry_price: entry,
            exit_price,
            profit_loss,
            risked_amount: risk,
            reason,
        }
    }

    fn open_side(&mut self, signal: &Signal, new: &AlgorithmState, candle: &Candle) -> TradeEvent {
        self.trade_counter += 1;
        let trade = ActiveTrade {
            id: format!(
                "{}-{}-{}",
                self.config.symbol, candle.close_time, self.trade_counter
            ),
            entry_time: candle.close_time,
            entry_price: signal.price,
            stop_level: signal.stop_level,
            target_level: signal.target_level,
            risk_amount: new.risk_amount,
        };

        let event = TradeEvent::Entry {
            side: signal.side,
            price: trade.entry_price,
            stop_level: trade.stop_level,
            target_level: trade.target_level,
        };

        match signal.side {
            Side::Long => self.long_trade = Some(trade),
            Side::Short => self.short_trade = Some(trade),
        }
        event
    }

    fn stop_updates(&mut self, prior: &AlgorithmState, new: &AlgorithmState) -> Vec<TradeEvent> {
        let mut events = Vec::new();

        // Stop updates only apply to sides with an open tracked trade.
        if let Some(trade) = self.long_trade.as_mut() {
            if prior.long_stop_reference != new.long_stop_reference {
                events.push(TradeEvent::StopUpdate {
                    side: Side::Long,
                    previous_stop: prior.long_stop_reference,
                    new_stop: new.long_stop_reference,
                });
                trade.stop_level = new.long_stop_reference;
            }
        }
        if let Some(trade) = self.short_trade.as_mut() {
            if prior.short_stop_reference != new.short_stop_reference {
                events.push(TradeEvent::StopUpdate {
                    side: Side::Short,
                    previous_stop: prior.short_stop_reference,
                    new_stop: new.short_stop_reference,
                });
                trade.stop_level = new.short_stop_reference;
            }
        }
        events
    }
}
