// Signal engine boundary
pub mod reference;

use crate::config::TraderConfig;
use crate::models::{Candle, Signal};
use crate::Result;
use serde::{Deserialize, Serialize};

pub use reference::ReferenceEngine;

/// Snapshot of the algorithm's state after one processed candle
///
/// The engine owns this bag and replaces it wholesale every cycle; the
/// lifecycle tracker only ever reads the well-known fields below and keeps
/// the previous snapshot for exactly one diff cycle. Engine-private fields
/// ride along in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmState {
    pub in_long_trade: bool,
    pub in_short_trade: bool,
    pub long_entry_price: f64,
    pub short_entry_price: f64,
    pub long_stop_reference: f64,
    pub short_stop_reference: f64,
    pub long_target_level: f64,
    pub short_target_level: f64,
    pub risk_amount: f64,
    pub current_capital: f64,
    pub total_profit_loss: f64,
    pub total_profit: f64,
    pub total_loss: f64,
    pub long_wins: u32,
    pub short_wins: u32,
    pub long_target_hits: u32,
    pub short_target_hits: u32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Aggregate performance counters reported with every evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub current_capital: f64,
    pub total_profit_loss: f64,
    pub total_profit: f64,
    pub total_loss: f64,
    pub long_wins: u32,
    pub short_wins: u32,
    pub long_target_hits: u32,
    pub short_target_hits: u32,
}

impl EngineStats {
    pub fn from_state(state: &AlgorithmState) -> Self {
        Self {
            current_capital: state.current_capital,
            total_profit_loss: state.total_profit_loss,
            total_profit: state.total_profit,
            total_loss: state.total_loss,
            long_wins: state.long_wins,
            short_wins: state.short_wins,
            long_target_hits: state.long_target_hits,
            short_target_hits: state.short_target_hits,
        }
    }
}

/// Named indicator values computed during an evaluation
pub type IndicatorSnapshot = serde_json::Map<String, serde_json::Value>;

/// Result of one engine evaluation
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub state: AlgorithmState,
    pub signal: Option<Signal>,
    pub stats: EngineStats,
    pub indicators: IndicatorSnapshot,
}

/// Contract for the external signal-generating algorithm
///
/// Called once per accepted completed candle with the frozen window, the
/// prior state snapshot (absent on the very first call) and the immutable
/// trader config. The call is synchronous and side-effect-free from this
/// system's perspective. Errors are non-fatal to the caller: the candle is
/// skipped and the prior state retained, since retrying against the same
/// frozen window would be futile until the next candle arrives.
pub trait SignalEngine: Send {
    fn evaluate(
        &self,
        window: &[Candle],
        prior: Option<&AlgorithmState>,
        config: &TraderConfig,
    ) -> Result<Evaluation>;

    fn name(&self) -> &str;
}
