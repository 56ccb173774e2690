use serde::{Deserialize, Serialize};

/// One OHLCV bar for a fixed time interval
///
/// `open_time` (epoch millis) is the unique key; within a window open times
/// are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Which market a trader instance operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    Spot,
    Futures,
}

impl MarketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::Spot => "spot",
            MarketKind::Futures => "futures",
        }
    }
}

/// Side of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

/// Algorithm-declared intent to open a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub side: Side,
    pub price: f64,
    pub stop_level: f64,
    pub target_level: f64,
}

/// An open position as tracked by this system
///
/// Created on entry, stop refreshed on trailing updates, discarded on exit.
/// At most one per side at any time.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTrade {
    pub id: String,
    pub entry_time: i64,
    pub entry_price: f64,
    pub stop_level: f64,
    pub target_level: f64,
    pub risk_amount: f64,
}

/// Why a position closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TargetHit,
    OpposingSignal,
    /// The engine closed the position without hitting the target or flipping
    /// sides. Kept as an explicit branch; P&L is attributed as zero.
    Unknown,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TargetHit => "Target Hit",
            ExitReason::OpposingSignal => "Opposing Signal",
            ExitReason::Unknown => "Unknown",
        }
    }
}

/// Lifecycle event derived from diffing successive algorithm states
///
/// Emission order for one candle: exits, then entries, then stop updates,
/// so a side that closes and reopens in the same candle reports the old
/// position's outcome first.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeEvent {
    Exit {
        side: Side,
        entry_price: f64,
        exit_price: f64,
        profit_loss: f64,
        risked_amount: f64,
        reason: ExitReason,
    },
    Entry {
        side: Side,
        price: f64,
        stop_level: f64,
        target_level: f64,
    },
    StopUpdate {
        side: Side,
        previous_stop: f64,
        new_stop: f64,
    },
}
