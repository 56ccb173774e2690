// Trade lifecycle tracking
pub mod tracker;

pub use tracker::TradeLifecycleTracker;
