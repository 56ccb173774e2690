// Exchange REST API clients
pub mod binance;

pub use binance::BinanceClient;
