pub mod api;
pub mod config;
pub mod engine;
pub mod models;
pub mod notify;
pub mod stream;
pub mod trade;
pub mod trader;
pub mod window;

use std::error::Error;

pub type Result<T> = std::result::Result<T, Box<dyn Error + Send + Sync>>;

pub use api::BinanceClient;
pub use config::{Settings, TraderConfig};
pub use engine::{ReferenceEngine, SignalEngine};
pub use notify::{LogNotifier, NotificationSink, TelegramNotifier};
pub use stream::{ConnectionHandle, ConnectionManager, ConnectionState};
pub use trader::TraderSupervisor;
pub use window::CandleWindow;
