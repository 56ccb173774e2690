use crate::models::MarketKind;
use crate::Result;
use serde::Deserialize;

/// Parameters handed through to the signal engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlgorithmParams {
    /// Fast moving-average period (closes)
    pub fast_period: usize,
    /// Slow moving-average period (closes)
    pub slow_period: usize,
    /// Lookback used for swing high/low stop placement
    pub swing_lookback: usize,
}

impl Default for AlgorithmParams {
    fn default() -> Self {
        Self {
            fast_period: 9,
            slow_period: 21,
            swing_lookback: 10,
        }
    }
}

/// Leverage settings for one trader
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeverageConfig {
    pub enabled: bool,
    pub amount: f64,
}

impl Default for LeverageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 1.0,
        }
    }
}

impl LeverageConfig {
    /// Multiplier applied to P&L amounts: 1.0 when leverage is disabled
    pub fn factor(&self) -> f64 {
        if self.enabled {
            self.amount
        } else {
            1.0
        }
    }
}

/// Immutable per-trader settings
///
/// Created once at trader construction and never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct TraderConfig {
    pub symbol: String,
    pub interval: String,
    #[serde(default = "default_market")]
    pub market: MarketKind,
    #[serde(default)]
    pub algorithm: AlgorithmParams,
    #[serde(default = "default_risk_per_trade_pct")]
    pub risk_per_trade_pct: f64,
    #[serde(default = "default_reward_multiple")]
    pub reward_multiple: f64,
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    #[serde(default)]
    pub leverage: LeverageConfig,
    /// Candle window capacity; also the snapshot fetch limit (max 1000)
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
}

fn default_market() -> MarketKind {
    MarketKind::Spot
}

fn default_risk_per_trade_pct() -> f64 {
    1.0
}

fn default_reward_multiple() -> f64 {
    1.5
}

fn default_initial_capital() -> f64 {
    10_000.0
}

fn default_window_capacity() -> usize {
    1000
}

impl TraderConfig {
    /// Human-readable instance label used in logs and notifications
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.symbol, self.interval, self.market.as_str())
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err("trader symbol must not be empty".into());
        }
        if self.interval.is_empty() {
            return Err("trader interval must not be empty".into());
        }
        if self.window_capacity == 0 || self.window_capacity > 1000 {
            return Err(format!(
                "{}: window_capacity must be in 1..=1000, got {}",
                self.label(),
                self.window_capacity
            )
            .into());
        }
        if self.risk_per_trade_pct <= 0.0 {
            return Err(format!("{}: risk_per_trade_pct must be positive", self.label()).into());
        }
        if self.reward_multiple <= 0.0 {
            return Err(format!("{}: reward_multiple must be positive", self.label()).into());
        }
        if self.leverage.enabled && self.leverage.amount < 1.0 {
            return Err(format!("{}: leverage amount must be >= 1.0", self.label()).into());
        }
        Ok(())
    }
}

/// Reconnect behaviour for the streaming connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 10,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Telegram delivery settings; omitted = log-only notifications
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
}

/// Top-level process settings: an ordered list of trader instances plus
/// shared connection/notification options
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub traders: Vec<TraderConfig>,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub telegram: Option<TelegramSettings>,
}

impl Settings {
    /// Load settings from a file, with `CANDLEBOT_*` environment overrides
    /// (e.g. `CANDLEBOT_TELEGRAM__BOT_TOKEN`)
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CANDLEBOT").separator("__"))
            .build()?
            .try_deserialize::<Settings>()?;

        if settings.traders.is_empty() {
            return Err("settings must declare at least one trader".into());
        }
        for trader in &settings.traders {
            trader.validate()?;
        }
        Ok(settings)
    }
}
