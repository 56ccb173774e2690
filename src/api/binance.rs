use crate::models::{Candle, MarketKind};
use crate::Result;
use reqwest::Client;
use serde_json::Value;

const SPOT_API_BASE: &str = "https://api.binance.com";
const FUTURES_API_BASE: &str = "https://fapi.binance.com";
const SPOT_STREAM_BASE: &str = "wss://stream.binance.com:9443";
const FUTURES_STREAM_BASE: &str = "wss://fstream.binance.com";

/// Client for Binance market data (spot and USD-M futures)
///
/// Only public endpoints are used; no API key required.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    spot_base: String,
    futures_base: String,
}

impl BinanceClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            spot_base: SPOT_API_BASE.to_string(),
            futures_base: FUTURES_API_BASE.to_string(),
        }
    }

    /// Override both REST bases (test servers)
    pub fn with_base_url(base: &str) -> Self {
        Self {
            client: Client::new(),
            spot_base: base.to_string(),
            futures_base: base.to_string(),
        }
    }

    /// Fetch up to `limit` historical klines, ascending by open time
    ///
    /// Endpoint: GET /api/v3/klines (spot) or /fapi/v1/klines (futures).
    /// A non-array response is an error; the caller treats a failure here as
    /// fatal for instance initialization.
    pub async fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
        market: MarketKind,
    ) -> Result<Vec<Candle>> {
        let (base, path) = match market {
            MarketKind::Spot => (&self.spot_base, "/api/v3/klines"),
            MarketKind::Futures => (&self.futures_base, "/fapi/v1/klines"),
        };
        let url = format!(
            "{}{}?symbol={}&interval={}&limit={}",
            base,
            path,
            symbol.to_uppercase(),
            interval,
            limit.min(1000)
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(format!("Binance API error: {}", response.status()).into());
        }

        let body: Value = response.json().await?;
        let rows = body
            .as_array()
            .ok_or("Binance klines response is not an array")?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            candles.push(parse_kline_row(row)?);
        }
        Ok(candles)
    }

    /// Websocket URL for the kline stream of one (symbol, interval)
    pub fn stream_url(symbol: &str, interval: &str, market: MarketKind) -> String {
        let base = match market {
            MarketKind::Spot => SPOT_STREAM_BASE,
            MarketKind::Futures => FUTURES_STREAM_BASE,
        };
        format!("{}/ws/{}@kline_{}", base, symbol.to_lowercase(), interval)
    }
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

/// One kline row is a positional array mixing numbers and decimal strings:
/// [openTime, open, high, low, close, volume, closeTime, ...]
fn parse_kline_row(row: &Value) -> Result<Candle> {
    let fields = row.as_array().ok_or("kline row is not an array")?;
    if fields.len() < 7 {
        return Err(format!("kline row too short: {} fields", fields.len()).into());
    }

    Ok(Candle {
        open_time: fields[0]
            .as_i64()
            .ok_or("kline open time is not an integer")?,
        open: parse_price(&fields[1])?,
        high: parse_price(&fields[2])?,
        low: parse_price(&fields[3])?,
        close: parse_price(&fields[4])?,
        volume: parse_price(&fields[5])?,
        close_time: fields[6]
            .as_i64()
            .ok_or("kline close time is not an integer")?,
    })
}

fn parse_price(value: &Value) -> Result<f64> {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
        .ok_or_else(|| format!("unparseable numeric field: {}", value).into())
}
