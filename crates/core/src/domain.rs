use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currency a collector fleet is dedicated to (one process tree per currency).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Btc,
    Eth,
    Sol,
    Usdc,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Currency::Btc => "BTC",
            Currency::Eth => "ETH",
            Currency::Sol => "SOL",
            Currency::Usdc => "USDC",
        })
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BTC" => Ok(Currency::Btc),
            "ETH" => Ok(Currency::Eth),
            "SOL" => Ok(Currency::Sol),
            "USDC" => Ok(Currency::Usdc),
            other => Err(format!("unknown currency: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Option,
    Future,
    Perpetual,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InstrumentKind::Option => "option",
            InstrumentKind::Future => "future",
            InstrumentKind::Perpetual => "perpetual",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl FromStr for OptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call" | "C" | "c" => Ok(OptionType::Call),
            "put" | "P" | "p" => Ok(OptionType::Put),
            other => Err(format!("unknown option type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            other => Err(format!("unknown trade direction: {other}")),
        }
    }
}

/// Venue-native instrument identity and static metadata.
///
/// Lifecycle is tracked externally (`instrument_metadata` relation): this
/// struct is the in-memory/wire representation, not the DB row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub currency: Currency,
    pub kind: InstrumentKind,
    pub strike: Option<f64>,
    pub option_type: Option<OptionType>,
    pub expiry: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub open_interest: Option<f64>,
}

impl Instrument {
    pub fn new(name: impl Into<String>, currency: Currency, kind: InstrumentKind) -> Self {
        Self {
            name: name.into(),
            currency,
            kind,
            strike: None,
            option_type: None,
            expiry: None,
            is_active: true,
            open_interest: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub rho: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpliedVols {
    pub bid_iv: Option<f64>,
    pub ask_iv: Option<f64>,
    pub mark_iv: Option<f64>,
}

/// Best-of-book quote, decoded from a `ticker.*` WS frame or assembled from
/// a REST orderbook snapshot (see crates `ws-proto` and `snapshot`).
///
/// `(timestamp, instrument)` is the upsert key ; every other
/// field is optional so the COALESCE-merge upsert in `storage` can compose
/// partial rows from different sources without clobbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteTick {
    pub timestamp: DateTime<Utc>,
    pub instrument: String,
    pub best_bid_price: Option<f64>,
    pub best_bid_amount: Option<f64>,
    pub best_ask_price: Option<f64>,
    pub best_ask_amount: Option<f64>,
    pub mark_price: Option<f64>,
    pub underlying_price: Option<f64>,
    pub index_price: Option<f64>,
    pub greeks: Greeks,
    pub implied_vols: ImpliedVols,
    pub open_interest: Option<f64>,
    pub last_price: Option<f64>,
    pub funding_rate: Option<f64>,
}

impl QuoteTick {
    pub fn new(timestamp: DateTime<Utc>, instrument: impl Into<String>) -> Self {
        Self {
            timestamp,
            instrument: instrument.into(),
            best_bid_price: None,
            best_bid_amount: None,
            best_ask_price: None,
            best_ask_amount: None,
            mark_price: None,
            underlying_price: None,
            index_price: None,
            greeks: Greeks::default(),
            implied_vols: ImpliedVols::default(),
            open_interest: None,
            last_price: None,
            funding_rate: None,
        }
    }

    /// True iff every top-of-book/mark field is absent — a "truly dead"
    /// instrument, not worth writing a row for.
    pub fn is_empty_market(&self) -> bool {
        self.best_bid_price.is_none() && self.best_ask_price.is_none() && self.mark_price.is_none()
    }
}

/// `(trade_id, instrument)` is the upsert key; trades are immutable once
/// recorded (`ON CONFLICT DO NOTHING`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTick {
    pub timestamp: DateTime<Utc>,
    pub instrument: String,
    pub trade_id: String,
    pub price: f64,
    pub amount: f64,
    pub direction: Direction,
    pub iv: Option<f64>,
    pub index_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: f64,
    pub size: f64,
}

/// Append-only full-depth snapshot, always from a REST pull: no uniqueness
/// constraint beyond `(timestamp, instrument)` ordering for downstream
/// consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub instrument: String,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub mark_price: Option<f64>,
    pub underlying_price: Option<f64>,
    pub open_interest: Option<f64>,
    pub volume_24h: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    Listed,
    Expired,
    SubscribeOk,
    SubscribeFail,
    UnsubscribeOk,
    UnsubscribeFail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event_time: DateTime<Utc>,
    pub kind: LifecycleEventKind,
    pub instrument: String,
    pub currency: Currency,
    pub collector_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub details: Option<serde_json::Value>,
}
