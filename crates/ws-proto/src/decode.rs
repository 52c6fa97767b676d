//! Frame-to-domain-type decoding for `ticker.*`/`trades.*` subscription
//! payloads, and dispatch on channel name.

use chrono::{DateTime, TimeZone, Utc};
use deribit_core::{CoreError, Direction, Greeks, ImpliedVols, QuoteTick, TradeTick};
use serde::Deserialize;
use serde_json::Value;

use crate::envelope::RpcError;

/// A fully-decoded inbound frame, ready for the collector to buffer.
#[derive(Debug)]
pub enum DecodedFrame {
    Quote(QuoteTick),
    Trades(Vec<TradeTick>),
    SubscribeAck { id: u64, channels: Vec<String> },
    SubscribeError { id: u64, error: RpcError },
    Unrecognized,
}

/// Routes a `params.channel`/`params.data` pair to the right decoder.
/// `channel` always has the form `{kind}.{instrument}.{interval}`; only the
/// first segment is examined. Only `ticker.*` and `trades.*` are ever
/// subscribed to; `book.*` is unrecognized by design.
pub fn dispatch(channel: &str, data: &Value, received_at: DateTime<Utc>) -> Result<DecodedFrame, CoreError> {
    match channel.split('.').next() {
        Some("ticker") => decode_ticker_frame(data, received_at).map(DecodedFrame::Quote),
        Some("trades") => decode_trades_frame(data, received_at).map(DecodedFrame::Trades),
        _ => Ok(DecodedFrame::Unrecognized),
    }
}

#[derive(Debug, Deserialize)]
struct RawGreeks {
    #[serde(default)]
    delta: Option<f64>,
    #[serde(default)]
    gamma: Option<f64>,
    #[serde(default)]
    theta: Option<f64>,
    #[serde(default)]
    vega: Option<f64>,
    #[serde(default)]
    rho: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawTicker {
    timestamp: i64,
    instrument_name: String,
    #[serde(default)]
    best_bid_price: Option<f64>,
    #[serde(default)]
    best_bid_amount: Option<f64>,
    #[serde(default)]
    best_ask_price: Option<f64>,
    #[serde(default)]
    best_ask_amount: Option<f64>,
    #[serde(default)]
    underlying_price: Option<f64>,
    #[serde(default)]
    mark_price: Option<f64>,
    #[serde(default)]
    greeks: Option<RawGreeks>,
    #[serde(default)]
    bid_iv: Option<f64>,
    #[serde(default)]
    ask_iv: Option<f64>,
    #[serde(default)]
    mark_iv: Option<f64>,
    #[serde(default)]
    open_interest: Option<f64>,
    #[serde(default)]
    last_price: Option<f64>,
    #[serde(default)]
    current_funding: Option<f64>,
}

/// `ticker.{instrument}.100ms` → `QuoteTick`. Greeks live under a nested
/// object that options tickers carry and perpetual tickers omit; absence
/// decodes to `Greeks::default()` (all `None`), not an error.
fn decode_ticker_frame(data: &Value, received_at: DateTime<Utc>) -> Result<QuoteTick, CoreError> {
    let raw: RawTicker = serde_json::from_value(data.clone())?;
    let timestamp = timestamp_from_millis(raw.timestamp, received_at);
    let greeks = raw.greeks.map(|g| Greeks {
        delta: g.delta,
        gamma: g.gamma,
        theta: g.theta,
        vega: g.vega,
        rho: g.rho,
    }).unwrap_or_default();

    Ok(QuoteTick {
        timestamp,
        instrument: raw.instrument_name,
        best_bid_price: raw.best_bid_price,
        best_bid_amount: raw.best_bid_amount,
        best_ask_price: raw.best_ask_price,
        best_ask_amount: raw.best_ask_amount,
        mark_price: raw.mark_price,
        underlying_price: raw.underlying_price,
        index_price: None,
        greeks,
        implied_vols: ImpliedVols {
            bid_iv: raw.bid_iv,
            ask_iv: raw.ask_iv,
            mark_iv: raw.mark_iv,
        },
        open_interest: raw.open_interest,
        last_price: raw.last_price,
        funding_rate: raw.current_funding,
    })
}

#[derive(Debug, Deserialize)]
struct RawTrade {
    timestamp: i64,
    instrument_name: String,
    trade_id: String,
    price: f64,
    amount: f64,
    direction: String,
    #[serde(default)]
    iv: Option<f64>,
    #[serde(default)]
    index_price: Option<f64>,
}

/// `trades.{instrument}.100ms` frames carry either a single trade object or
/// a JSON array of trades depending on how many executed in the same
/// 100ms window — normalized to `Vec<TradeTick>` here so callers never
/// branch on frame shape.
fn decode_trades_frame(data: &Value, received_at: DateTime<Utc>) -> Result<Vec<TradeTick>, CoreError> {
    let raw_trades: Vec<RawTrade> = if data.is_array() {
        serde_json::from_value(data.clone())?
    } else {
        vec![serde_json::from_value(data.clone())?]
    };

    raw_trades
        .into_iter()
        .map(|raw| {
            let direction = raw.direction.parse::<Direction>().map_err(CoreError::ExchangeApi)?;
            Ok(TradeTick {
                timestamp: timestamp_from_millis(raw.timestamp, received_at),
                instrument: raw.instrument_name,
                trade_id: raw.trade_id,
                price: raw.price,
                amount: raw.amount,
                direction,
                iv: raw.iv,
                index_price: raw.index_price,
            })
        })
        .collect()
}

fn timestamp_from_millis(ms: i64, fallback: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ticker_with_greeks() {
        let data = serde_json::json!({
            "timestamp": 1_700_000_000_000i64,
            "instrument_name": "BTC-1JAN26-50000-C",
            "best_bid_price": 0.05,
            "best_ask_price": 0.06,
            "mark_price": 0.055,
            "greeks": {"delta": 0.5, "gamma": 0.001, "theta": -0.02, "vega": 0.1, "rho": 0.01},
            "bid_iv": 60.0,
            "ask_iv": 62.0,
            "mark_iv": 61.0,
            "open_interest": 100.0,
            "last_price": 0.055
        });
        let quote = decode_ticker_frame(&data, Utc::now()).unwrap();
        assert_eq!(quote.instrument, "BTC-1JAN26-50000-C");
        assert_eq!(quote.greeks.delta, Some(0.5));
        assert_eq!(quote.implied_vols.mark_iv, Some(61.0));
    }

    #[test]
    fn decodes_ticker_without_greeks_for_perpetual() {
        let data = serde_json::json!({
            "timestamp": 1_700_000_000_000i64,
            "instrument_name": "BTC-PERPETUAL",
            "best_bid_price": 50000.0,
            "best_ask_price": 50010.0,
            "mark_price": 50005.0,
            "current_funding": 0.0001
        });
        let quote = decode_ticker_frame(&data, Utc::now()).unwrap();
        assert_eq!(quote.greeks.delta, None);
        assert_eq!(quote.funding_rate, Some(0.0001));
    }

    #[test]
    fn decodes_single_trade_object() {
        let data = serde_json::json!({
            "timestamp": 1_700_000_000_000i64,
            "instrument_name": "BTC-PERPETUAL",
            "trade_id": "123",
            "price": 50000.0,
            "amount": 10.0,
            "direction": "buy"
        });
        let trades = decode_trades_frame(&data, Utc::now()).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].direction, Direction::Buy);
    }

    #[test]
    fn decodes_trade_array() {
        let data = serde_json::json!([
            {"timestamp": 1_700_000_000_000i64, "instrument_name": "BTC-PERPETUAL", "trade_id": "1", "price": 1.0, "amount": 1.0, "direction": "buy"},
            {"timestamp": 1_700_000_000_100i64, "instrument_name": "BTC-PERPETUAL", "trade_id": "2", "price": 2.0, "amount": 2.0, "direction": "sell"},
        ]);
        let trades = decode_trades_frame(&data, Utc::now()).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].direction, Direction::Sell);
    }

    #[test]
    fn dispatch_routes_by_channel_prefix() {
        let quote_data = serde_json::json!({
            "timestamp": 1_700_000_000_000i64, "instrument_name": "BTC-PERPETUAL", "mark_price": 1.0
        });
        let frame = dispatch("ticker.BTC-PERPETUAL.100ms", &quote_data, Utc::now()).unwrap();
        assert!(matches!(frame, DecodedFrame::Quote(_)));

        let frame = dispatch("book.BTC-PERPETUAL.100ms", &quote_data, Utc::now()).unwrap();
        assert!(matches!(frame, DecodedFrame::Unrecognized));
    }
}
