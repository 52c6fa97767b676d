//! SQL builders for the three write paths.
//!
//! One function per tick kind rather than one generic "build upsert from
//! any row shape" builder: quotes, trades, and depth have genuinely
//! different conflict semantics (COALESCE-merge, DO NOTHING, always-append)
//! and cramming all three into one generic path would hide that under a
//! flag. The column list is still named once per function instead of
//! hand-duplicated per call site, since this storage layer has three write paths sharing
//! one retry/pool plumbing (`writer.rs`) that would otherwise drift.

use crate::SqlParam;
use deribit_core::{DepthSnapshot, Direction, QuoteTick, TradeTick};

const QUOTE_COLUMNS: &[&str] = &[
    "timestamp",
    "instrument",
    "best_bid_price",
    "best_bid_amount",
    "best_ask_price",
    "best_ask_amount",
    "mark_price",
    "underlying_price",
    "index_price",
    "delta",
    "gamma",
    "theta",
    "vega",
    "rho",
    "bid_iv",
    "ask_iv",
    "mark_iv",
    "open_interest",
    "last_price",
    "funding_rate",
];

/// `ON CONFLICT (timestamp, instrument) DO UPDATE SET col = COALESCE(EXCLUDED.col, existing.col)`
/// for every column but the key,'s "key design rule" —
/// incoming nulls never overwrite a non-null value.
pub fn build_quote_upsert(table: &str, rows: &[QuoteTick]) -> (String, Vec<SqlParam>) {
    let mut params: Vec<SqlParam> = Vec::with_capacity(rows.len() * QUOTE_COLUMNS.len());
    let mut values_sql = String::new();

    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            values_sql.push(',');
        }
        push_row_placeholders(&mut values_sql, i * QUOTE_COLUMNS.len(), QUOTE_COLUMNS.len());

        params.push(Box::new(row.timestamp));
        params.push(Box::new(row.instrument.clone()));
        params.push(Box::new(row.best_bid_price));
        params.push(Box::new(row.best_bid_amount));
        params.push(Box::new(row.best_ask_price));
        params.push(Box::new(row.best_ask_amount));
        params.push(Box::new(row.mark_price));
        params.push(Box::new(row.underlying_price));
        params.push(Box::new(row.index_price));
        params.push(Box::new(row.greeks.delta));
        params.push(Box::new(row.greeks.gamma));
        params.push(Box::new(row.greeks.theta));
        params.push(Box::new(row.greeks.vega));
        params.push(Box::new(row.greeks.rho));
        params.push(Box::new(row.implied_vols.bid_iv));
        params.push(Box::new(row.implied_vols.ask_iv));
        params.push(Box::new(row.implied_vols.mark_iv));
        params.push(Box::new(row.open_interest));
        params.push(Box::new(row.last_price));
        params.push(Box::new(row.funding_rate));
    }

    let update_cols = QUOTE_COLUMNS[2..]
        .iter()
        .map(|c| format!("{c} = COALESCE(EXCLUDED.{c}, {table}.{c})"))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "INSERT INTO {table} ({cols}) VALUES {values_sql} ON CONFLICT (timestamp, instrument) DO UPDATE SET {update_cols}",
        cols = QUOTE_COLUMNS.join(", "),
    );
    (sql, params)
}

const TRADE_COLUMNS: &[&str] = &[
    "timestamp",
    "instrument",
    "trade_id",
    "price",
    "amount",
    "direction",
    "iv",
    "index_price",
];

/// `ON CONFLICT (trade_id, instrument) DO NOTHING` — trades are immutable
/// once recorded.
pub fn build_trade_upsert(table: &str, rows: &[TradeTick]) -> (String, Vec<SqlParam>) {
    let mut params: Vec<SqlParam> = Vec::with_capacity(rows.len() * TRADE_COLUMNS.len());
    let mut values_sql = String::new();

    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            values_sql.push(',');
        }
        push_row_placeholders(&mut values_sql, i * TRADE_COLUMNS.len(), TRADE_COLUMNS.len());

        params.push(Box::new(row.timestamp));
        params.push(Box::new(row.instrument.clone()));
        params.push(Box::new(row.trade_id.clone()));
        params.push(Box::new(row.price));
        params.push(Box::new(row.amount));
        params.push(Box::new(direction_str(row.direction)));
        params.push(Box::new(row.iv));
        params.push(Box::new(row.index_price));
    }

    let sql = format!(
        "INSERT INTO {table} ({cols}) VALUES {values_sql} ON CONFLICT (trade_id, instrument) DO NOTHING",
        cols = TRADE_COLUMNS.join(", "),
    );
    (sql, params)
}

const DEPTH_COLUMNS: &[&str] = &[
    "timestamp",
    "instrument",
    "bids",
    "asks",
    "mark_price",
    "underlying_price",
    "open_interest",
    "volume_24h",
];

/// Depth snapshots have no conflict key and are always appended.
pub fn build_depth_insert(table: &str, rows: &[DepthSnapshot]) -> (String, Vec<SqlParam>) {
    let mut params: Vec<SqlParam> = Vec::with_capacity(rows.len() * DEPTH_COLUMNS.len());
    let mut values_sql = String::new();

    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            values_sql.push(',');
        }
        push_row_placeholders(&mut values_sql, i * DEPTH_COLUMNS.len(), DEPTH_COLUMNS.len());

        params.push(Box::new(row.timestamp));
        params.push(Box::new(row.instrument.clone()));
        params.push(Box::new(serde_json::to_value(&row.bids).unwrap_or(serde_json::Value::Null)));
        params.push(Box::new(serde_json::to_value(&row.asks).unwrap_or(serde_json::Value::Null)));
        params.push(Box::new(row.mark_price));
        params.push(Box::new(row.underlying_price));
        params.push(Box::new(row.open_interest));
        params.push(Box::new(row.volume_24h));
    }

    let sql = format!(
        "INSERT INTO {table} ({cols}) VALUES {values_sql}",
        cols = DEPTH_COLUMNS.join(", "),
    );
    (sql, params)
}

fn direction_str(direction: Direction) -> String {
    match direction {
        Direction::Buy => "buy".to_string(),
        Direction::Sell => "sell".to_string(),
    }
}

fn push_row_placeholders(out: &mut String, base: usize, width: usize) {
    out.push('(');
    for j in 1..=width {
        if j > 1 {
            out.push(',');
        }
        out.push('$');
        out.push_str(&(base + j).to_string());
    }
    out.push(')');
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn quote_upsert_has_one_placeholder_group_per_row() {
        let rows = vec![
            QuoteTick::new(Utc::now(), "A"),
            QuoteTick::new(Utc::now(), "B"),
        ];
        let (sql, params) = build_quote_upsert("btc_option_quotes", &rows);
        assert_eq!(params.len(), rows.len() * QUOTE_COLUMNS.len());
        assert!(sql.contains("ON CONFLICT (timestamp, instrument) DO UPDATE SET"));
        assert!(sql.contains("best_bid_price = COALESCE(EXCLUDED.best_bid_price, btc_option_quotes.best_bid_price)"));
        assert!(sql.contains("$20"), "last placeholder of row 1 should be $20, got: {sql}");
        assert!(sql.contains("$21"), "first placeholder of row 2 should be $21, got: {sql}");
    }

    #[test]
    fn trade_upsert_does_nothing_on_conflict() {
        let rows = vec![TradeTick {
            timestamp: Utc::now(),
            instrument: "A".into(),
            trade_id: "1".into(),
            price: 1.0,
            amount: 1.0,
            direction: Direction::Buy,
            iv: None,
            index_price: None,
        }];
        let (sql, _) = build_trade_upsert("btc_option_trades", &rows);
        assert!(sql.contains("ON CONFLICT (trade_id, instrument) DO NOTHING"));
    }

    #[test]
    fn depth_insert_has_no_conflict_clause() {
        let rows = vec![DepthSnapshot {
            timestamp: Utc::now(),
            instrument: "A".into(),
            bids: vec![],
            asks: vec![],
            mark_price: None,
            underlying_price: None,
            open_interest: None,
            volume_24h: None,
        }];
        let (sql, _) = build_depth_insert("btc_option_orderbook_depth", &rows);
        assert!(!sql.contains("ON CONFLICT"));
    }
}
