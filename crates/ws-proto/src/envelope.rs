//! JSON-RPC 2.0 request/response shapes exchanged over the Deribit public
//! WebSocket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Builds a `public/subscribe` or `public/unsubscribe` JSON-RPC request.
/// `id` is the caller's own monotonic counter — the WS session loop
/// correlates replies back to callers (including live control-API
/// subscribes) by matching this id, not by request order.
pub fn build_request(id: u64, method: &str, channels: &[String]) -> String {
    let envelope = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": {"channels": channels},
    });
    envelope.to_string()
}

/// `ticker.{instrument}.100ms` carries Greeks/IV/mark data;
/// `trades.{instrument}.100ms` carries executed trades. `book.*` is never
/// subscribed — full depth comes only from the REST snapshot path.
pub fn channels_for_instrument(instrument: &str) -> [String; 2] {
    [format!("ticker.{instrument}.100ms"), format!("trades.{instrument}.100ms")]
}

/// A decoded inbound WebSocket text frame. Deribit multiplexes tick data
/// (`params`) and RPC replies (`id` + `result`/`error`) over the same
/// connection, so both shapes are optional fields on one struct rather
/// than an untagged enum — this matches what `serde_json` hands back for
/// either shape without a custom `Deserialize` impl.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<InboundParams>,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct InboundParams {
    #[serde(default)]
    pub channel: String,
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_has_jsonrpc_fields() {
        let sql = build_request(7, "public/subscribe", &["ticker.BTC-PERPETUAL.100ms".to_string()]);
        let parsed: Value = serde_json::from_str(&sql).unwrap();
        assert_eq!(parsed["jsonrpc"], "2.0");
        assert_eq!(parsed["id"], 7);
        assert_eq!(parsed["method"], "public/subscribe");
        assert_eq!(parsed["params"]["channels"][0], "ticker.BTC-PERPETUAL.100ms");
    }

    #[test]
    fn channels_use_ticker_and_trades_never_book() {
        let channels = channels_for_instrument("ETH-PERPETUAL");
        assert_eq!(channels[0], "ticker.ETH-PERPETUAL.100ms");
        assert_eq!(channels[1], "trades.ETH-PERPETUAL.100ms");
        assert!(!channels.iter().any(|c| c.starts_with("book.")));
    }

    #[test]
    fn inbound_message_parses_tick_frame() {
        let raw = r#"{"jsonrpc":"2.0","method":"subscription","params":{"channel":"ticker.BTC-PERPETUAL.100ms","data":{"instrument_name":"BTC-PERPETUAL"}}}"#;
        let msg: InboundMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.params.unwrap().channel, "ticker.BTC-PERPETUAL.100ms");
    }

    #[test]
    fn inbound_message_parses_rpc_reply() {
        let raw = r#"{"jsonrpc":"2.0","id":7,"result":["ticker.BTC-PERPETUAL.100ms"]}"#;
        let msg: InboundMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.id, Some(7));
        assert!(msg.result.is_some());
    }
}
