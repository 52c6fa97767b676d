//! Deribit JSON-RPC 2.0 WebSocket wire protocol: request envelope
//! construction, inbound frame decoding, and reconnect backoff as pure,
//! socket-free logic so it's unit-testable without a live connection.
//!
//! Grounded in `original_source/scripts/ws_tick_collector_multi.py`'s
//! `_subscribe_to_instruments`/`_handle_quote_tick`/`_handle_trade_tick`
//! for the exact field names and channel-naming convention, and the
//! original codebase's `kite::ws` for the shape of a typed inbound-frame
//! enum plus `api::routes`'s thin serde structs.

pub mod backoff;
pub mod decode;
pub mod envelope;

pub use backoff::next_backoff;
pub use decode::{dispatch, DecodedFrame};
pub use envelope::{build_request, channels_for_instrument, InboundMessage, InboundParams, RpcError};
