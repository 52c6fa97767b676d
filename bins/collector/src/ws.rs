//! WebSocket session loop.
//!
//! Grounded in the original codebase's `kite::ws::KiteTickerWs` (split read/write
//! halves, `subscribe_*` chunking helper, outer reconnect loop owning its
//! own backoff state, explicit `Message` match arms) and
//! `ws_tick_collector_multi.py`'s `_websocket_loop`/`_subscribe_to_instruments`/
//! `_process_messages` for the exact subscribe/dispatch sequence, generalized
//! from a fixed-backoff reconnect to the doubling `ws_proto::backoff` sequence
//! and from single-purpose subscribe to a live-mutable one via `ws_commands`.

use crate::context::CollectorContext;
use crate::flush;
use deribit_core::CoreError;
use deribit_ws_proto::{backoff, envelope, InboundMessage};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

const PING_INTERVAL: Duration = Duration::from_secs(20);
const GENERATION_POLL_INTERVAL: Duration = Duration::from_secs(5);
const SUBSCRIBE_CHUNK_CHANNELS: usize = 400;

#[derive(Debug)]
enum ReconnectReason {
    Closed,
    GenerationBumped,
    Cancelled,
}

/// Outer reconnect loop: owns backoff state across attempts, resets it
/// whenever a session ends cleanly via a generation bump rather than an
/// error. Only error-driven reconnects need the growing delay.
pub async fn run(ctx: CollectorContext) {
    let mut delay = backoff::INITIAL;

    loop {
        if ctx.cancel.is_cancelled() {
            return;
        }

        match run_once(&ctx).await {
            Ok(ReconnectReason::Cancelled) => return,
            Ok(ReconnectReason::GenerationBumped) => {
                info!("ws session closed for instrument refresh, reconnecting immediately");
                delay = backoff::INITIAL;
            }
            Ok(ReconnectReason::Closed) => {
                warn!(delay_secs = delay.as_secs(), "ws session closed, reconnecting");
                tokio::time::sleep(delay).await;
                delay = backoff::next_backoff(delay);
            }
            Err(err) => {
                ctx.stats.errors.fetch_add(1, Ordering::Relaxed);
                error!(%err, delay_secs = delay.as_secs(), "ws session error, reconnecting");
                tokio::time::sleep(delay).await;
                delay = backoff::next_backoff(delay);
            }
        }
    }
}

async fn run_once(ctx: &CollectorContext) -> Result<ReconnectReason, CoreError> {
    let generation_at_start = ctx.generation.load(Ordering::SeqCst);

    info!(url = %ctx.config.ws_url, "connecting to deribit websocket");
    let (ws_stream, _resp) = tokio_tungstenite::connect_async(&ctx.config.ws_url).await?;
    let (mut write, mut read) = ws_stream.split();
    info!("websocket connected");

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<String>();
    *ctx.ws_commands.lock().await = Some(cmd_tx);

    subscribe_all(ctx, &mut write).await?;

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await; // first tick fires immediately
    let mut generation_check = tokio::time::interval(GENERATION_POLL_INTERVAL);
    generation_check.tick().await;

    let reason = loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                break ReconnectReason::Cancelled;
            }
            _ = ping_interval.tick() => {
                if write.send(Message::Ping(Vec::new())).await.is_err() {
                    break ReconnectReason::Closed;
                }
            }
            _ = generation_check.tick() => {
                if ctx.generation.load(Ordering::SeqCst) != generation_at_start {
                    let _ = write.send(Message::Close(None)).await;
                    break ReconnectReason::GenerationBumped;
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(text) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            break ReconnectReason::Closed;
                        }
                    }
                    None => {}
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text_frame(ctx, &text).await;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "websocket closed by server");
                        break ReconnectReason::Closed;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        return Err(CoreError::WebSocket(err));
                    }
                    None => break ReconnectReason::Closed,
                }
            }
        }
    };

    *ctx.ws_commands.lock().await = None;
    Ok(reason)
}

async fn subscribe_all(
    ctx: &CollectorContext,
    write: &mut (impl SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
) -> Result<(), CoreError> {
    let instruments: Vec<String> = ctx.owned.read().await.iter().cloned().collect();
    let channels: Vec<String> = instruments
        .iter()
        .flat_map(|i| envelope::channels_for_instrument(i))
        .collect();

    info!(instruments = instruments.len(), channels = channels.len(), "subscribing");

    for chunk in channels.chunks(SUBSCRIBE_CHUNK_CHANNELS) {
        let id = ctx.next_request_id();
        let request = envelope::build_request(id, "public/subscribe", chunk);
        write
            .send(Message::Text(request))
            .await
            .map_err(CoreError::WebSocket)?;
    }
    Ok(())
}

async fn handle_text_frame(ctx: &CollectorContext, text: &str) {
    let inbound: InboundMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(err) => {
            warn!(%err, "failed to decode inbound ws frame");
            ctx.stats.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    if let Some(params) = inbound.params {
        ctx.record_tick();
        match deribit_ws_proto::dispatch(&params.channel, &params.data, chrono::Utc::now()) {
            Ok(deribit_ws_proto::DecodedFrame::Quote(quote)) => {
                ctx.stats.quotes_received.fetch_add(1, Ordering::Relaxed);
                if let Err(CoreError::BufferFull { queue, .. }) = ctx.buffer.add_quote(quote.clone()) {
                    if let Err(err) = flush::flush_once(ctx).await {
                        error!(%err, "forced flush before buffer-full retry failed");
                    }
                    if ctx.buffer.add_quote(quote).is_err() {
                        ctx.buffer.record_discard(queue);
                    }
                }
            }
            Ok(deribit_ws_proto::DecodedFrame::Trades(trades)) => {
                for trade in trades {
                    ctx.stats.trades_received.fetch_add(1, Ordering::Relaxed);
                    if let Err(CoreError::BufferFull { queue, .. }) = ctx.buffer.add_trade(trade.clone()) {
                        if let Err(err) = flush::flush_once(ctx).await {
                            error!(%err, "forced flush before buffer-full retry failed");
                        }
                        if ctx.buffer.add_trade(trade).is_err() {
                            ctx.buffer.record_discard(queue);
                        }
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%err, channel = %params.channel, "failed to decode tick frame");
                ctx.stats.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        return;
    }

    if let Some(id) = inbound.id {
        let outcome = inbound.error.is_none();
        if let Some(tx) = ctx.pending_acks.lock().expect("pending_acks mutex poisoned").remove(&id) {
            let _ = tx.send(outcome);
        }
        if let Some(rpc_err) = inbound.error {
            warn!(id, error = %rpc_err.message, "rpc request failed");
        }
    }
}
