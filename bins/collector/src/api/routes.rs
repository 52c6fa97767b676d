use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use deribit_ws_proto::envelope;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};
use tracing::warn;

use crate::context::CollectorContext;

const SUBSCRIBE_ACK_TIMEOUT: Duration = Duration::from_secs(5);

pub fn router() -> Router<CollectorContext> {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/subscribe", post(subscribe))
        .route("/api/unsubscribe", post(unsubscribe))
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"success": false, "error": self.message}))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct InstrumentsRequest {
    pub instruments: Vec<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct SubscribeResponse {
    pub success: bool,
    pub subscribed: Vec<String>,
    pub already_subscribed: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct UnsubscribeResponse {
    pub success: bool,
    pub unsubscribed: Vec<String>,
    pub not_subscribed: Vec<String>,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "now": Utc::now()}))
}

async fn status(State(ctx): State<CollectorContext>) -> Json<serde_json::Value> {
    let owned = ctx.owned.read().await;
    let ws_up = ctx.ws_commands.lock().await.is_some();
    Json(json!({
        "currency": ctx.config.currency.to_string(),
        "connection_id": ctx.config.connection_id,
        "instrument_count": owned.len(),
        "instruments": owned.iter().cloned().collect::<Vec<_>>(),
        "ws_connected": ws_up,
        "last_tick_at": ctx.last_tick_at(),
        "stats": ctx.stats.snapshot(),
    }))
}

/// Adds instruments to the owned set and, if a live WS connection exists,
/// subscribes their channels immediately (waiting up to 5s for an ack)
/// rather than waiting for the next full reconnect. Instruments added
/// while disconnected are still queued: the next reconnect's
/// `subscribe_all` picks up the whole owned set regardless.
async fn subscribe(
    State(ctx): State<CollectorContext>,
    Json(req): Json<InstrumentsRequest>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    if req.instruments.is_empty() {
        return Err(ApiError { status: StatusCode::BAD_REQUEST, message: "instruments must be non-empty".into() });
    }

    let mut response = SubscribeResponse { success: true, ..Default::default() };
    let mut newly_owned = Vec::new();

    {
        let mut owned = ctx.owned.write().await;
        for instrument in &req.instruments {
            if owned.contains(instrument) {
                response.already_subscribed.push(instrument.clone());
            } else {
                owned.insert(instrument.clone());
                newly_owned.push(instrument.clone());
            }
        }
    }

    if newly_owned.is_empty() {
        return Ok(Json(response));
    }

    let channels: Vec<String> = newly_owned.iter().flat_map(|i| envelope::channels_for_instrument(i)).collect();
    let cmd_tx = ctx.ws_commands.lock().await.clone();

    match cmd_tx {
        Some(tx) => {
            let id = ctx.next_request_id();
            let (ack_tx, ack_rx) = oneshot::channel();
            ctx.pending_acks.lock().expect("pending_acks mutex poisoned").insert(id, ack_tx);

            let request = envelope::build_request(id, "public/subscribe", &channels);
            if tx.send(request).is_err() {
                warn!("ws command channel closed mid-subscribe, instrument is still queued for next reconnect");
                response.subscribed.extend(newly_owned);
                return Ok(Json(response));
            }

            match timeout(SUBSCRIBE_ACK_TIMEOUT, ack_rx).await {
                Ok(Ok(true)) => response.subscribed.extend(newly_owned),
                Ok(Ok(false)) => {
                    response.failed.extend(newly_owned);
                    response.success = false;
                }
                Ok(Err(_)) | Err(_) => {
                    // Ack channel dropped or timed out: the instrument is
                    // already in the owned set, so it's still correct
                    // eventually (next reconnect), just not live yet.
                    ctx.pending_acks.lock().expect("pending_acks mutex poisoned").remove(&id);
                    response.subscribed.extend(newly_owned);
                }
            }
        }
        None => {
            // No live connection: the instrument is queued via the owned
            // set and will be picked up on the next `subscribe_all`.
            response.subscribed.extend(newly_owned);
        }
    }

    Ok(Json(response))
}

/// Removes instruments from the owned set unconditionally, then best-effort
/// sends a live unsubscribe if a connection exists. Unlike subscribe, a
/// disconnected socket never fails this call: ownership is the source of
/// truth and the instrument simply won't be resubscribed on next reconnect.
async fn unsubscribe(
    State(ctx): State<CollectorContext>,
    Json(req): Json<InstrumentsRequest>,
) -> Json<UnsubscribeResponse> {
    let mut response = UnsubscribeResponse { success: true, ..Default::default() };
    let mut removed = Vec::new();

    {
        let mut owned = ctx.owned.write().await;
        for instrument in &req.instruments {
            if owned.remove(instrument) {
                removed.push(instrument.clone());
            } else {
                response.not_subscribed.push(instrument.clone());
            }
        }
    }

    if removed.is_empty() {
        return Json(response);
    }

    let channels: Vec<String> = removed.iter().flat_map(|i| envelope::channels_for_instrument(i)).collect();
    if let Some(tx) = ctx.ws_commands.lock().await.clone() {
        let id = ctx.next_request_id();
        let request = envelope::build_request(id, "public/unsubscribe", &channels);
        let _ = tx.send(request);
    }

    response.unsubscribed = removed;
    Json(response)
}
