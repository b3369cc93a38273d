//! Realtime order feed over WebSocket
//!
//! ```text
//! client ──{"action":"join","order_id":…}──▶ connection task ──▶ FanoutRouter (owner/admin check)
//! client ◀──{"event":"order:updated",…}──── connection task ◀── Subscription (user / admin / order topics)
//! ```
//!
//! One task per connection owns its subscription and a child of the server
//! shutdown token. Denied joins get no reply.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use futures_util::{SinkExt, StreamExt};
use mercato_order::{FanoutRouter, Subscription, Topic};
use mercato_shared::OrderChangedEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// Commands a connected client may send
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    Join { order_id: Uuid },
    Leave { order_id: Uuid },
}

/// Frame pushed to the client for every delivered event
#[derive(Debug, Serialize)]
pub struct ServerFrame<'a> {
    pub event: &'static str,
    pub topic: String,
    pub data: &'a OrderChangedEvent,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/realtime", get(handle_realtime_ws))
}

/// GET /v1/realtime
/// Credential via `Authorization: Bearer` or `?token=` (browsers cannot set
/// headers on a WebSocket handshake)
async fn handle_realtime_ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let credential = headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .or(params.token)
        .ok_or_else(|| AppError::AuthenticationError("Missing credential".to_string()))?;

    let subscription = state.fanout.connect(&credential).map_err(|e| {
        tracing::debug!("Realtime connection rejected: {}", e);
        AppError::AuthenticationError("Invalid or expired token".to_string())
    })?;

    let fanout = state.fanout.clone();
    let cancel = state.shutdown.child_token();
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, subscription, fanout, cancel)))
}

async fn handle_connection(
    socket: WebSocket,
    mut subscription: Subscription,
    fanout: Arc<FanoutRouter>,
    cancel: CancellationToken,
) {
    let user_id = subscription.identity().user_id.clone();
    let (mut ws_sink, mut ws_stream) = socket.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }

            // Incoming message from client
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_command(text.as_str(), &mut subscription, &fanout).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::warn!(%user_id, "WebSocket error: {}", e);
                        break;
                    }
                    _ => {} // Binary, Pong
                }
            }

            // Event from a subscribed topic
            Some((topic, event)) = subscription.next() => {
                if !push_event(&mut ws_sink, &topic, &event).await {
                    break;
                }
            }
        }
    }

    tracing::info!(%user_id, "Realtime observer disconnected");
}

async fn handle_command(text: &str, subscription: &mut Subscription, fanout: &FanoutRouter) {
    match serde_json::from_str::<ClientCommand>(text) {
        Ok(ClientCommand::Join { order_id }) => {
            fanout.join_order(subscription, order_id).await;
        }
        Ok(ClientCommand::Leave { order_id }) => {
            fanout.leave_order(subscription, order_id);
        }
        Err(e) => {
            tracing::debug!(user_id = %subscription.identity().user_id, "Ignoring malformed client message: {}", e);
        }
    }
}

/// Returns false once the socket is gone
async fn push_event<S>(sink: &mut S, topic: &Topic, event: &OrderChangedEvent) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    let frame = ServerFrame {
        event: event.event_name(),
        topic: topic.to_string(),
        data: event,
    };

    match serde_json::to_string(&frame) {
        Ok(json) => sink.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::warn!(order_id = %event.order_id, "Failed to encode realtime frame: {}", e);
            true
        }
    }
}
