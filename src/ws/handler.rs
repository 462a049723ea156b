//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::auth::Identity;
use crate::session::{deliver, Outbox, PlayerId, SessionHandle, OUTBOX_CAPACITY};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT for authentication (browsers cannot set headers on upgrade)
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    State(state): State<AppState>,
) -> Response {
    let credential = query
        .token
        .as_deref()
        .or_else(|| bearer.as_ref().map(|TypedHeader(auth)| auth.token()));

    // Verify before upgrading; refused connections never reach the session
    match state.gate.admit(credential) {
        Ok(identity) => {
            info!(identity = %identity, "WebSocket upgrade for authenticated user");
            ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            e.into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, identity: Identity, state: AppState) {
    let id = PlayerId::new();
    info!(player_id = %id, identity = %identity, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (outbox_tx, outbox_rx) = mpsc::channel::<ServerMsg>(OUTBOX_CAPACITY);

    // The snapshot is queued on the outbox before any peer can see us
    if let Err(e) = state
        .session
        .join(id, identity.into_inner(), outbox_tx.clone(), Instant::now())
        .await
    {
        error!(player_id = %id, error = %e, "Failed to join session");
        return;
    }

    let writer_handle = tokio::spawn(run_writer(id, ws_sink, outbox_rx));

    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);
    run_reader(id, ws_stream, &state.session, &outbox_tx, &rate_limiter).await;

    // Idempotent on the coordinator side
    if let Err(e) = state.session.leave(id).await {
        error!(player_id = %id, error = %e, "Failed to leave session");
    }

    writer_handle.abort();

    info!(player_id = %id, "WebSocket connection closed");
}

/// Outbox -> WebSocket
async fn run_writer(
    id: PlayerId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbox_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = outbox_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(player_id = %id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// WebSocket -> session, in arrival order
async fn run_reader(
    id: PlayerId,
    mut ws_stream: SplitStream<WebSocket>,
    session: &SessionHandle,
    outbox: &Outbox,
    rate_limiter: &ConnectionRateLimiter,
) {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %id, "Rate limited input message");
                    continue;
                }

                match ClientMsg::parse(&text) {
                    Ok(ClientMsg::State(candidate)) => {
                        if session
                            .submit_state(id, candidate, Instant::now())
                            .await
                            .is_err()
                        {
                            debug!(player_id = %id, "Session closed");
                            break;
                        }
                    }
                    Ok(ClientMsg::Ping { t }) => {
                        deliver(id, outbox, ServerMsg::Pong { t });
                    }
                    Err(e) => {
                        debug!(player_id = %id, error = %e, "Dropped malformed message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
