//! WebSocket gateway: per-owner progress events pushed to connected clients.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Extensions, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use screenflow_core::{AuthError, AuthRequest, Identity};

use super::middleware::source_ip;
use crate::gateway::RegisteredConnection;
use crate::metrics::{
    AUTH_FAILURES_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_MESSAGES_SENT,
};
use crate::state::AppState;

/// Frames the gateway itself produces, next to the forwarded progress events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Client keepalive check.
    Ping,
    /// Answer to a ping.
    Pong,
    /// Sent after the socket has been idle for the heartbeat interval.
    Heartbeat { timestamp: i64 },
}

impl ControlFrame {
    pub fn heartbeat() -> Self {
        ControlFrame::Heartbeat {
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ControlFrame::Ping => "ping",
            ControlFrame::Pong => "pong",
            ControlFrame::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Accepts the bare `ping` text as well as `{"type":"ping"}`.
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("ping") {
            return Some(ControlFrame::Ping);
        }
        serde_json::from_str(text).ok()
    }
}

/// Query parameters of the upgrade request
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// API key; browsers cannot set headers on WebSocket requests.
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// Credentials are checked before the upgrade so a bad token is answered
/// with a plain HTTP error.
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
    Query(params): Query<WsParams>,
    extensions: Extensions,
) -> Response {
    let token = params.token.as_deref();
    if let Err(status) = authenticate(&state, token, source_ip(&extensions), &owner_id).await {
        return status.into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, owner_id))
}

async fn authenticate(
    state: &AppState,
    token: Option<&str>,
    source_ip: IpAddr,
    owner_id: &str,
) -> Result<Identity, StatusCode> {
    let authenticator = state.authenticator();
    if authenticator.method_name() == "none" {
        return Ok(Identity::anonymous());
    }

    let result = match token.filter(|t| !t.is_empty()) {
        Some(token) => {
            authenticator
                .authenticate_owner(&AuthRequest::bearer(token, source_ip), owner_id)
                .await
        }
        None => Err(AuthError::NotAuthenticated),
    };

    result.map_err(|e| {
        AUTH_FAILURES_TOTAL.with_label_values(&[e.label()]).inc();
        warn!(owner_id = %owner_id, error = %e, "WebSocket authentication failed");
        match e {
            AuthError::NotAuthenticated | AuthError::InvalidCredentials(_) => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AuthError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    })
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, owner_id: String) {
    let (mut sink, mut receiver) = socket.split();

    let registry = Arc::clone(state.registry());
    let RegisteredConnection {
        id,
        mut frames,
        closed,
    } = registry.register(&owner_id).await;

    // Track connection metrics
    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!(owner_id = %owner_id, connection_id = id, "WebSocket client connected");

    // Pong and heartbeat frames from the receive loop
    let (control_tx, mut control_rx) = mpsc::channel::<String>(8);

    // Single writer: forwarded events and control frames
    let send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        debug!("Registry dropped the connection");
                        break;
                    }
                },
                frame = control_rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            if sink.send(Message::Text(frame.into())).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let heartbeat = state.heartbeat_interval();
    loop {
        let reply = tokio::select! {
            _ = closed.notified() => {
                debug!(connection_id = id, "Connection closed by registry");
                break;
            }
            next = tokio::time::timeout(heartbeat, receiver.next()) => match next {
                Err(_) => Some(ControlFrame::heartbeat()),
                Ok(None) => break,
                Ok(Some(Ok(Message::Text(text)))) => match ControlFrame::parse(&text) {
                    Some(ControlFrame::Ping) => Some(ControlFrame::Pong),
                    _ => {
                        debug!("Ignoring client message: {}", text.as_str());
                        None
                    }
                },
                Ok(Some(Ok(Message::Close(_)))) => {
                    debug!("WebSocket client requested close");
                    break;
                }
                // Protocol pings are answered by axum
                Ok(Some(Ok(_))) => None,
                Ok(Some(Err(e))) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            },
        };

        let Some(reply) = reply else {
            continue;
        };
        let frame = match serde_json::to_string(&reply) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to serialize control frame");
                continue;
            }
        };
        if control_tx.send(frame).await.is_err() {
            break;
        }
        WS_MESSAGES_SENT.with_label_values(&[reply.label()]).inc();
    }

    // Clean up
    send_task.abort();
    registry.unregister(&owner_id, id).await;
    WS_CONNECTIONS_ACTIVE.dec();
    info!(owner_id = %owner_id, connection_id = id, "WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_frame_wire_format() {
        assert_eq!(
            serde_json::to_string(&ControlFrame::Pong).unwrap(),
            r#"{"type":"pong"}"#
        );
        let heartbeat = serde_json::to_value(ControlFrame::Heartbeat { timestamp: 42 }).unwrap();
        assert_eq!(heartbeat["type"], "heartbeat");
        assert_eq!(heartbeat["timestamp"], 42);
    }

    #[test]
    fn test_parse_client_ping() {
        assert_eq!(ControlFrame::parse("ping"), Some(ControlFrame::Ping));
        assert_eq!(ControlFrame::parse(" PING\n"), Some(ControlFrame::Ping));
        assert_eq!(ControlFrame::parse(r#"{"type":"ping"}"#), Some(ControlFrame::Ping));
        assert_eq!(ControlFrame::parse("hello"), None);
    }
}
