//! WebSocket progress channel for a single job.
//!
//! The server pushes every [`ProgressEvent`](pressroom_core::ProgressEvent) as
//! JSON, starting with a replay of the current state, and closes the socket
//! after the terminal event. Clients may send `{"type": "cancel"}`.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use pressroom_core::{EventStream, JobCoordinator, JobId};

use super::jobs::job_error;
use crate::metrics::{
    WS_COMMANDS_RECEIVED, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS,
    WS_MESSAGES_SENT,
};
use crate::state::AppState;

/// Message sent by a client over the progress socket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the job to stop.
    Cancel,
}

/// WebSocket upgrade handler.
///
/// The job is looked up before upgrading so unknown ids get a plain `404`.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let job_id = JobId::from(id);
    let events = match state.coordinator().subscribe(&job_id).await {
        Ok(events) => events,
        Err(e) => return job_error(e).into_response(),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let coordinator = Arc::clone(state.coordinator());
    ws.on_upgrade(move |socket| handle_socket(socket, coordinator, job_id, events))
}

/// Handle a single WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    coordinator: Arc<JobCoordinator>,
    job_id: JobId,
    mut events: EventStream,
) {
    let (mut sender, mut receiver) = socket.split();

    // Track connection metrics
    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!(job_id = %job_id, "WebSocket client connected");

    // Forward progress events to this client
    let send_job = job_id.clone();
    let mut send_task = tokio::spawn(async move {
        let mut first = true;
        while let Some(event) = events.next().await {
            // Only the opening event is an expected replay; later ones mean we lagged
            if event.replay && !first {
                warn!(job_id = %send_job, seq = event.seq, "WebSocket client lagged, sent replay");
                WS_LAG_EVENTS.inc();
            }
            first = false;

            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        return;
                    }
                    WS_MESSAGES_SENT
                        .with_label_values(&[event.phase.as_str()])
                        .inc();
                }
                Err(e) => {
                    error!("Failed to serialize ProgressEvent: {}", e);
                }
            }
        }
        // Terminal event delivered or the job was dropped
        let _ = sender.send(Message::Close(None)).await;
    });

    // Handle incoming messages from client (cancel, close)
    let recv_job = job_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(ClientMessage::Cancel) => {
                        WS_COMMANDS_RECEIVED.with_label_values(&["cancel"]).inc();
                        if let Err(e) = coordinator.cancel(&recv_job).await {
                            warn!(job_id = %recv_job, error = %e, "Cancel over WebSocket failed");
                        }
                    }
                    Err(e) => {
                        WS_COMMANDS_RECEIVED.with_label_values(&["invalid"]).inc();
                        debug!("Ignoring unrecognized client message {}: {}", text.as_str(), e);
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("WebSocket client requested close");
                    break;
                }
                Ok(_) => {
                    // Ping/pong is handled by axum
                }
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    WS_CONNECTIONS_ACTIVE.dec();
    info!(job_id = %job_id, "WebSocket client disconnected");
}
