//! HTTP and WebSocket handlers for the analysis module
//!
//! REST endpoints drive the session lifecycle; the WebSocket endpoint is
//! the realtime transport, registering itself as the session's output
//! subscriber and translating tagged output events into typed client
//! messages.

use crate::analysis::manager::AnalysisManager;
use crate::analysis::types::{
    ClientMessage, OutputEvent, ServerMessage, StartAnalysisRequest, StartAnalysisResponse,
    SubmitAnswersRequest,
};
use crate::error::Error;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Artifact filenames the continuation phase writes into the feature folder
const OUTPUT_ARTIFACTS: [&str; 2] = ["feature.md", "implementation-plan.md"];

/// Shared state for analysis handlers
#[derive(Clone)]
pub struct AnalysisState {
    pub manager: Arc<AnalysisManager>,
}

/// Create the analysis router with all REST and WebSocket endpoints
pub fn analysis_router(state: AnalysisState) -> Router {
    Router::new()
        .route("/api/analyze/start", post(start_analysis))
        .route("/api/analyze/:id/answers", post(submit_answers))
        .route("/api/analyze/:id/cancel", post(cancel_analysis))
        .route("/api/analyze/:id/status", get(session_status))
        .route("/api/analyze/ws/:id", get(ws_upgrade))
        .with_state(state)
}

// =============================================================================
// REST handlers
// =============================================================================

/// Start a new feature analysis session.
///
/// Returns the session id and the WebSocket URL for streaming updates.
async fn start_analysis(
    State(state): State<AnalysisState>,
    Json(request): Json<StartAnalysisRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .start_analysis(&request.workspace_path, &request.feature_path)
        .await
    {
        Ok(session_id) => {
            let status = state
                .manager
                .get_session(&session_id)
                .await
                .map(|s| s.status)
                .unwrap_or(crate::analysis::types::AnalysisStatus::Running);
            (
                StatusCode::OK,
                Json(serde_json::to_value(StartAnalysisResponse {
                    websocket_url: format!("/api/analyze/ws/{}", session_id),
                    session_id,
                    status,
                })
                .unwrap_or_default()),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

/// Submit answers to clarifying questions
async fn submit_answers(
    State(state): State<AnalysisState>,
    Path(session_id): Path<String>,
    Json(request): Json<SubmitAnswersRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .submit_answers(&session_id, request.answers)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "processing",
                "message": "Updating feature specification..."
            })),
        ),
        Err(e @ Error::SessionNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
        Err(e @ Error::InvalidState { .. }) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

/// Cancel an in-progress analysis
async fn cancel_analysis(
    State(state): State<AnalysisState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.manager.cancel(&session_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "cancelled"})),
        ),
        Err(e @ Error::SessionNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

/// Get the current status and question list of a session
async fn session_status(
    State(state): State<AnalysisState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.manager.get_session(&session_id).await {
        Some(snapshot) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "session_id": snapshot.session_id,
                "status": snapshot.status,
                "questions": if snapshot.questions.is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::to_value(&snapshot.questions).unwrap_or_default()
                },
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Session not found"})),
        ),
    }
}

// =============================================================================
// WebSocket handler
// =============================================================================

/// WebSocket upgrade handler for realtime session updates
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AnalysisState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session_ws(socket, session_id, state))
}

/// Bridge one WebSocket connection to the session's output stream.
///
/// The connection registers itself as the current output subscriber
/// (replacing any predecessor) and then serves three event sources at
/// once: outbound output events, inbound client messages, and the
/// session's status watch, which lets the server close the connection
/// when background work drives the session to a terminal status.
async fn handle_session_ws(socket: WebSocket, session_id: String, state: AnalysisState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(mut status_rx) = state.manager.watch_status(&session_id).await else {
        tracing::warn!(session_id = %session_id, "Realtime client for unknown session");
        let message = ServerMessage::Error {
            message: "Session not found".to_string(),
        };
        let _ = send_message(&mut ws_sender, &message).await;
        return;
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.manager.outputs().set_subscriber(&session_id, tx).await;

    tracing::info!(session_id = %session_id, "Realtime client connected");

    loop {
        tokio::select! {
            event = rx.recv() => {
                // A closed channel means a newer connection took over
                let Some(event) = event else { break };
                if !forward_event(&mut ws_sender, &state, &session_id, event).await {
                    break;
                }
            }
            inbound = ws_receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Cancel) => {
                                if let Err(e) = state.manager.cancel(&session_id).await {
                                    tracing::warn!(
                                        session_id = %session_id,
                                        "Cancel from client failed: {}",
                                        e
                                    );
                                }
                                let _ = send_message(&mut ws_sender, &ServerMessage::Cancelled).await;
                                break;
                            }
                            Err(e) => {
                                let preview = &text[..text.len().min(200)];
                                tracing::warn!(
                                    session_id = %session_id,
                                    "Invalid client message: {} (raw: {})",
                                    e,
                                    preview
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(session_id = %session_id, "WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
            reached = async {
                status_rx.wait_for(|status| status.is_terminal()).await.is_ok()
            } => {
                // The watch borrow is confined to the async block above, so no
                // non-Send guard crosses the awaits below.
                if reached {
                    // Deliver events queued before the terminal transition
                    while let Ok(event) = rx.try_recv() {
                        if !forward_event(&mut ws_sender, &state, &session_id, event).await {
                            break;
                        }
                    }
                }
                break;
            }
        }
    }

    state.manager.outputs().remove_subscriber(&session_id).await;
    tracing::info!(session_id = %session_id, "Realtime client disconnected");
}

/// Translate one output event into a client message and send it.
/// Returns false when the connection is gone.
async fn forward_event(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &AnalysisState,
    session_id: &str,
    event: OutputEvent,
) -> bool {
    let message = match event {
        OutputEvent::Chunk(content) => {
            // Whitespace-only lines are noise; everything else is forwarded
            // untrimmed so the client sees the output verbatim
            if content.trim().is_empty() {
                return true;
            }
            ServerMessage::Output { content }
        }
        OutputEvent::QuestionsReady(_) => {
            let items = state
                .manager
                .get_session(session_id)
                .await
                .map(|s| s.questions)
                .unwrap_or_default();
            ServerMessage::Questions { items }
        }
        OutputEvent::Completed => ServerMessage::Complete {
            files: OUTPUT_ARTIFACTS.iter().map(|f| f.to_string()).collect(),
        },
        OutputEvent::Failed(message) => ServerMessage::Error { message },
    };
    send_message(sender, &message).await
}

async fn send_message(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> bool {
    let text = serde_json::to_string(message).unwrap_or_default();
    sender.send(Message::Text(text)).await.is_ok()
}
