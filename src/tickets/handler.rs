//! HTTP handlers for the tickets module

use crate::tickets::{CreateTicketRequest, TicketCreator};
use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use std::sync::Arc;

/// Shared state for ticket handlers
#[derive(Clone)]
pub struct TicketsState {
    pub creator: Arc<TicketCreator>,
}

/// Create the tickets router
pub fn tickets_router(state: TicketsState) -> Router {
    Router::new()
        .route("/api/jira/create", post(create_ticket))
        .with_state(state)
}

/// Create a tracker ticket from feature markdown.
///
/// Always responds 200 with a structured payload; failures are reported
/// in the `success`/`error` fields.
async fn create_ticket(
    State(state): State<TicketsState>,
    Json(request): Json<CreateTicketRequest>,
) -> impl IntoResponse {
    Json(state.creator.create_ticket(request).await)
}
