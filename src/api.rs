//! Unified API router for the workbench server
//!
//! Merges the module routers into a single axum `Router` with CORS and a
//! static-file fallback for the bundled frontend. API routes are mounted
//! before the fallback so they always take precedence.
//!
//! ## Endpoint Map
//!
//! | Prefix                   | Module   | Description                        |
//! |--------------------------|----------|------------------------------------|
//! | `/health`                | api      | Load balancer health probe         |
//! | `/api/analyze/*`         | analysis | Sessions, answers, cancel, status  |
//! | `/api/analyze/ws/:id`    | analysis | Realtime session WebSocket         |
//! | `/api/jira/*`            | tickets  | Ticket creation                    |
//! | `/*`                     | static   | Bundled frontend (fallback)        |

use crate::analysis::{analysis_router, AnalysisState};
use crate::config::ServerConfig;
use crate::tickets::{tickets_router, TicketsState};
use axum::{
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

/// Build the complete workbench HTTP application
pub fn build_app(
    analysis_state: AnalysisState,
    tickets_state: TicketsState,
    server_config: &ServerConfig,
) -> Router {
    let cors = build_cors(&server_config.cors_origins);

    let mut app = Router::new()
        .route("/health", get(health_check))
        .merge(analysis_router(analysis_state))
        .merge(tickets_router(tickets_state));

    if let Some(static_dir) = &server_config.static_dir {
        if static_dir.is_dir() {
            app = app.fallback_service(
                ServeDir::new(static_dir).append_index_html_on_directories(true),
            );
        } else {
            tracing::debug!(
                dir = %static_dir.display(),
                "Static directory missing, frontend not served"
            );
        }
    }

    app.layer(cors)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(parsed)
    }
}
