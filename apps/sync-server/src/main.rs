//! Document sync server for the trip planner.
//! Serves path-addressed JSON documents over WebSocket with push
//! subscriptions: every write fans the full latest snapshot out to all
//! subscribers of the path, the writer included.

mod state;
mod ws;

use axum::{routing::get, Json, Router};
use serde_json::json;
use state::AppState;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:8737";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sync_server=debug,sync=debug")),
        )
        .init();

    let state = AppState::new();

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/health", get(health))
        .route("/api/stats", get(stats))
        // CORS for local development
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = std::env::var("SYNC_SERVER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    info!("Sync server listening on http://{}", addr);
    info!("  GET /ws          - document subscription socket");
    info!("  GET /api/health  - liveness probe");
    info!("  GET /api/stats   - document and connection counts");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn stats(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<serde_json::Value> {
    Json(json!({
        "documents": state.store.doc_count(),
        "connections": state.connection_count(),
        "started_at": state.started_at,
    }))
}
