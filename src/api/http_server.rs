// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP server: router, shared state, and startup.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::detect::detect_handler;
use crate::config::NodeConfig;
use crate::detector::InferencePool;

/// Response header carrying the detection summary on annotated responses.
pub const DETECTIONS_HEADER: &str = "x-detections";

/// Shared state handed to every handler. The pool and config are immutable
/// after startup.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<InferencePool>,
    pub config: Arc<NodeConfig>,
}

pub fn build_router(state: AppState) -> Router {
    // The framework limit sits above our ceiling so the 413 comes from this
    // crate's own check, with the taxonomy's error body.
    let body_limit = state.config.max_upload_bytes + 1024 * 1024;

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/detect", post(detect_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &NodeConfig) -> CorsLayer {
    let expose = [HeaderName::from_static(DETECTIONS_HEADER)];

    if config.permissive_cors() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(expose);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .expose_headers(expose)
}

/// Bind and serve until ctrl-c.
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.bind_addr;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

async fn healthz_handler() -> impl IntoResponse {
    axum::response::Json(json!({"status": "ok"}))
}
