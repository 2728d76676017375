//! Minimal MJPEG camera server
//!
//! Run with: cargo run --example camera_server [CONFIG] [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example camera_server                          # cameras.json, 0.0.0.0:5000
//!   cargo run --example camera_server cams.json 127.0.0.1:8080
//!
//! ## Routes
//!
//! - `GET /stream/:id/:quality?motion=true`  multipart MJPEG stream (`main` or `sub`)
//! - `GET /api/motion/:id/:quality`          motion status as JSON
//! - `GET /api/cameras`                      configured cameras as JSON
//! - `GET /health`                           per-stream health as JSON
//!
//! Open `http://localhost:5000/stream/1/main?motion=true` in a browser; any
//! number of tabs share a single camera connection.
//!
//! Set `RUST_LOG=rtsp_mux=debug` for per-viewer logging.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use rtsp_mux::{AppConfig, Quality, RegistryError, StreamRegistry, MULTIPART_CONTENT_TYPE};

const DEFAULT_CONFIG: &str = "cameras.json";
const DEFAULT_BIND: &str = "0.0.0.0:5000";

/// Repeat the last frame this often while a camera is down
const RESEND_AFTER: Duration = Duration::from_secs(2);

#[derive(Clone)]
struct AppState {
    registry: StreamRegistry,
    config: Arc<AppConfig>,
}

#[derive(Deserialize, Default)]
struct StreamQuery {
    motion: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let addr: SocketAddr = args.next().as_deref().unwrap_or(DEFAULT_BIND).parse()?;

    let config = AppConfig::load(&config_path)?;
    println!("Loaded {} camera(s) from {}", config.sources.len(), config_path);

    let registry = StreamRegistry::from_config(&config);
    let _cleanup = registry.spawn_cleanup_task();

    let state = AppState {
        registry: registry.clone(),
        config: Arc::new(config),
    };
    let app = Router::new()
        .route("/stream/:id/:quality", get(stream))
        .route("/api/motion/:id/:quality", get(motion_status))
        .route("/api/cameras", get(cameras))
        .route("/health", get(health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    // Retiring every handler ends the open MJPEG bodies, which lets the
    // graceful shutdown complete
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            println!("Shutting down");
            registry.shutdown().await;
        })
        .await?;

    Ok(())
}

async fn stream(
    State(state): State<AppState>,
    Path((id, quality)): Path<(String, String)>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let Some(quality) = Quality::parse(&quality) else {
        return (StatusCode::NOT_FOUND, "Unknown quality").into_response();
    };
    let motion = query
        .motion
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case("true"));

    let viewer = match state.registry.open_stream(id.as_str(), quality, motion) {
        Ok(viewer) => viewer,
        Err(RegistryError::UnknownSource(_)) => {
            return (StatusCode::NOT_FOUND, "Unknown camera").into_response()
        }
        Err(e) => return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    };

    // The body owns the viewer; hyper drops it when the client disconnects
    let parts = viewer.into_parts(RESEND_AFTER).map(Ok::<_, Infallible>);
    (
        [
            (header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

async fn motion_status(
    State(state): State<AppState>,
    Path((id, quality)): Path<(String, String)>,
) -> Response {
    match Quality::parse(&quality) {
        Some(quality) => Json(state.registry.query_motion_status(id, quality)).into_response(),
        None => (StatusCode::NOT_FOUND, "Unknown quality").into_response(),
    }
}

async fn cameras(State(state): State<AppState>) -> Response {
    Json(state.config.camera_list()).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    let streams: Vec<_> = state
        .registry
        .all_stats()
        .into_iter()
        .map(|(key, stats)| {
            json!({
                "stream": key.to_string(),
                "phase": stats.phase.as_str(),
                "online": stats.is_online(),
                "viewers": stats.viewer_count,
                "frames": stats.frames_published,
                "failures": stats.consecutive_failures,
                "motion_enabled": stats.motion.enabled,
            })
        })
        .collect();

    Json(json!({ "status": "ok", "streams": streams })).into_response()
}
