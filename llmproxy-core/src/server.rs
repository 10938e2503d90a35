use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::handler::{dispatch, HandlerOutcome};
use crate::model::ChatCompletionRequest;
use crate::registry::Registry;

/// How long in-flight requests get to finish on their own once shutdown is
/// requested before the listener and any remaining connections are dropped.
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

/// Shared state handed to every axum handler.
pub struct AppState {
    pub registry: Registry,
    pub routing: crate::config::RoutingCfg,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/completions", post(legacy_completions))
        .route("/health", get(health))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid request body: {e}") })),
            )
                .into_response();
        }
    };
    let created_at = request_timestamp();
    let outcome = dispatch(
        &state.registry,
        &state.routing,
        req,
        CancellationToken::new(),
        created_at,
    )
    .await;
    match outcome {
        HandlerOutcome::Success(resp) => (StatusCode::OK, Json(resp)).into_response(),
        HandlerOutcome::BadRequest(msg) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
        }
        HandlerOutcome::NoProvider => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no available provider" })),
        )
            .into_response(),
        HandlerOutcome::Upstream(msg) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": format!("upstream error: {msg}") })),
        )
            .into_response(),
        HandlerOutcome::Cancelled => StatusCode::from_u16(499)
            .unwrap_or(StatusCode::BAD_REQUEST)
            .into_response(),
    }
}

/// The legacy text-completion surface was never carried forward; callers
/// are told plainly rather than silently routed to chat completions.
async fn legacy_completions() -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({ "error": "/v1/completions is not implemented; use /v1/chat/completions" })),
    )
        .into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.registry.snapshot_health().await;
    let healthy_count = snapshot.iter().filter(|s| s.healthy).count();
    // Advisory, binary status: "degraded" only when every adapter has
    // failed its latest probe, "healthy" otherwise. There is no partial
    // state — a single working adapter is still a healthy proxy.
    let status = if healthy_count == 0 { "degraded" } else { "healthy" };
    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "providers": snapshot.len(),
            "timestamp": request_timestamp(),
            "details": snapshot,
        })),
    )
        .into_response()
}

fn request_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Bind and serve until a shutdown signal arrives, then stop accepting new
/// connections, give in-flight requests up to `DRAIN_DEADLINE` to finish on
/// their own, and force-close anything still outstanding after that.
pub async fn run(cfg: Config, registry: Registry) -> anyhow::Result<()> {
    let addr = cfg.bind_addr();
    let state = Arc::new(AppState { registry, routing: cfg.routing.clone() });
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    // `with_graceful_shutdown` stops accepting new connections the instant
    // the signal future resolves and then waits, unbounded, for in-flight
    // connections to close on their own. Racing it against a deadline timer
    // that only starts once the signal fires gives that wait a hard cap:
    // if `serve_fut` hasn't finished by then, dropping it here forcibly
    // tears down the listener and any connections still open.
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let shutdown_tx2 = shutdown_tx.clone();
    let mut drain_deadline = shutdown_tx.subscribe();

    let serve_fut = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = shutdown_tx2.send(());
    });

    tokio::select! {
        result = serve_fut => {
            result?;
        }
        _ = async move {
            let _ = drain_deadline.recv().await;
            tokio::time::sleep(DRAIN_DEADLINE).await;
        } => {
            tracing::warn!(deadline_secs = DRAIN_DEADLINE.as_secs(), "drain deadline exceeded, forcing shutdown");
        }
    }
    tracing::info!("shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
