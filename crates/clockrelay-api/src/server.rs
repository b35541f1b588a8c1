//! HTTP server configuration and request routing.
//!
//! Requests flow through middleware in order:
//! 1. Request ID generation
//! 2. Request/response logging
//! 3. Panic recovery
//! 4. Timeout enforcement (delivery timeout plus a margin)
//! 5. Body size limit (device routes only)
//! 6. Handler execution
//!
//! # Graceful Shutdown
//!
//! On SIGTERM or CTRL+C the server stops accepting connections and lets
//! in-flight device requests finish their downstream call.

use std::{any::Any, net::SocketAddr};

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{handlers, AppState};

/// Creates the Axum router with all routes and middleware.
///
/// Routes:
/// - `GET /` liveness text
/// - `GET /health` JSON health report
/// - `POST /heartbeat` device keep-alive
/// - `POST {webhook_path}` and `POST {webhook_path}/{device_id}` event ingest
/// - `POST /{device_id}-webhook` event ingest, through the fallback
/// - any other `GET` answers with the liveness text
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use clockrelay_api::{create_router, AppState, Config};
/// use clockrelay_core::RealClock;
///
/// fn build(config: &Config) -> anyhow::Result<axum::Router> {
///     let state = AppState::from_config(config, Arc::new(RealClock::new()))?;
///     Ok(create_router(state))
/// }
/// ```
pub fn create_router(state: AppState) -> Router {
    let settings = &state.settings;
    let webhook_path = settings.webhook_path.trim_end_matches('/').to_string();
    let device_path = format!("{webhook_path}/{{device_id}}");

    let service_routes = Router::new()
        .route("/", get(handlers::liveness).fallback(handlers::method_not_allowed))
        .route("/health", get(handlers::health_check).fallback(handlers::method_not_allowed))
        .route(
            "/heartbeat",
            post(handlers::heartbeat)
                .get(handlers::liveness)
                .fallback(handlers::method_not_allowed),
        );

    let device_routes = Router::new()
        .route(
            &webhook_path,
            post(handlers::receive_event)
                .get(handlers::liveness)
                .fallback(handlers::method_not_allowed),
        )
        .route(
            &device_path,
            post(handlers::receive_device_event)
                .get(handlers::liveness)
                .fallback(handlers::method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(settings.max_body_bytes));

    Router::new()
        .merge(service_routes)
        .merge(device_routes)
        .fallback(handlers::fallback)
        .layer(TimeoutLayer::new(settings.request_timeout))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Middleware to inject request ID into all responses.
///
/// Adds X-Request-Id header for correlating device retries with logs.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Turns a handler panic into a 500 the device can retry on.
fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    error!(detail, "Request handler panicked");

    (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": "internal_error" })))
        .into_response()
}

/// Starts the HTTP server with graceful shutdown support.
///
/// # Errors
///
/// Returns `std::io::Error` if the address cannot be bound.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use clockrelay_api::{start_server, AppState, Config};
/// use clockrelay_core::RealClock;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = Config::load()?;
///     let state = AppState::from_config(&config, Arc::new(RealClock::new()))?;
///
///     start_server(state, config.parse_server_addr()?).await?;
///     Ok(())
/// }
/// ```
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<(), std::io::Error> {
    let webhook_path = state.settings.webhook_path.clone();
    let downstream_host = state.settings.downstream_host.clone();
    let app = create_router(state);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!(
        address = %actual_addr,
        webhook_path = %webhook_path,
        downstream_host = %downstream_host,
        "Attendance relay listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    warn!("Waiting for in-flight device requests to complete");
}
