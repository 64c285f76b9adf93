//! Network-facing request surface for the StreamChannel sequencer.
//!
//! Every handler is a thin dispatcher: parse the request (rejecting
//! `MalformedRequest` before any lock is taken), delegate to `State` or
//! `Settlement`, translate the resulting domain error into a response via
//! `AppError`.

mod dto;
mod error;
mod handlers;
mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use sequencer_settlement::Settlement;
use sequencer_state::State as ChannelState;
use serde_json::json;
use tower::{
    limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer, BoxError, ServiceBuilder,
};
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

pub use error::AppError;
use rate_limit::{rate_limit_middleware, IpLimiter};

pub struct AppState {
    pub state: Arc<ChannelState>,
    pub settlement: Arc<Settlement>,
}

/// Middleware and routing configuration, read once at startup from `Config`.
pub struct ApiLimits {
    pub rate_limit_rps: u32,
    pub rate_limit_burst: u32,
    pub body_limit_bytes: usize,
    pub concurrency_limit: usize,
    pub request_timeout: Duration,
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            rate_limit_rps: 20,
            rate_limit_burst: 40,
            body_limit_bytes: 64 * 1024,
            concurrency_limit: 256,
            request_timeout: Duration::from_secs(10),
        }
    }
}

async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, Json(json!({ "error": "Timeout:request timed out" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": format!("Overloaded:{err}") })))
    }
}

/// Builds the full `axum::Router`, including the middleware stack. `.layer`
/// calls apply in last-added-is-outermost order, so the stack here runs,
/// outer to inner: body-size limit, request tracing, panic-catching, then
/// the fallible trio (timeout, concurrency cap, load shedding) wrapped in
/// `HandleErrorLayer` so it stays infallible from axum's perspective. Rate
/// limiting applies only to the mutating/validating endpoints — `/settle`
/// and `/validate` — not to reads or `/health`.
pub fn router(app_state: Arc<AppState>, limits: ApiLimits) -> Router {
    let limiter = IpLimiter::new(limits.rate_limit_rps, limits.rate_limit_burst);

    let rate_limited = Router::new()
        .route("/settle", post(handlers::settle_handler))
        .route("/validate", post(handlers::validate_handler))
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

    Router::new()
        .route("/channel/seed", post(handlers::seed_handler))
        .route("/channel/:id", get(handlers::get_channel_handler))
        .route("/channel/finalize", post(handlers::finalize_handler))
        .route("/channels/by-owner/:addr", get(handlers::list_by_owner_handler))
        .route("/health", get(handlers::health_handler))
        .merge(rate_limited)
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(limits.concurrency_limit))
                .layer(TimeoutLayer::new(limits.request_timeout)),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(limits.body_limit_bytes))
}

/// Serves `router` on `addr` until a graceful-shutdown signal fires.
/// In-flight requests — including a `settle` holding a channel lock across
/// its DB write — are allowed to complete before the listener exits.
pub async fn serve(
    addr: SocketAddr,
    app: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "sequencer API listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
}
