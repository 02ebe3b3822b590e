//! HTTP surface of the session layer.
//!
//! Public routes: `POST /v1/auth/login`, `GET /health`. Everything under
//! [`require_session`] needs a valid session token (bearer or cookie).

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware::from_fn,
    routing::{get, post},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;

pub mod auth;
pub mod cookie;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use middleware::require_session;
pub use state::AppState;

/// Build the router with every route and layer.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/v1/auth/session", get(handlers::session))
        .route("/v1/auth/logout", post(handlers::logout))
        .route(
            "/v1/auth/sessions",
            get(handlers::list_sessions).delete(handlers::revoke_sessions),
        )
        .route_layer(from_fn(require_session));

    Router::new()
        .route("/health", get(handlers::health).options(handlers::health))
        .route("/v1/auth/login", post(handlers::login))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<AppState>, sweep_interval: Option<Duration>) -> Result<()> {
    if let Some(every) = sweep_interval {
        spawn_sweeper(state.clone(), every);
    }

    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

/// Periodically reap expired records that nobody addresses anymore.
fn spawn_sweeper(state: Arc<AppState>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = state.sessions().sweep_expired().await {
                error!("Session sweep failed: {err}");
            }
        }
    });
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
