//! HTTP binding
//!
//! - `GET /api` - read request from query parameters
//! - `POST /api` - write request from a JSON body
//! - `GET /health` - liveness, no authentication
//!
//! Handlers only decode and hand off; the dispatcher does the rest on the
//! blocking pool because engine calls are synchronous.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::dispatch::{Dispatcher, Envelope, ReadRequest};
use crate::error::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Build the application router.
pub fn create_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/api", get(read_handler).post(write_handler))
        .route("/health", get(health_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(dispatcher)
}

async fn read_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    query: Result<Query<ReadRequest>, QueryRejection>,
) -> Envelope {
    let Query(req) = match query {
        Ok(q) => q,
        Err(rejection) => {
            return ApiError::invalid_input(format!("Invalid query: {}", rejection.body_text()))
                .into()
        }
    };
    run_blocking(move || dispatcher.handle_read(&req)).await
}

async fn write_handler(State(dispatcher): State<Arc<Dispatcher>>, body: Bytes) -> Envelope {
    run_blocking(move || dispatcher.handle_write_body(&body)).await
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn run_blocking<F>(work: F) -> Envelope
where
    F: FnOnce() -> Envelope + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(error = %e, "dispatcher task failed");
            ApiError::internal_error("Request handler failed").into()
        }
    }
}
