//! Router assembly, wire envelopes, and the workflow recovery wrapper.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use axum::{
    Json, Router,
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use snowlink_core::SharedClock;
use uuid::Uuid;

use crate::client::SharedClientFactory;
use crate::handlers;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub clients: SharedClientFactory,
    pub clock: SharedClock,
}

/// Wire error entry.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}

/// Builds the failure envelope `{"errors":[{code,message}]}`.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let error = ApiError {
        code: status.as_u16(),
        message: message.into(),
    };
    (status, Json(json!({ "errors": [error] }))).into_response()
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/check-external-entity", post(handlers::check_external_entity))
        .route("/create-entity-mapping", post(handlers::create_entity_mapping))
        .route("/create-incident", post(handlers::create_incident))
        .route("/create-sir-incident", post(handlers::create_sir_incident))
        .route("/throttle", post(handlers::throttle))
        .layer(axum::middleware::from_fn(with_request_id))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

/// Tags every response with a generated `x-request-id`.
pub async fn with_request_id(req: Request, next: Next) -> Response {
    let rid = Uuid::new_v4().to_string();
    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&rid) {
        res.headers_mut()
            .insert(HeaderName::from_static("x-request-id"), value);
    }
    res
}

/// Access credential carried out-of-band on the request.
pub fn access_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

/// Trace identifier propagated by the workflow engine.
pub fn trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-cs-traceid")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Runs a workflow handler body, converting a panic into a structured 500
/// carrying the trace identifier.
pub async fn recover_workflow<F>(url: &str, trace_id: &str, fut: F) -> Response
where
    F: Future<Output = Response>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let value = panic_value(panic);
            let backtrace = std::backtrace::Backtrace::force_capture();
            tracing::error!(
                url = %url,
                trace_id = %trace_id,
                panic = %value,
                backtrace = %backtrace,
                "recovered workflow handler panic"
            );
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal fn error: {value} (trace_id: '{trace_id}')"),
            )
        }
    }
}

fn panic_value(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
