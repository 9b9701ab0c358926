//! HTTP routes and handlers

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use recordgate_core::Error;
use recordgate_reader::DataReader;
use serde::Deserialize;
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::state::{AppState, ReadRequest};

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Seconds a refused client is told to wait
const RETRY_AFTER_SECS: &str = "1";

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/stats", get(stats))
        .route("/audit", get(audit))
        .route("/read", post(read))
        .fallback(fallback)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let capacity = state.reader.capacity();
    Json(json!({
        "reader": state.reader.descriptor(),
        "in_flight": capacity.in_flight(),
        "max_in_flight": capacity.max_in_flight(),
        "totals": state.metrics.snapshot(),
    }))
}

#[derive(Debug, Deserialize)]
struct AuditParams {
    #[serde(default = "default_audit_limit")]
    limit: usize,
}

fn default_audit_limit() -> usize {
    20
}

async fn audit(State(state): State<AppState>, Query(params): Query<AuditParams>) -> Response {
    Json(state.audit_summary(params.limit)).into_response()
}

/// Read a resource under the policies covering it
async fn read(State(state): State<AppState>, Json(req): Json<ReadRequest>) -> Result<Response, AppError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    info!(
        request_id = %request_id,
        resource = %req.resource,
        user = %req.user,
        purpose = %req.purpose,
        "Received read request"
    );

    let result = tokio::task::spawn_blocking(move || state.read(req))
        .await
        .map_err(|e| AppError::Internal(format!("read task failed: {}", e)))??;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/x-ndjson"));
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert("x-request-id", value);
    }
    headers.insert("x-records-processed", HeaderValue::from(result.records_processed));
    headers.insert("x-records-returned", HeaderValue::from(result.records_returned));
    if let Some(message) = result.message.as_deref() {
        if let Ok(value) = HeaderValue::from_str(message) {
            headers.insert("x-policy-message", value);
        }
    }

    Ok((StatusCode::OK, headers, bytes::Bytes::from(result.body)).into_response())
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Error handling
#[derive(Debug)]
enum AppError {
    Reader(Error),
    Internal(String),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Reader(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            AppError::Reader(e @ Error::NoCapacity { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "no_capacity", e.to_string())
            }
            AppError::Reader(e @ Error::Read { .. }) => (StatusCode::NOT_FOUND, "read_error", e.to_string()),
            AppError::Reader(e @ Error::Config(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", e.to_string())
            }
            AppError::Reader(e @ Error::Serialisation(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "serialisation_error", e.to_string())
            }
            AppError::Reader(e) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone()),
        };

        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!("Read failed: {}", message);
        } else {
            warn!("Read rejected: {}", message);
        }

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}
