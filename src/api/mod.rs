//! HTTP ingestion API
//!
//! - `POST /api/v1/stream/prometheus/:dataset`: Prometheus remote-write
//! - `POST /api/v1/stream/:dataset`: Arrow IPC stream body
//! - `GET /api/v1/stream/:dataset/status`: files stored for a dataset
//! - `GET /api/v1/stream/formats`: accepted formats and buffer limits
//! - `GET /health`

pub mod ingest;
pub mod status;
mod telemetry;

use crate::catalog::CatalogClient;
use crate::config::IngestConfig;
use crate::ingester::{PrometheusIngestor, StreamingIngestor};
use crate::Error;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// Build the HTTP API router
pub fn build_http_router(state: ApiState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let body_limit = state.config.max_request_bytes;

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Prometheus Remote Write
        .route(
            "/api/v1/stream/prometheus/:dataset",
            post(ingest::prometheus::handle_remote_write),
        )

        // Arrow IPC stream
        .route(
            "/api/v1/stream/:dataset",
            post(ingest::arrow_stream::handle_arrow_stream),
        )

        // Dataset and format information
        .route("/api/v1/stream/formats", get(status::handle_formats))
        .route("/api/v1/stream/:dataset/status", get(status::handle_dataset_status))

        // State
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(telemetry::http_observability_middleware))
}

/// Shared API state
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<IngestConfig>,
    pub ingestor: Arc<StreamingIngestor>,
    pub prometheus: Arc<PrometheusIngestor>,
}

impl ApiState {
    pub fn new(config: IngestConfig, catalog: Option<Arc<dyn CatalogClient>>) -> Self {
        let ingestor = Arc::new(StreamingIngestor::new(config.ingester_config(), catalog));
        let prometheus = Arc::new(PrometheusIngestor::new(
            ingestor.clone(),
            config.storage_layout(),
        ));
        Self {
            config: Arc::new(config),
            ingestor,
            prometheus,
        }
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    error: String,
}

/// Error response: 404 for unknown datasets, 400 for other problems with
/// the request, 500 otherwise
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if matches!(self.0, Error::DatasetNotFound(_)) {
            StatusCode::NOT_FOUND
        } else if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            error!(error = %self.0, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = ErrorBody {
            status: "error",
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
