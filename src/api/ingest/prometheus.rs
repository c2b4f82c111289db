//! Prometheus Remote Write receiver
//!
//! Implements the Prometheus Remote Write protocol with Snappy compression.

use crate::api::{ApiError, ApiState};
use crate::remote_write::headers::{
    extract_account_id, response_headers, validate_headers, validate_request_size,
};
use crate::Error;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

/// Per-request overrides of the conversion settings
#[derive(Debug, Default, Deserialize)]
pub struct RemoteWriteParams {
    pub batch_size: Option<usize>,
    pub include_metadata: Option<bool>,
}

/// Handle Prometheus Remote Write requests
///
/// POST /api/v1/stream/prometheus/:dataset
/// Content-Encoding: snappy
/// Content-Type: application/x-protobuf
pub async fn handle_remote_write(
    State(state): State<ApiState>,
    Path(dataset): Path<String>,
    Query(params): Query<RemoteWriteParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Envelope
    validate_headers(&headers)?;
    validate_request_size(body.len(), state.config.max_request_bytes)?;
    let account_id = extract_account_id(&headers, &state.config.default_account);

    let mut options = state.config.convert_options();
    if let Some(batch_size) = params.batch_size {
        if batch_size == 0 {
            return Err(Error::Protocol("batch_size must be at least 1".to_string()).into());
        }
        options.batch_size = batch_size;
    }
    if let Some(include_metadata) = params.include_metadata {
        options.include_metadata = include_metadata;
    }

    // 2. Decode, convert and ingest
    let bytes_received = body.len();
    let result = state
        .prometheus
        .ingest_metrics(&account_id, &dataset, body, options)
        .await?;

    Ok((response_headers(bytes_received), Json(result)))
}
