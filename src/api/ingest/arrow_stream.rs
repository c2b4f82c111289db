//! Arrow IPC stream receiver

use crate::api::{ApiError, ApiState};
use crate::ingester::{BatchSource, IngestRequest};
use crate::remote_write::headers::extract_account_id;
use crate::Error;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::debug;

/// Largest value accepted for each per-request buffer setting
pub const MAX_STREAM_PARAM: usize = 1000;

/// Per-request overrides of the cadence and buffer caps
#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    pub batch_flush_count: Option<usize>,
    pub max_buffer_size_mb: Option<usize>,
    pub max_queue_depth: Option<usize>,
}

fn check_range(name: &str, value: Option<usize>) -> Result<Option<usize>, Error> {
    match value {
        Some(v) if !(1..=MAX_STREAM_PARAM).contains(&v) => Err(Error::Protocol(format!(
            "{} must be between 1 and {}, got {}",
            name, MAX_STREAM_PARAM, v
        ))),
        other => Ok(other),
    }
}

/// Handle an Arrow IPC stream upload
///
/// POST /api/v1/stream/:dataset?batch_flush_count=&max_buffer_size_mb=&max_queue_depth=
/// Content-Type: application/vnd.apache.arrow.stream
pub async fn handle_arrow_stream(
    State(state): State<ApiState>,
    Path(dataset): Path<String>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let flush_every = check_range("batch_flush_count", params.batch_flush_count)?;
    let buffer_mb = check_range("max_buffer_size_mb", params.max_buffer_size_mb)?;
    let queue_depth = check_range("max_queue_depth", params.max_queue_depth)?;

    if body.is_empty() {
        return Err(Error::Protocol("Request body is empty".to_string()).into());
    }

    let account_id = extract_account_id(&headers, &state.config.default_account);
    let storage_root = state
        .config
        .storage_layout()
        .dataset_dir(&account_id, &dataset)?;

    // The codec reads from a file; spool the body to one first
    let temp = tempfile::Builder::new()
        .prefix("upload_")
        .suffix(".arrows")
        .tempfile()
        .map_err(Error::from)?;
    tokio::fs::write(temp.path(), &body)
        .await
        .map_err(Error::from)?;
    debug!(path = %temp.path().display(), bytes = body.len(), "Spooled IPC upload");

    let mut request = IngestRequest::new(
        account_id,
        dataset,
        BatchSource::IpcFile(temp.path().to_path_buf()),
        storage_root,
    );
    if let Some(n) = flush_every {
        request = request.with_flush_every(n);
    }
    if buffer_mb.is_some() || queue_depth.is_some() {
        let defaults = state.ingestor.config();
        request = request.with_buffer_limits(
            buffer_mb.map_or(defaults.max_buffer_size_bytes, |mb| mb * 1024 * 1024),
            queue_depth.unwrap_or(defaults.max_queue_depth),
        );
    }
    let metrics = state.ingestor.ingest(request).await?;

    Ok(Json(metrics))
}
