//! Dataset status and format discovery

use crate::api::ingest::arrow_stream::MAX_STREAM_PARAM;
use crate::api::{ApiError, ApiState};
use crate::remote_write::headers::extract_account_id;
use crate::Error;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path as FsPath;
use tracing::debug;

/// Stored-file summary for one dataset
#[derive(Debug, Serialize)]
pub struct DatasetStatus {
    pub dataset_name: String,
    pub status: &'static str,
    pub files_count: usize,
    pub total_bytes: u64,
    pub storage_path: String,
    /// Modification time of the newest Parquet file
    pub updated_at: Option<DateTime<Utc>>,
}

/// Report the Parquet files stored for a dataset
///
/// GET /api/v1/stream/:dataset/status
pub async fn handle_dataset_status(
    State(state): State<ApiState>,
    Path(dataset): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DatasetStatus>, ApiError> {
    let account_id = extract_account_id(&headers, &state.config.default_account);
    let dir = state
        .config
        .storage_layout()
        .dataset_dir(&account_id, &dataset)?;

    if !tokio::fs::try_exists(&dir).await.map_err(Error::from)? {
        return Err(Error::DatasetNotFound(dataset).into());
    }

    let (files_count, total_bytes, updated_at) = scan_parquet_files(&dir).await?;
    debug!(
        account_id = %account_id,
        dataset = %dataset,
        files_count,
        total_bytes,
        "Dataset status"
    );

    Ok(Json(DatasetStatus {
        dataset_name: dataset,
        status: "ready",
        files_count,
        total_bytes,
        storage_path: dir.display().to_string(),
        updated_at,
    }))
}

async fn scan_parquet_files(dir: &FsPath) -> crate::Result<(usize, u64, Option<DateTime<Utc>>)> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut count = 0;
    let mut bytes = 0;
    let mut newest: Option<DateTime<Utc>> = None;

    while let Some(entry) = entries.next_entry().await? {
        let is_parquet = entry.path().extension().is_some_and(|ext| ext == "parquet");
        let meta = entry.metadata().await?;
        if !is_parquet || !meta.is_file() {
            continue;
        }
        count += 1;
        bytes += meta.len();
        if let Ok(modified) = meta.modified() {
            let modified = DateTime::<Utc>::from(modified);
            newest = Some(newest.map_or(modified, |n| n.max(modified)));
        }
    }

    Ok((count, bytes, newest))
}

/// One accepted ingestion format
#[derive(Debug, Serialize)]
pub struct FormatInfo {
    pub name: &'static str,
    pub format: &'static str,
    pub mime_types: Vec<&'static str>,
    pub description: &'static str,
    pub endpoint: &'static str,
}

/// Buffer defaults of this server and the per-request upper bounds
#[derive(Debug, Serialize)]
pub struct BufferLimits {
    pub default_batch_flush_count: usize,
    pub default_max_buffer_size_mb: usize,
    pub default_max_queue_depth: usize,
    pub max_batch_flush_count: usize,
    pub max_buffer_size_mb: usize,
    pub max_queue_depth: usize,
}

#[derive(Debug, Serialize)]
pub struct FormatsResponse {
    pub formats: Vec<FormatInfo>,
    pub buffer_config: BufferLimits,
}

/// List the accepted formats and buffer limits
///
/// GET /api/v1/stream/formats
pub async fn handle_formats(State(state): State<ApiState>) -> Json<FormatsResponse> {
    let config = &state.config;

    Json(FormatsResponse {
        formats: vec![
            FormatInfo {
                name: "Arrow IPC",
                format: "arrow",
                mime_types: vec![
                    "application/vnd.apache.arrow.stream",
                    "application/octet-stream",
                ],
                description: "Apache Arrow IPC streaming format",
                endpoint: "/api/v1/stream/{dataset}",
            },
            FormatInfo {
                name: "Prometheus Remote Write",
                format: "prometheus",
                mime_types: vec!["application/x-protobuf"],
                description: "Prometheus remote write protocol (Snappy + Protobuf)",
                endpoint: "/api/v1/stream/prometheus/{dataset}",
            },
        ],
        buffer_config: BufferLimits {
            default_batch_flush_count: config.flush_every_n_batches,
            default_max_buffer_size_mb: config.max_buffer_bytes / (1024 * 1024),
            default_max_queue_depth: config.max_queue_depth,
            max_batch_flush_count: MAX_STREAM_PARAM,
            max_buffer_size_mb: MAX_STREAM_PARAM,
            max_queue_depth: MAX_STREAM_PARAM,
        },
    })
}
