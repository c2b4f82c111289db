//! Prometheus remote-write ingestion driver
//!
//! Converts a compressed `WriteRequest` into Arrow batches and runs them
//! through the streaming ingestor, either via a temporary IPC stream file
//! (`ingest_metrics`) or straight from memory (`ingest_metrics_direct`).

use super::{ArrowIpcCodec, BatchSource, IngestRequest, IngestionMetrics, StreamingIngestor};
use crate::config::StorageLayout;
use crate::remote_write::{
    decode_write_request, statistics, validate_write_request, ConvertOptions,
    RemoteWriteConverter, WriteRequestStats,
};
use crate::Result;

use arrow_array::RecordBatch;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one remote-write ingestion
#[derive(Debug, Clone, Default, Serialize)]
pub struct PrometheusIngestResult {
    pub total_batches: u64,
    pub total_rows: u64,
    pub total_bytes: u64,
    pub files_written: usize,
    pub files: Vec<PathBuf>,
    pub duration_seconds: f64,
    /// In-memory Arrow bytes per compressed payload byte
    pub compression_ratio: f64,
    pub unique_metrics: usize,
    pub time_range: (Option<DateTime<Utc>>, Option<DateTime<Utc>>),
    pub buffer_overflows: u64,
    pub max_queue_depth: usize,
}

/// Remote-write front of the streaming ingestor
pub struct PrometheusIngestor {
    ingestor: Arc<StreamingIngestor>,
    layout: StorageLayout,
}

impl PrometheusIngestor {
    pub fn new(ingestor: Arc<StreamingIngestor>, layout: StorageLayout) -> Self {
        Self { ingestor, layout }
    }

    pub fn storage_layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Ingest one payload through a temporary Arrow IPC stream file. The
    /// temporary file is removed on every exit path.
    pub async fn ingest_metrics(
        &self,
        account_id: &str,
        dataset_name: &str,
        payload: Bytes,
        options: ConvertOptions,
    ) -> Result<PrometheusIngestResult> {
        info!(
            account_id,
            dataset = dataset_name,
            bytes = payload.len(),
            "Starting Prometheus ingestion"
        );
        let result = self
            .ingest_via_file(account_id, dataset_name, payload, options)
            .await;
        self.finish(result)
    }

    /// Ingest one payload by feeding converted batches straight into the
    /// ingestor's buffer, without a temporary file.
    pub async fn ingest_metrics_direct(
        &self,
        account_id: &str,
        dataset_name: &str,
        payload: Bytes,
        options: ConvertOptions,
    ) -> Result<PrometheusIngestResult> {
        info!(
            account_id,
            dataset = dataset_name,
            bytes = payload.len(),
            "Starting direct Prometheus ingestion"
        );
        let result = self
            .ingest_from_memory(account_id, dataset_name, payload, options)
            .await;
        self.finish(result)
    }

    async fn ingest_via_file(
        &self,
        account_id: &str,
        dataset_name: &str,
        payload: Bytes,
        options: ConvertOptions,
    ) -> Result<PrometheusIngestResult> {
        let start_time = Instant::now();
        let payload_len = payload.len();
        let storage_root = self.layout.dataset_dir(account_id, dataset_name)?;

        let Some((batches, stats)) = convert_payload(payload, options).await? else {
            return Ok(PrometheusIngestResult::default());
        };

        let schema = batches[0].schema();
        let temp = tempfile::Builder::new()
            .prefix("prometheus_")
            .suffix(".arrow")
            .tempfile()?;
        ArrowIpcCodec::new()
            .write_stream(futures::stream::iter(batches), temp.path())
            .await?;
        debug!(path = %temp.path().display(), "Wrote temporary IPC stream");

        let request = IngestRequest::new(
            account_id,
            dataset_name,
            BatchSource::IpcFile(temp.path().to_path_buf()),
            storage_root,
        )
        .with_expected_schema(schema);
        let metrics = self.ingestor.ingest(request).await?;

        // `temp` drops on return and deletes the file
        Ok(build_result(metrics, &stats, payload_len, start_time))
    }

    async fn ingest_from_memory(
        &self,
        account_id: &str,
        dataset_name: &str,
        payload: Bytes,
        options: ConvertOptions,
    ) -> Result<PrometheusIngestResult> {
        let start_time = Instant::now();
        let payload_len = payload.len();
        let storage_root = self.layout.dataset_dir(account_id, dataset_name)?;

        let Some((batches, stats)) = convert_payload(payload, options).await? else {
            return Ok(PrometheusIngestResult::default());
        };

        let request = IngestRequest::new(
            account_id,
            dataset_name,
            BatchSource::Batches(batches),
            storage_root,
        );
        let metrics = self.ingestor.ingest(request).await?;
        Ok(build_result(metrics, &stats, payload_len, start_time))
    }

    fn finish(&self, result: Result<PrometheusIngestResult>) -> Result<PrometheusIngestResult> {
        match &result {
            Ok(r) => {
                super::telemetry::record_remote_write("success", r.total_rows);
                info!(
                    rows = r.total_rows,
                    files_written = r.files_written,
                    duration_seconds = r.duration_seconds,
                    "Prometheus ingestion complete"
                );
            }
            Err(e) => {
                let outcome = if e.is_client_error() { "rejected" } else { "failure" };
                super::telemetry::record_remote_write(outcome, 0);
                warn!(error = %e, "Prometheus ingestion failed");
            }
        }
        result
    }
}

/// Decode, validate and convert on a blocking worker. `None` when the
/// request produced no rows.
async fn convert_payload(
    payload: Bytes,
    options: ConvertOptions,
) -> Result<Option<(Vec<RecordBatch>, WriteRequestStats)>> {
    tokio::task::spawn_blocking(move || -> Result<Option<(Vec<RecordBatch>, WriteRequestStats)>> {
        let request = decode_write_request(&payload)?;
        validate_write_request(&request)?;

        let stats = statistics(&request);
        let batches = RemoteWriteConverter::new(options).convert(&request)?;
        if batches.is_empty() {
            warn!("No batches generated from write request");
            return Ok(None);
        }
        Ok(Some((batches, stats)))
    })
    .await?
}

fn build_result(
    metrics: IngestionMetrics,
    stats: &WriteRequestStats,
    payload_len: usize,
    start_time: Instant,
) -> PrometheusIngestResult {
    let to_utc = |ms: Option<i64>| ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single());

    PrometheusIngestResult {
        total_batches: metrics.total_batches,
        total_rows: metrics.total_rows,
        total_bytes: metrics.total_bytes,
        files_written: metrics.files_written,
        files: metrics.files,
        duration_seconds: start_time.elapsed().as_secs_f64(),
        compression_ratio: if payload_len > 0 {
            metrics.total_bytes as f64 / payload_len as f64
        } else {
            0.0
        },
        unique_metrics: stats.unique_metrics,
        time_range: (to_utc(stats.min_timestamp), to_utc(stats.max_timestamp)),
        buffer_overflows: metrics.buffer_overflows,
        max_queue_depth: metrics.max_queue_depth,
    }
}
