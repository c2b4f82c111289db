//! Ingester module for arrowsink
//!
//! The ingester is responsible for:
//! - Reading batches from an Arrow IPC stream file or from memory
//! - Passing them through a bounded buffer with backpressure
//! - Flushing accumulated batches into sequentially named Parquet files
//! - Registering the written files with the catalog

mod buffer;
mod ipc;
mod parquet_writer;
mod prometheus;
mod telemetry;

pub use buffer::{
    BoundedBatchBuffer, BufferMetrics, DEFAULT_MAX_BUFFER_BYTES, DEFAULT_MAX_QUEUE_DEPTH,
};
pub use ipc::{ArrowIpcCodec, IpcBatchStream};
pub use parquet_writer::ParquetWriter;
pub use prometheus::{PrometheusIngestResult, PrometheusIngestor};

use crate::catalog::CatalogClient;
use crate::{Error, Result};

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Configuration for the ingester
#[derive(Debug, Clone)]
pub struct IngesterConfig {
    /// Byte cap of the per-run buffer
    pub max_buffer_size_bytes: usize,
    /// Batch-count cap of the per-run buffer
    pub max_queue_depth: usize,
    /// How long a producer waits for buffer room before giving up
    pub put_timeout: Duration,
    /// Batches accumulated per Parquet file
    pub flush_every_n_batches: usize,
    /// Fail the run when catalog registration fails
    pub require_catalog: bool,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            max_buffer_size_bytes: DEFAULT_MAX_BUFFER_BYTES,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            put_timeout: Duration::from_secs(30),
            flush_every_n_batches: 10,
            require_catalog: false,
        }
    }
}

/// Where the batches of one ingestion run come from
#[derive(Debug, Clone)]
pub enum BatchSource {
    /// An Arrow IPC stream file on local disk
    IpcFile(PathBuf),
    /// Batches already in memory, all sharing one schema
    Batches(Vec<RecordBatch>),
}

impl BatchSource {
    fn describe(&self) -> String {
        match self {
            BatchSource::IpcFile(path) => path.display().to_string(),
            BatchSource::Batches(batches) => format!("{} in-memory batches", batches.len()),
        }
    }
}

/// One ingestion run
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Account (tenant) the data belongs to; used for logging only
    pub account_id: String,
    /// Dataset the files are registered under
    pub dataset_name: String,
    /// Batch source
    pub source: BatchSource,
    /// Directory the Parquet files are written into
    pub storage_root: PathBuf,
    /// Schema the source must match
    pub expected_schema: Option<SchemaRef>,
    /// Overrides the configured flush cadence
    pub flush_every_n_batches: Option<usize>,
    /// Overrides the configured buffer byte cap
    pub max_buffer_size_bytes: Option<usize>,
    /// Overrides the configured buffer depth cap
    pub max_queue_depth: Option<usize>,
}

impl IngestRequest {
    /// Create a request that uses the ingestor's configured cadence and
    /// buffer caps
    pub fn new(
        account_id: impl Into<String>,
        dataset_name: impl Into<String>,
        source: BatchSource,
        storage_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            dataset_name: dataset_name.into(),
            source,
            storage_root: storage_root.into(),
            expected_schema: None,
            flush_every_n_batches: None,
            max_buffer_size_bytes: None,
            max_queue_depth: None,
        }
    }

    /// Require the source to carry exactly `schema`
    pub fn with_expected_schema(mut self, schema: SchemaRef) -> Self {
        self.expected_schema = Some(schema);
        self
    }

    /// Write one Parquet file per `batches` buffered batches
    pub fn with_flush_every(mut self, batches: usize) -> Self {
        self.flush_every_n_batches = Some(batches);
        self
    }

    /// Bound this run's buffer by `max_bytes` and `max_depth` instead of
    /// the configured caps
    pub fn with_buffer_limits(mut self, max_bytes: usize, max_depth: usize) -> Self {
        self.max_buffer_size_bytes = Some(max_bytes);
        self.max_queue_depth = Some(max_depth);
        self
    }
}

/// Summary of a completed ingestion run
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestionMetrics {
    pub total_batches: u64,
    pub total_rows: u64,
    pub total_bytes: u64,
    pub buffer_overflows: u64,
    pub max_queue_depth: usize,
    pub files_written: usize,
    pub files: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Streaming ingestor: producer and consumer around a bounded buffer
pub struct StreamingIngestor {
    /// Configuration
    config: IngesterConfig,
    /// Catalog notified after a successful run
    catalog: Option<Arc<dyn CatalogClient>>,
    /// Parquet writer
    parquet_writer: ParquetWriter,
    /// Sequence for Parquet file names, unique per ingestor
    file_counter: AtomicU64,
}

impl StreamingIngestor {
    /// Create a new ingestor
    pub fn new(config: IngesterConfig, catalog: Option<Arc<dyn CatalogClient>>) -> Self {
        Self {
            config,
            catalog,
            parquet_writer: ParquetWriter::new(),
            file_counter: AtomicU64::new(0),
        }
    }

    /// Configuration this ingestor was built with
    pub fn config(&self) -> &IngesterConfig {
        &self.config
    }

    /// Run one ingestion to completion.
    ///
    /// Files flushed before a failure stay on disk; a failed run may have
    /// made a prefix of the source durable.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestionMetrics> {
        let started_at = Utc::now();
        let start_time = Instant::now();

        let flush_every = request
            .flush_every_n_batches
            .unwrap_or(self.config.flush_every_n_batches);
        if flush_every == 0 {
            return Err(Error::Config(
                "flush_every_n_batches must be at least 1".to_string(),
            ));
        }
        let max_buffer_bytes = request
            .max_buffer_size_bytes
            .unwrap_or(self.config.max_buffer_size_bytes);
        let max_queue_depth = request
            .max_queue_depth
            .unwrap_or(self.config.max_queue_depth);
        if max_buffer_bytes == 0 || max_queue_depth == 0 {
            return Err(Error::Config(
                "buffer limits must be at least 1".to_string(),
            ));
        }

        if let BatchSource::IpcFile(path) = &request.source {
            if tokio::fs::metadata(path).await.is_err() {
                return Err(Error::NotFound(path.clone()));
            }
        }

        tokio::fs::create_dir_all(&request.storage_root)
            .await
            .map_err(|e| {
                Error::Streaming(format!(
                    "Failed to create storage root {}: {}",
                    request.storage_root.display(),
                    e
                ))
            })?;
        self.skip_existing_files(&request.storage_root).await?;

        info!(
            account_id = %request.account_id,
            dataset = %request.dataset_name,
            source = %request.source.describe(),
            flush_every,
            max_buffer_bytes,
            max_queue_depth,
            "Starting streaming ingestion"
        );

        let buffer = BoundedBatchBuffer::new(max_buffer_bytes, max_queue_depth);

        let (produced, consumed) = tokio::join!(
            self.produce(&buffer, request.source, request.expected_schema),
            self.consume(&buffer, &request.storage_root, flush_every),
        );

        let files = match (produced, consumed) {
            (Ok(()), Ok(files)) => files,
            (Err(e), consumed) => {
                // A closed buffer on the producer side means the consumer quit first
                let cause = match (e, consumed) {
                    (Error::BufferClosed, Err(consumer_err)) => consumer_err,
                    (e, _) => e,
                };
                return Err(self.fail(&request.dataset_name, cause));
            }
            (Ok(()), Err(e)) => return Err(self.fail(&request.dataset_name, e)),
        };

        if !files.is_empty() {
            self.register_files(&request.dataset_name, &request.storage_root)
                .await?;
        }

        let buffer_metrics = buffer.metrics();
        let metrics = IngestionMetrics {
            total_batches: buffer_metrics.total_batches,
            total_rows: buffer_metrics.total_rows,
            total_bytes: buffer_metrics.total_bytes,
            buffer_overflows: buffer_metrics.buffer_overflows,
            max_queue_depth: buffer_metrics.max_queue_depth,
            files_written: files.len(),
            files,
            started_at,
            duration_seconds: start_time.elapsed().as_secs_f64(),
        };

        telemetry::record_ingest_outcome("success");
        info!(
            dataset = %request.dataset_name,
            total_batches = metrics.total_batches,
            total_rows = metrics.total_rows,
            files_written = metrics.files_written,
            duration_seconds = metrics.duration_seconds,
            "Streaming ingestion complete"
        );

        Ok(metrics)
    }

    /// Feed the buffer from `source`, closing it on every exit path
    async fn produce(
        &self,
        buffer: &BoundedBatchBuffer,
        source: BatchSource,
        expected_schema: Option<SchemaRef>,
    ) -> Result<()> {
        let _close = CloseOnDrop(buffer);
        let timeout = Some(self.config.put_timeout);

        match source {
            BatchSource::IpcFile(path) => {
                let codec = match expected_schema {
                    Some(schema) => ArrowIpcCodec::with_expected_schema(schema),
                    None => ArrowIpcCodec::new(),
                };
                let mut stream = codec.read_stream(&path).await?;
                ArrowIpcCodec::validate_schema(&stream.schema())?;

                while let Some(batch) = stream.next().await {
                    buffer.put(batch?, timeout).await?;
                }
            }
            BatchSource::Batches(batches) => {
                let schema = match (expected_schema, batches.first()) {
                    (Some(schema), _) => schema,
                    (None, Some(first)) => first.schema(),
                    (None, None) => return Ok(()),
                };
                ArrowIpcCodec::validate_schema(&schema)?;

                for (index, batch) in batches.into_iter().enumerate() {
                    if !ipc::same_schema(&schema, &batch.schema()) {
                        return Err(Error::SchemaValidation(format!(
                            "Schema mismatch in batch {}. Expected: {:?}, Got: {:?}",
                            index,
                            schema,
                            batch.schema()
                        )));
                    }
                    buffer.put(batch, timeout).await?;
                }
            }
        }

        debug!("Producer finished, draining buffer");
        Ok(())
    }

    /// Drain the buffer, closing it if draining fails so a producer waiting
    /// for room is released.
    async fn consume(
        &self,
        buffer: &BoundedBatchBuffer,
        storage_root: &Path,
        flush_every: usize,
    ) -> Result<Vec<PathBuf>> {
        let result = self.drain(buffer, storage_root, flush_every).await;
        if result.is_err() {
            buffer.close();
        }
        result
    }

    /// Flush every `flush_every` batches and once more for any remainder.
    /// Returns the written file paths in order.
    async fn drain(
        &self,
        buffer: &BoundedBatchBuffer,
        storage_root: &Path,
        flush_every: usize,
    ) -> Result<Vec<PathBuf>> {
        let mut pending = Vec::with_capacity(flush_every);
        let mut files = Vec::new();

        while let Some(batch) = buffer.get(None).await? {
            pending.push(batch);
            if pending.len() >= flush_every {
                let batches = std::mem::take(&mut pending);
                files.push(self.flush_batches(storage_root, batches).await?);
            }
        }

        if !pending.is_empty() {
            files.push(self.flush_batches(storage_root, pending).await?);
        }

        Ok(files)
    }

    /// Write batches to one Parquet file
    async fn flush_batches(&self, storage_root: &Path, batches: Vec<RecordBatch>) -> Result<PathBuf> {
        let flush_start = Instant::now();
        let schema = batches
            .first()
            .map(|b| b.schema())
            .ok_or(Error::NoBatches)?;

        // Concatenate batches
        let combined = arrow::compute::concat_batches(&schema, batches.iter())?;
        let rows = combined.num_rows() as u64;

        let path = self.next_file_path(storage_root);
        let writer = self.parquet_writer.clone();
        let target = path.clone();
        let size_bytes =
            tokio::task::spawn_blocking(move || writer.write_file(&target, &[combined]))
                .await?
                .map_err(|e| {
                    Error::Streaming(format!(
                        "Failed to flush batches to {}: {}",
                        path.display(),
                        e
                    ))
                })?;

        telemetry::record_flush(flush_start.elapsed().as_secs_f64(), size_bytes, rows);
        info!(
            path = %path.display(),
            batch_count = batches.len(),
            rows,
            size_bytes,
            "Flushed batches to Parquet"
        );

        Ok(path)
    }

    async fn register_files(&self, dataset_name: &str, storage_root: &Path) -> Result<()> {
        let Some(catalog) = self.catalog.as_ref() else {
            return Ok(());
        };

        let glob = storage_root.join("*.parquet").display().to_string();
        match catalog.register_file_group(dataset_name, &glob).await {
            Ok(()) => {
                telemetry::record_catalog_outcome("success");
                debug!(dataset = %dataset_name, glob = %glob, "Registered files with catalog");
                Ok(())
            }
            Err(e) if self.config.require_catalog => {
                telemetry::record_catalog_outcome("failure");
                Err(Error::Catalog(format!(
                    "Failed to register {} for dataset {}: {}",
                    glob, dataset_name, e
                )))
            }
            Err(e) => {
                telemetry::record_catalog_outcome("failure");
                warn!(
                    dataset = %dataset_name,
                    glob = %glob,
                    error = %e,
                    "Catalog registration failed; files remain on disk"
                );
                Ok(())
            }
        }
    }

    /// Move the file counter past every `stream_NNNNN.parquet` already in
    /// `storage_root`, so files from earlier runs or processes are never
    /// reused.
    async fn skip_existing_files(&self, storage_root: &Path) -> Result<()> {
        let highest = highest_file_sequence(storage_root).await.map_err(|e| {
            Error::Streaming(format!(
                "Failed to scan storage root {}: {}",
                storage_root.display(),
                e
            ))
        })?;
        let previous = self.file_counter.fetch_max(highest, Ordering::Relaxed);
        if highest > previous {
            debug!(
                storage_root = %storage_root.display(),
                highest,
                "Continuing file sequence after existing files"
            );
        }
        Ok(())
    }

    fn next_file_path(&self, storage_root: &Path) -> PathBuf {
        let seq = self.file_counter.fetch_add(1, Ordering::Relaxed) + 1;
        storage_root.join(format!("{}{:05}{}", FILE_PREFIX, seq, FILE_SUFFIX))
    }

    fn fail(&self, dataset_name: &str, cause: Error) -> Error {
        telemetry::record_ingest_outcome("failure");
        error!(dataset = %dataset_name, error = %cause, "Streaming ingestion failed");

        match cause {
            e @ (Error::BufferOverflow { .. }
            | Error::SchemaValidation(_)
            | Error::Protocol(_)
            | Error::NotFound(_)
            | Error::Streaming(_)) => e,
            other => Error::Streaming(other.to_string()),
        }
    }
}

const FILE_PREFIX: &str = "stream_";
const FILE_SUFFIX: &str = ".parquet";

/// Sequence number of a flush file name, if `name` is one
fn parse_file_sequence(name: &str) -> Option<u64> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}

/// Highest flush-file sequence among the regular files in `dir`
async fn highest_file_sequence(dir: &Path) -> std::io::Result<u64> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut highest = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(seq) = entry.file_name().to_str().and_then(parse_file_sequence) {
            highest = highest.max(seq);
        }
    }
    Ok(highest)
}

/// Closes the buffer when the producer exits, however it exits
struct CloseOnDrop<'a>(&'a BoundedBatchBuffer);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}
