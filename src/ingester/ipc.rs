//! Arrow IPC stream codec
//!
//! Reads and writes the Arrow IPC *stream* container (one schema header
//! followed by record batches) and re-encodes it into Parquet. File access
//! runs on tokio's blocking pool so the async side never stalls on disk.

use super::ParquetWriter;
use crate::{Error, Result};
use arrow_array::RecordBatch;
use arrow_ipc::reader::StreamReader;
use arrow_ipc::writer::StreamWriter;
use arrow_schema::{DataType, Schema, SchemaRef};
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Batches decoded ahead of the consumer while reading a stream file
const READ_AHEAD_BATCHES: usize = 4;

/// Arrow IPC stream handler with optional schema enforcement
#[derive(Debug, Clone, Default)]
pub struct ArrowIpcCodec {
    expected_schema: Option<SchemaRef>,
    parquet_writer: ParquetWriter,
}

impl ArrowIpcCodec {
    /// Create a codec that accepts any schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec that rejects streams whose schema differs from `schema`
    pub fn with_expected_schema(schema: SchemaRef) -> Self {
        Self {
            expected_schema: Some(schema),
            parquet_writer: ParquetWriter::new(),
        }
    }

    /// Schema the codec enforces on read, if any
    pub fn expected_schema(&self) -> Option<&SchemaRef> {
        self.expected_schema.as_ref()
    }

    /// Open an IPC stream file and yield its batches lazily, in file order.
    ///
    /// The schema header is read and checked before this returns; batches are
    /// decoded on a blocking worker as the returned stream is polled. Calling
    /// again re-opens the file.
    pub async fn read_stream(&self, path: &Path) -> Result<IpcBatchStream> {
        let path = path.to_path_buf();
        let expected = self.expected_schema.clone();

        let open_path = path.clone();
        let reader =
            tokio::task::spawn_blocking(move || open_stream(&open_path, expected.as_deref()))
                .await??;
        let schema = reader.schema();

        let (tx, rx) = mpsc::channel(READ_AHEAD_BATCHES);
        tokio::task::spawn_blocking(move || {
            for (index, batch) in reader.enumerate() {
                let item = batch.map_err(|e| {
                    Error::Protocol(format!(
                        "Failed to read IPC stream {} at batch {}: {}",
                        path.display(),
                        index,
                        e
                    ))
                });
                let failed = item.is_err();
                // Receiver dropped means the consumer stopped early
                if tx.blocking_send(item).is_err() || failed {
                    break;
                }
            }
        });

        Ok(IpcBatchStream { schema, rx })
    }

    /// Write every batch of `batches` to an IPC stream at `dest`, returning
    /// the total row count.
    ///
    /// The input is collected before anything touches disk so that a schema
    /// change or an empty input leaves no file behind.
    pub async fn write_stream<S>(&self, batches: S, dest: &Path) -> Result<u64>
    where
        S: Stream<Item = RecordBatch>,
    {
        let mut batches = std::pin::pin!(batches);
        let mut schema: Option<SchemaRef> = None;
        let mut collected = Vec::new();
        let mut total_rows = 0u64;

        while let Some(batch) = batches.next().await {
            match &schema {
                None => schema = Some(batch.schema()),
                Some(first) => {
                    if !same_schema(first, &batch.schema()) {
                        return Err(Error::Protocol(format!(
                            "Inconsistent schema in batch {}. Expected: {:?}, Got: {:?}",
                            collected.len(),
                            first,
                            batch.schema()
                        )));
                    }
                }
            }
            total_rows += batch.num_rows() as u64;
            collected.push(batch);
        }

        let schema = schema.ok_or(Error::NoBatches)?;
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || write_ipc_file(&dest, &schema, &collected)).await??;

        debug!(total_rows, "Wrote IPC stream");
        Ok(total_rows)
    }

    /// Re-encode an IPC stream file into a Parquet file batch by batch,
    /// returning the total row count. A partial Parquet file is removed on
    /// failure.
    pub async fn convert_to_parquet(&self, ipc_path: &Path, parquet_path: &Path) -> Result<u64> {
        let ipc_path = ipc_path.to_path_buf();
        let parquet_path = parquet_path.to_path_buf();
        let writer = self.parquet_writer.clone();
        let expected = self.expected_schema.clone();

        let total_rows = tokio::task::spawn_blocking(move || {
            let result = convert_file(&writer, &ipc_path, &parquet_path, expected.as_deref());
            if result.is_err() {
                let _ = std::fs::remove_file(&parquet_path);
            }
            result
        })
        .await??;

        info!(total_rows, "Converted IPC stream to Parquet");
        Ok(total_rows)
    }

    /// Check that a schema can be ingested: at least one field, unique field
    /// names, and no field of the null type.
    pub fn validate_schema(schema: &Schema) -> Result<bool> {
        if schema.fields().is_empty() {
            return Err(Error::SchemaValidation("Schema has no fields".to_string()));
        }

        let mut seen = HashSet::new();
        let duplicates: Vec<&str> = schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .filter(|name| !seen.insert(*name))
            .collect();
        if !duplicates.is_empty() {
            return Err(Error::SchemaValidation(format!(
                "Schema has duplicate field names: {:?}",
                duplicates
            )));
        }

        let null_fields: Vec<&str> = schema
            .fields()
            .iter()
            .filter(|f| matches!(f.data_type(), DataType::Null))
            .map(|f| f.name().as_str())
            .collect();
        if !null_fields.is_empty() {
            return Err(Error::SchemaValidation(format!(
                "Schema contains unsupported NULL type fields: {:?}",
                null_fields
            )));
        }

        Ok(true)
    }
}

/// Forward-only stream of batches decoded from one IPC file
#[derive(Debug)]
pub struct IpcBatchStream {
    schema: SchemaRef,
    rx: mpsc::Receiver<Result<RecordBatch>>,
}

impl IpcBatchStream {
    /// Schema declared in the stream header
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Drain the remaining batches into memory
    pub async fn collect_batches(mut self) -> Result<Vec<RecordBatch>> {
        let mut batches = Vec::new();
        while let Some(batch) = self.next().await {
            batches.push(batch?);
        }
        Ok(batches)
    }

    /// Drain the remaining batches, returning `(batches, rows)` without
    /// keeping any of them
    pub async fn count_remaining(mut self) -> Result<(usize, usize)> {
        let (mut batches, mut rows) = (0, 0);
        while let Some(batch) = self.next().await {
            rows += batch?.num_rows();
            batches += 1;
        }
        Ok((batches, rows))
    }
}

impl Stream for IpcBatchStream {
    type Item = Result<RecordBatch>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Field-level equality; schema-level metadata is not significant here.
pub(crate) fn same_schema(a: &Schema, b: &Schema) -> bool {
    a.fields() == b.fields()
}

fn open_stream(path: &Path, expected: Option<&Schema>) -> Result<StreamReader<BufReader<File>>> {
    let file = File::open(path).map_err(|e| {
        Error::Protocol(format!("Failed to open IPC stream {}: {}", path.display(), e))
    })?;
    let reader = StreamReader::try_new(BufReader::new(file), None).map_err(|e| {
        Error::Protocol(format!("Failed to read IPC stream {}: {}", path.display(), e))
    })?;

    if let Some(expected) = expected {
        if !same_schema(expected, &reader.schema()) {
            return Err(Error::SchemaValidation(format!(
                "Schema mismatch. Expected: {:?}, Got: {:?}",
                expected,
                reader.schema()
            )));
        }
    }

    Ok(reader)
}

fn write_ipc_file(dest: &Path, schema: &SchemaRef, batches: &[RecordBatch]) -> Result<()> {
    let write = || -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let file = File::create(dest)?;
        let mut writer = StreamWriter::try_new(BufWriter::new(file), schema)?;
        for batch in batches {
            writer.write(batch)?;
        }
        writer.finish()?;
        Ok(())
    };

    write().map_err(|e| {
        let _ = std::fs::remove_file(dest);
        Error::Protocol(format!("Failed to write IPC stream {}: {}", dest.display(), e))
    })
}

fn convert_file(
    writer: &ParquetWriter,
    ipc_path: &Path,
    parquet_path: &Path,
    expected: Option<&Schema>,
) -> Result<u64> {
    let reader = open_stream(ipc_path, expected)?;
    let sink = File::create(parquet_path)?;
    let mut parquet = writer
        .open(sink, reader.schema())
        .map_err(|e| Error::Protocol(format!("Failed to convert IPC to Parquet: {}", e)))?;

    let mut total_rows = 0u64;
    for batch in reader {
        let batch =
            batch.map_err(|e| Error::Protocol(format!("Failed to convert IPC to Parquet: {}", e)))?;
        parquet
            .write(&batch)
            .map_err(|e| Error::Protocol(format!("Failed to convert IPC to Parquet: {}", e)))?;
        total_rows += batch.num_rows() as u64;
    }
    parquet
        .close()
        .map_err(|e| Error::Protocol(format!("Failed to convert IPC to Parquet: {}", e)))?;

    Ok(total_rows)
}
