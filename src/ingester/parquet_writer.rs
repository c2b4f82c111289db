//! Parquet writer used for flush files and IPC conversion

use crate::{Error, Result};
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::{EnabledStatistics, WriterProperties, WriterVersion};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Parquet writer with snappy compression
#[derive(Debug, Clone)]
pub struct ParquetWriter {
    /// Writer properties
    props: WriterProperties,
}

impl ParquetWriter {
    /// Create a new Parquet writer
    pub fn new() -> Self {
        let props = Self::build_writer_properties();
        Self { props }
    }

    fn build_writer_properties() -> WriterProperties {
        WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(Compression::SNAPPY)
            .set_dictionary_enabled(true)
            // Keep row groups bounded so readers can skip by statistics
            .set_max_row_group_size(500_000)
            .set_statistics_enabled(EnabledStatistics::Page)
            .build()
    }

    /// Writer properties shared by every file this writer produces
    pub fn properties(&self) -> &WriterProperties {
        &self.props
    }

    /// Write record batches to in-memory Parquet bytes
    pub fn write_batches(&self, batches: &[RecordBatch]) -> Result<Bytes> {
        let first = batches.first().ok_or(Error::NoBatches)?;
        let mut buffer = Vec::new();
        self.write_all(&mut buffer, first.schema(), batches)?;
        Ok(Bytes::from(buffer))
    }

    /// Write record batches to a Parquet file at `path`, returning the file
    /// size in bytes. Blocking; call from a blocking worker.
    ///
    /// Fails if anything already exists at `path`. A file left behind by a
    /// failed write is removed.
    pub fn write_file(&self, path: &Path, batches: &[RecordBatch]) -> Result<u64> {
        let first = batches.first().ok_or(Error::NoBatches)?;
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;

        match self.write_all(file, first.schema(), batches) {
            Ok(()) => Ok(std::fs::metadata(path)?.len()),
            Err(e) => {
                let _ = std::fs::remove_file(path);
                Err(e)
            }
        }
    }

    /// Open a streaming writer for callers that produce batches incrementally
    pub fn open<W: Write + Send>(&self, sink: W, schema: SchemaRef) -> Result<ArrowWriter<W>> {
        Ok(ArrowWriter::try_new(sink, schema, Some(self.props.clone()))?)
    }

    fn write_all<W: Write + Send>(
        &self,
        sink: W,
        schema: SchemaRef,
        batches: &[RecordBatch],
    ) -> Result<()> {
        let mut writer = self.open(sink, schema)?;
        for batch in batches {
            writer.write(batch)?;
        }
        writer.close()?;
        Ok(())
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Float64Array, Int64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs::File;
    use std::sync::Arc;

    fn create_test_batch(offset: i64, rows: i64) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("value", DataType::Float64, true),
        ]));

        let ids: Vec<i64> = (offset..offset + rows).collect();
        let names: Vec<String> = ids.iter().map(|i| format!("row-{}", i)).collect();
        let values: Vec<f64> = ids.iter().map(|i| *i as f64 / 10.0).collect();

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(names)),
                Arc::new(Float64Array::from(values)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_write_batches_roundtrip() {
        let writer = ParquetWriter::new();
        let bytes = writer
            .write_batches(&[create_test_batch(0, 100), create_test_batch(100, 50)])
            .unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 150);
    }

    #[test]
    fn test_write_file_uses_snappy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let writer = ParquetWriter::new();

        let size = writer.write_file(&path, &[create_test_batch(0, 10)]).unwrap();
        assert!(size > 0);

        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap()).unwrap();
        let column = builder.metadata().row_group(0).column(0);
        assert_eq!(column.compression(), Compression::SNAPPY);
    }

    #[test]
    fn test_write_file_never_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let writer = ParquetWriter::new();
        writer.write_file(&path, &[create_test_batch(0, 10)]).unwrap();

        let err = writer
            .write_file(&path, &[create_test_batch(10, 3)])
            .unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == std::io::ErrorKind::AlreadyExists));

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 10);
    }

    #[test]
    fn test_write_without_batches_fails() {
        let writer = ParquetWriter::new();
        assert!(matches!(writer.write_batches(&[]), Err(Error::NoBatches)));
    }
}
