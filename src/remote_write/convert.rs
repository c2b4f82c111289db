//! Schema inference and RecordBatch construction for flattened rows

use super::flatten::{extract_samples, FlattenedSample};
use super::proto::WriteRequest;
use super::protocol::{decode_write_request, statistics, validate_write_request};
use crate::schema::{
    MetricSchema, HELP_FIELD, HISTOGRAM_COUNT_FIELD, HISTOGRAM_SCHEMA_FIELD, HISTOGRAM_SUM_FIELD,
    HISTOGRAM_ZERO_COUNT_FIELD, HISTOGRAM_ZERO_THRESHOLD_FIELD, IS_EXEMPLAR_FIELD,
    IS_HISTOGRAM_FIELD, METRIC_TYPE_FIELD, TIMESTAMP_FIELD, UNIT_FIELD, VALUE_FIELD,
};
use crate::{Error, Result};
use arrow_array::{
    ArrayRef, BooleanArray, Float64Array, Int32Array, RecordBatch, StringArray,
    TimestampMillisecondArray,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default rows per converted batch
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Conversion options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Rows per RecordBatch
    pub batch_size: usize,
    /// Merge per-family metadata into rows and add metadata columns
    pub include_metadata: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            include_metadata: true,
        }
    }
}

/// Converts remote-write payloads into Arrow batches.
///
/// Stateless: every schema is derived from the request being converted, so
/// one converter can serve concurrent requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteWriteConverter {
    options: ConvertOptions,
}

impl RemoteWriteConverter {
    pub fn new(options: ConvertOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> ConvertOptions {
        self.options
    }

    /// Decode, validate, flatten and batch one compressed payload
    pub fn convert_write_request(&self, payload: &[u8]) -> Result<Vec<RecordBatch>> {
        let request = decode_write_request(payload)?;
        validate_write_request(&request)?;
        self.convert(&request)
    }

    /// Flatten and batch an already validated request. Returns no batches
    /// when the request yields no rows.
    pub fn convert(&self, request: &WriteRequest) -> Result<Vec<RecordBatch>> {
        if self.options.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }

        let stats = statistics(request);
        info!(
            time_series = stats.total_time_series,
            samples = stats.total_samples,
            unique_metrics = stats.unique_metrics,
            "Converting write request"
        );

        let rows = extract_samples(request, self.options.include_metadata);
        if rows.is_empty() {
            warn!("No rows extracted from write request");
            return Ok(Vec::new());
        }

        let schema = self.infer_schema(&rows)?;
        let batches = rows
            .chunks(self.options.batch_size)
            .map(|chunk| self.to_record_batch(chunk, &schema))
            .collect::<Result<Vec<_>>>()?;

        info!(
            rows = rows.len(),
            batches = batches.len(),
            bytes = batches.iter().map(|b| b.get_array_memory_size()).sum::<usize>(),
            "Converted write request to Arrow batches"
        );

        Ok(batches)
    }

    /// Infer the schema of a set of rows. Deterministic for a fixed input.
    pub fn infer_schema(&self, rows: &[FlattenedSample]) -> Result<MetricSchema> {
        if rows.is_empty() {
            return Err(Error::SchemaValidation(
                "Cannot infer schema from zero rows".to_string(),
            ));
        }

        let mut builder = MetricSchema::builder();
        let (mut exemplars, mut histograms) = (false, false);
        let (mut metric_type, mut help, mut unit) = (false, false, false);

        for row in rows {
            for name in row.label_names() {
                builder.add_label(name);
            }
            exemplars |= row.is_exemplar();
            histograms |= row.histogram().is_some();
            if let Some(meta) = &row.metadata {
                metric_type |= !meta.metric_type.is_empty();
                help |= !meta.help.is_empty();
                unit |= !meta.unit.is_empty();
            }
        }

        let include = self.options.include_metadata;
        let schema = builder
            .exemplars(exemplars)
            .histograms(histograms)
            .metadata(include && metric_type, include && help, include && unit)
            .build();

        debug!(
            columns = schema.arrow_schema().fields().len(),
            rows = rows.len(),
            "Inferred schema"
        );
        Ok(schema)
    }

    /// Build one batch from `rows` against `schema`. Fields a row does not
    /// carry are null.
    pub fn to_record_batch(&self, rows: &[FlattenedSample], schema: &MetricSchema) -> Result<RecordBatch> {
        if rows.is_empty() {
            return Err(Error::SchemaValidation(
                "Cannot build a batch from zero rows".to_string(),
            ));
        }

        let arrow_schema = schema.arrow_schema();
        let columns: Vec<ArrayRef> = arrow_schema
            .fields()
            .iter()
            .map(|field| build_column(field.name(), rows))
            .collect();

        Ok(RecordBatch::try_new(arrow_schema, columns)?)
    }
}

fn build_column(name: &str, rows: &[FlattenedSample]) -> ArrayRef {
    match name {
        TIMESTAMP_FIELD => Arc::new(
            TimestampMillisecondArray::from_iter_values(rows.iter().map(|r| r.timestamp_ms))
                .with_timezone("UTC"),
        ),
        VALUE_FIELD => Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.value()))),
        IS_EXEMPLAR_FIELD => Arc::new(BooleanArray::from_iter(
            rows.iter().map(|r| Some(r.is_exemplar())),
        )),
        IS_HISTOGRAM_FIELD => Arc::new(BooleanArray::from_iter(
            rows.iter().map(|r| Some(r.histogram().is_some())),
        )),
        HISTOGRAM_COUNT_FIELD => histogram_f64(rows, |h| h.count),
        HISTOGRAM_SUM_FIELD => histogram_f64(rows, |h| h.sum),
        HISTOGRAM_ZERO_THRESHOLD_FIELD => histogram_f64(rows, |h| h.zero_threshold),
        HISTOGRAM_ZERO_COUNT_FIELD => histogram_f64(rows, |h| h.zero_count),
        HISTOGRAM_SCHEMA_FIELD => Arc::new(Int32Array::from_iter(
            rows.iter().map(|r| r.histogram().map(|h| h.schema)),
        )),
        METRIC_TYPE_FIELD => Arc::new(StringArray::from_iter(
            rows.iter().map(|r| r.metadata.as_ref().map(|m| m.metric_type)),
        )),
        HELP_FIELD => Arc::new(StringArray::from_iter(
            rows.iter().map(|r| r.metadata.as_ref().map(|m| m.help.as_str())),
        )),
        UNIT_FIELD => Arc::new(StringArray::from_iter(
            rows.iter().map(|r| r.metadata.as_ref().map(|m| m.unit.as_str())),
        )),
        label => Arc::new(StringArray::from_iter(rows.iter().map(|r| r.label(label)))),
    }
}

fn histogram_f64(
    rows: &[FlattenedSample],
    field: impl Fn(&super::flatten::HistogramPoint) -> f64,
) -> ArrayRef {
    Arc::new(Float64Array::from_iter(
        rows.iter().map(|r| r.histogram().map(&field)),
    ))
}
