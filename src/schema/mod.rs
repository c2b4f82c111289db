//! Schema definitions for arrowsink metrics
//!
//! This module defines the Arrow layout that remote-write data is flattened
//! into. The schema is inferred per request from the labels it carries, so
//! nothing here is global state.

mod metrics;

pub use metrics::{
    is_reserved, timestamp_type, MetricSchema, MetricSchemaBuilder, EXEMPLAR_LABEL_PREFIX,
    HELP_FIELD, HISTOGRAM_COUNT_FIELD, HISTOGRAM_SCHEMA_FIELD, HISTOGRAM_SUM_FIELD,
    HISTOGRAM_ZERO_COUNT_FIELD, HISTOGRAM_ZERO_THRESHOLD_FIELD, IS_EXEMPLAR_FIELD,
    IS_HISTOGRAM_FIELD, METRIC_NAME_LABEL, METRIC_TYPE_FIELD, RESERVED_COLUMNS, TIMESTAMP_FIELD,
    UNIT_FIELD, VALUE_FIELD,
};
