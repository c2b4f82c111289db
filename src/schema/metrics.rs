//! Metric schema definitions
//!
//! Defines the Arrow layout for flattened remote-write data: fixed
//! `timestamp`/`value` columns, one nullable string column per label key,
//! then optional exemplar, histogram and metadata columns. Labels are stored
//! as columns, not as tag sets.

use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Standard field names
pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const VALUE_FIELD: &str = "value";
pub const IS_EXEMPLAR_FIELD: &str = "is_exemplar";
pub const IS_HISTOGRAM_FIELD: &str = "is_histogram";
pub const HISTOGRAM_COUNT_FIELD: &str = "histogram_count";
pub const HISTOGRAM_SUM_FIELD: &str = "histogram_sum";
pub const HISTOGRAM_SCHEMA_FIELD: &str = "histogram_schema";
pub const HISTOGRAM_ZERO_THRESHOLD_FIELD: &str = "histogram_zero_threshold";
pub const HISTOGRAM_ZERO_COUNT_FIELD: &str = "histogram_zero_count";
pub const METRIC_TYPE_FIELD: &str = "metric_type";
pub const HELP_FIELD: &str = "help";
pub const UNIT_FIELD: &str = "unit";

/// Label carrying the metric name; stored as an ordinary label column
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Prefix applied to exemplar labels so they never collide with series labels
pub const EXEMPLAR_LABEL_PREFIX: &str = "exemplar_";

/// Structural column names that can never become label columns
pub const RESERVED_COLUMNS: [&str; 12] = [
    TIMESTAMP_FIELD,
    VALUE_FIELD,
    IS_EXEMPLAR_FIELD,
    IS_HISTOGRAM_FIELD,
    HISTOGRAM_COUNT_FIELD,
    HISTOGRAM_SUM_FIELD,
    HISTOGRAM_SCHEMA_FIELD,
    HISTOGRAM_ZERO_THRESHOLD_FIELD,
    HISTOGRAM_ZERO_COUNT_FIELD,
    METRIC_TYPE_FIELD,
    HELP_FIELD,
    UNIT_FIELD,
];

/// Whether `name` is a structural column rather than a label
pub fn is_reserved(name: &str) -> bool {
    RESERVED_COLUMNS.contains(&name)
}

/// Arrow type of the timestamp column
pub fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))
}

/// Inferred schema for one remote-write request
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSchema {
    /// The Arrow schema
    schema: SchemaRef,
    /// Label columns in lexicographic order
    label_columns: Vec<String>,
}

impl MetricSchema {
    /// Create a new schema builder
    pub fn builder() -> MetricSchemaBuilder {
        MetricSchemaBuilder::new()
    }

    /// Get the Arrow schema
    pub fn arrow_schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Get all label column names
    pub fn label_columns(&self) -> impl Iterator<Item = &str> {
        self.label_columns.iter().map(|s| s.as_str())
    }

    /// Check if a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.schema.field_with_name(name).is_ok()
    }

    pub fn has_exemplars(&self) -> bool {
        self.has_column(IS_EXEMPLAR_FIELD)
    }

    pub fn has_histograms(&self) -> bool {
        self.has_column(IS_HISTOGRAM_FIELD)
    }
}

/// Builder for MetricSchema
#[derive(Debug, Default)]
pub struct MetricSchemaBuilder {
    labels: BTreeSet<String>,
    exemplars: bool,
    histograms: bool,
    metric_type: bool,
    help: bool,
    unit: bool,
}

impl MetricSchemaBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a label column. Reserved names and repeats are ignored.
    pub fn with_label(mut self, name: impl Into<String>) -> Self {
        self.add_label(name);
        self
    }

    /// Add a label column in place
    pub fn add_label(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !is_reserved(&name) {
            self.labels.insert(name);
        }
    }

    /// Include the `is_exemplar` flag column
    pub fn exemplars(mut self, enabled: bool) -> Self {
        self.exemplars = enabled;
        self
    }

    /// Include the histogram summary columns
    pub fn histograms(mut self, enabled: bool) -> Self {
        self.histograms = enabled;
        self
    }

    /// Include metadata columns individually
    pub fn metadata(mut self, metric_type: bool, help: bool, unit: bool) -> Self {
        self.metric_type = metric_type;
        self.help = help;
        self.unit = unit;
        self
    }

    /// Build the schema
    pub fn build(self) -> MetricSchema {
        let mut fields = vec![
            Field::new(TIMESTAMP_FIELD, timestamp_type(), false),
            // Histogram rows carry no scalar value
            Field::new(VALUE_FIELD, DataType::Float64, true),
        ];

        for label in &self.labels {
            fields.push(Field::new(label, DataType::Utf8, true));
        }

        if self.exemplars {
            fields.push(Field::new(IS_EXEMPLAR_FIELD, DataType::Boolean, true));
        }

        if self.histograms {
            fields.extend([
                Field::new(IS_HISTOGRAM_FIELD, DataType::Boolean, true),
                Field::new(HISTOGRAM_COUNT_FIELD, DataType::Float64, true),
                Field::new(HISTOGRAM_SUM_FIELD, DataType::Float64, true),
                Field::new(HISTOGRAM_SCHEMA_FIELD, DataType::Int32, true),
                Field::new(HISTOGRAM_ZERO_THRESHOLD_FIELD, DataType::Float64, true),
                Field::new(HISTOGRAM_ZERO_COUNT_FIELD, DataType::Float64, true),
            ]);
        }

        if self.metric_type {
            fields.push(Field::new(METRIC_TYPE_FIELD, DataType::Utf8, true));
        }
        if self.help {
            fields.push(Field::new(HELP_FIELD, DataType::Utf8, true));
        }
        if self.unit {
            fields.push(Field::new(UNIT_FIELD, DataType::Utf8, true));
        }

        MetricSchema {
            schema: Arc::new(Schema::new(fields)),
            label_columns: self.labels.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_columns_come_first() {
        let schema = MetricSchema::builder()
            .with_label("job")
            .with_label(METRIC_NAME_LABEL)
            .build();
        let arrow_schema = schema.arrow_schema();

        let names: Vec<&str> = arrow_schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(names, vec![TIMESTAMP_FIELD, VALUE_FIELD, "__name__", "job"]);

        let ts = arrow_schema.field_with_name(TIMESTAMP_FIELD).unwrap();
        assert!(!ts.is_nullable());
        assert_eq!(ts.data_type(), &timestamp_type());
    }

    #[test]
    fn test_reserved_labels_are_skipped() {
        let schema = MetricSchema::builder()
            .with_label("value")
            .with_label("help")
            .with_label("instance")
            .build();

        assert_eq!(schema.label_columns().collect::<Vec<_>>(), vec!["instance"]);
        assert!(!schema.has_column(HELP_FIELD));
    }

    #[test]
    fn test_optional_column_order() {
        let schema = MetricSchema::builder()
            .with_label("a")
            .exemplars(true)
            .histograms(true)
            .metadata(true, false, true)
            .build();

        let names: Vec<String> = schema
            .arrow_schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(
            names,
            vec![
                "timestamp",
                "value",
                "a",
                "is_exemplar",
                "is_histogram",
                "histogram_count",
                "histogram_sum",
                "histogram_schema",
                "histogram_zero_threshold",
                "histogram_zero_count",
                "metric_type",
                "unit",
            ]
        );
        assert!(schema.has_exemplars());
        assert!(schema.has_histograms());
    }
}
