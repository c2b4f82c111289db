//! Flattening of time series into row-shaped records

use super::proto::WriteRequest;
use crate::schema::{EXEMPLAR_LABEL_PREFIX, METRIC_NAME_LABEL};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Labels of one series, shared by every row derived from it
pub type LabelSet = BTreeMap<String, String>;

/// Metadata merged into rows whose series has a matching family name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMetadata {
    pub metric_type: &'static str,
    pub help: String,
    pub unit: String,
}

/// Summary fields of one native histogram point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramPoint {
    pub count: f64,
    pub sum: f64,
    pub schema: i32,
    pub zero_threshold: f64,
    pub zero_count: f64,
}

/// What a flattened row was derived from
#[derive(Debug, Clone, PartialEq)]
pub enum SampleKind {
    Sample {
        value: f64,
    },
    /// `labels` are already prefixed with `exemplar_`
    Exemplar {
        value: f64,
        labels: Vec<(String, String)>,
    },
    Histogram(HistogramPoint),
}

/// One row of a flattened write request
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedSample {
    pub timestamp_ms: i64,
    pub labels: Arc<LabelSet>,
    pub kind: SampleKind,
    pub metadata: Option<Arc<RowMetadata>>,
}

impl FlattenedSample {
    /// Scalar value; histogram rows have none
    pub fn value(&self) -> Option<f64> {
        match &self.kind {
            SampleKind::Sample { value } | SampleKind::Exemplar { value, .. } => Some(*value),
            SampleKind::Histogram(_) => None,
        }
    }

    pub fn is_exemplar(&self) -> bool {
        matches!(self.kind, SampleKind::Exemplar { .. })
    }

    pub fn histogram(&self) -> Option<&HistogramPoint> {
        match &self.kind {
            SampleKind::Histogram(h) => Some(h),
            _ => None,
        }
    }

    /// Value of a label column for this row. Exemplar labels shadow series
    /// labels of the same (prefixed) name.
    pub fn label(&self, name: &str) -> Option<&str> {
        if let SampleKind::Exemplar { labels, .. } = &self.kind {
            if let Some((_, v)) = labels.iter().rev().find(|(k, _)| k == name) {
                return Some(v.as_str());
            }
        }
        self.labels.get(name).map(|v| v.as_str())
    }

    /// Every label column name this row contributes
    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        let exemplar: &[(String, String)] = match &self.kind {
            SampleKind::Exemplar { labels, .. } => labels.as_slice(),
            _ => &[],
        };
        self.labels
            .keys()
            .map(|k| k.as_str())
            .chain(exemplar.iter().map(|(k, _)| k.as_str()))
    }

    pub fn metric_name(&self) -> Option<&str> {
        self.labels.get(METRIC_NAME_LABEL).map(|v| v.as_str())
    }
}

/// Flatten every sample, exemplar and histogram of `request` into rows,
/// in series order and within a series samples, then exemplars, then
/// histograms.
pub fn extract_samples(request: &WriteRequest, include_metadata: bool) -> Vec<FlattenedSample> {
    let metadata: HashMap<&str, Arc<RowMetadata>> = if include_metadata {
        request
            .metadata
            .iter()
            .map(|m| {
                (
                    m.metric_family_name.as_str(),
                    Arc::new(RowMetadata {
                        metric_type: m.r#type().name(),
                        help: m.help.clone(),
                        unit: m.unit.clone(),
                    }),
                )
            })
            .collect()
    } else {
        HashMap::new()
    };

    let capacity = request
        .timeseries
        .iter()
        .map(|ts| ts.samples.len() + ts.exemplars.len() + ts.histograms.len())
        .sum();
    let mut rows = Vec::with_capacity(capacity);

    for ts in &request.timeseries {
        let labels: Arc<LabelSet> = Arc::new(
            ts.labels
                .iter()
                .map(|l| (l.name.clone(), l.value.clone()))
                .collect(),
        );
        let series_metadata = labels
            .get(METRIC_NAME_LABEL)
            .and_then(|name| metadata.get(name.as_str()))
            .cloned();

        for sample in &ts.samples {
            rows.push(FlattenedSample {
                timestamp_ms: sample.timestamp,
                labels: labels.clone(),
                kind: SampleKind::Sample {
                    value: sample.value,
                },
                metadata: series_metadata.clone(),
            });
        }

        for exemplar in &ts.exemplars {
            rows.push(FlattenedSample {
                timestamp_ms: exemplar.timestamp,
                labels: labels.clone(),
                kind: SampleKind::Exemplar {
                    value: exemplar.value,
                    labels: exemplar
                        .labels
                        .iter()
                        .map(|l| (format!("{}{}", EXEMPLAR_LABEL_PREFIX, l.name), l.value.clone()))
                        .collect(),
                },
                metadata: series_metadata.clone(),
            });
        }

        for histogram in &ts.histograms {
            rows.push(FlattenedSample {
                timestamp_ms: histogram.timestamp,
                labels: labels.clone(),
                kind: SampleKind::Histogram(HistogramPoint {
                    count: histogram.count_value(),
                    sum: histogram.sum,
                    schema: histogram.schema,
                    zero_threshold: histogram.zero_threshold,
                    zero_count: histogram.zero_count_value(),
                }),
                metadata: series_metadata.clone(),
            });
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote_write::proto::{
        histogram, metric_metadata::MetricType, Exemplar, Histogram, Label, MetricMetadata,
        Sample, TimeSeries,
    };

    fn label(name: &str, value: &str) -> Label {
        Label {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn mixed_request() -> WriteRequest {
        WriteRequest {
            timeseries: vec![TimeSeries {
                labels: vec![label("__name__", "http_requests_total"), label("job", "api")],
                samples: vec![Sample {
                    value: 3.0,
                    timestamp: 1_000,
                }],
                exemplars: vec![Exemplar {
                    labels: vec![label("trace_id", "abc")],
                    value: 0.25,
                    timestamp: 1_001,
                }],
                histograms: vec![Histogram {
                    count: Some(histogram::Count::CountInt(4)),
                    sum: 10.0,
                    schema: 3,
                    zero_threshold: 0.001,
                    zero_count: Some(histogram::ZeroCount::ZeroCountInt(1)),
                    timestamp: 1_002,
                    ..Default::default()
                }],
            }],
            metadata: vec![MetricMetadata {
                r#type: MetricType::Counter as i32,
                metric_family_name: "http_requests_total".to_string(),
                help: "Requests served".to_string(),
                unit: String::new(),
            }],
        }
    }

    #[test]
    fn test_row_order_and_kinds() {
        let rows = extract_samples(&mixed_request(), true);
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].value(), Some(3.0));
        assert!(rows[1].is_exemplar());
        assert_eq!(rows[1].label("exemplar_trace_id"), Some("abc"));
        assert_eq!(rows[1].label("job"), Some("api"));
        assert_eq!(rows[2].value(), None);
        assert_eq!(rows[2].histogram().map(|h| h.count), Some(4.0));
        assert_eq!(rows[2].metric_name(), Some("http_requests_total"));
    }

    #[test]
    fn test_metadata_merge_is_optional() {
        let with = extract_samples(&mixed_request(), true);
        assert!(with.iter().all(|r| {
            r.metadata.as_ref().map(|m| m.metric_type) == Some("COUNTER")
        }));

        let without = extract_samples(&mixed_request(), false);
        assert!(without.iter().all(|r| r.metadata.is_none()));
    }

    #[test]
    fn test_series_labels_are_shared() {
        let rows = extract_samples(&mixed_request(), false);
        assert!(Arc::ptr_eq(&rows[0].labels, &rows[2].labels));
    }
}
