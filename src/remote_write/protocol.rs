//! Remote-write payload decoding, validation and statistics

use super::proto::WriteRequest;
use crate::schema::METRIC_NAME_LABEL;
use crate::{Error, Result};
use prost::Message;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

/// Decompress and decode one remote-write payload
pub fn decode_write_request(payload: &[u8]) -> Result<WriteRequest> {
    debug!(bytes = payload.len(), "Decompressing remote-write payload");

    let decompressed = snap::raw::Decoder::new()
        .decompress_vec(payload)
        .map_err(|e| {
            Error::WireDecode(format!(
                "Failed to decompress remote-write payload ({} bytes received): {}",
                payload.len(),
                e
            ))
        })?;

    let request = WriteRequest::decode(decompressed.as_slice()).map_err(|e| {
        Error::WireDecode(format!(
            "Failed to decode WriteRequest ({} bytes decompressed from {}): {}",
            decompressed.len(),
            payload.len(),
            e
        ))
    })?;

    info!(
        compressed_bytes = payload.len(),
        decompressed_bytes = decompressed.len(),
        time_series = request.timeseries.len(),
        metadata = request.metadata.len(),
        "Decoded WriteRequest"
    );

    Ok(request)
}

/// Reason a decoded request is not ingestible
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidRequest {
    NoTimeSeries,
    NoLabels { series: usize },
    MissingMetricName { series: usize },
    NoData { series: usize },
    InvalidTimestamp {
        series: usize,
        sample: usize,
        timestamp: i64,
    },
}

impl fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidRequest::NoTimeSeries => write!(f, "WriteRequest contains no time series"),
            InvalidRequest::NoLabels { series } => write!(f, "Time series {} has no labels", series),
            InvalidRequest::MissingMetricName { series } => {
                write!(f, "Time series {} missing {} label", series, METRIC_NAME_LABEL)
            }
            InvalidRequest::NoData { series } => write!(
                f,
                "Time series {} has no samples, exemplars, or histograms",
                series
            ),
            InvalidRequest::InvalidTimestamp {
                series,
                sample,
                timestamp,
            } => write!(
                f,
                "Time series {}, sample {} has invalid timestamp: {}",
                series, sample, timestamp
            ),
        }
    }
}

impl From<InvalidRequest> for Error {
    fn from(err: InvalidRequest) -> Self {
        Error::WireValidation(err.to_string())
    }
}

/// Check a decoded request before any extraction work. Stops at the first
/// problem found, in series order.
pub fn validate_write_request(request: &WriteRequest) -> std::result::Result<(), InvalidRequest> {
    if request.timeseries.is_empty() {
        return Err(InvalidRequest::NoTimeSeries);
    }

    for (series, ts) in request.timeseries.iter().enumerate() {
        if ts.labels.is_empty() {
            return Err(InvalidRequest::NoLabels { series });
        }
        if !ts.labels.iter().any(|l| l.name == METRIC_NAME_LABEL) {
            return Err(InvalidRequest::MissingMetricName { series });
        }
        if ts.samples.is_empty() && ts.exemplars.is_empty() && ts.histograms.is_empty() {
            return Err(InvalidRequest::NoData { series });
        }
        if let Some((sample, s)) = ts
            .samples
            .iter()
            .enumerate()
            .find(|(_, s)| s.timestamp <= 0)
        {
            return Err(InvalidRequest::InvalidTimestamp {
                series,
                sample,
                timestamp: s.timestamp,
            });
        }
    }

    Ok(())
}

/// Aggregate counts over one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteRequestStats {
    pub total_time_series: usize,
    pub total_samples: usize,
    pub total_exemplars: usize,
    pub total_histograms: usize,
    pub total_metadata: usize,
    pub unique_metrics: usize,
    pub unique_labels: usize,
    /// Over samples only
    pub min_timestamp: Option<i64>,
    pub max_timestamp: Option<i64>,
}

/// Compute request statistics in one pass
pub fn statistics(request: &WriteRequest) -> WriteRequestStats {
    let mut stats = WriteRequestStats {
        total_time_series: request.timeseries.len(),
        total_metadata: request.metadata.len(),
        ..Default::default()
    };
    let mut metrics = HashSet::new();
    let mut labels = HashSet::new();

    for ts in &request.timeseries {
        stats.total_samples += ts.samples.len();
        stats.total_exemplars += ts.exemplars.len();
        stats.total_histograms += ts.histograms.len();

        for label in &ts.labels {
            labels.insert(label.name.as_str());
            if label.name == METRIC_NAME_LABEL {
                metrics.insert(label.value.as_str());
            }
        }

        for sample in &ts.samples {
            stats.min_timestamp = Some(
                stats
                    .min_timestamp
                    .map_or(sample.timestamp, |t| t.min(sample.timestamp)),
            );
            stats.max_timestamp = Some(
                stats
                    .max_timestamp
                    .map_or(sample.timestamp, |t| t.max(sample.timestamp)),
            );
        }
    }

    stats.unique_metrics = metrics.len();
    stats.unique_labels = labels.len();
    stats
}

/// One metadata record as carried by the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataEntry {
    pub metric_family_name: String,
    pub metric_type: &'static str,
    pub help: String,
    pub unit: String,
}

/// List every metadata record, independent of flattening
pub fn metadata_entries(request: &WriteRequest) -> Vec<MetadataEntry> {
    request
        .metadata
        .iter()
        .map(|m| MetadataEntry {
            metric_family_name: m.metric_family_name.clone(),
            metric_type: m.r#type().name(),
            help: m.help.clone(),
            unit: m.unit.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote_write::proto::{Label, Sample, TimeSeries};

    fn label(name: &str, value: &str) -> Label {
        Label {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn series(labels: Vec<Label>, samples: Vec<Sample>) -> TimeSeries {
        TimeSeries {
            labels,
            samples,
            ..Default::default()
        }
    }

    #[test]
    fn test_validation_messages() {
        let empty = WriteRequest::default();
        assert_eq!(
            validate_write_request(&empty).unwrap_err().to_string(),
            "WriteRequest contains no time series"
        );

        let no_name = WriteRequest {
            timeseries: vec![series(
                vec![label("job", "api")],
                vec![Sample { value: 1.0, timestamp: 1 }],
            )],
            ..Default::default()
        };
        assert_eq!(
            validate_write_request(&no_name).unwrap_err(),
            InvalidRequest::MissingMetricName { series: 0 }
        );

        let bad_ts = WriteRequest {
            timeseries: vec![series(
                vec![label("__name__", "up")],
                vec![
                    Sample { value: 1.0, timestamp: 10 },
                    Sample { value: 1.0, timestamp: 0 },
                ],
            )],
            ..Default::default()
        };
        assert_eq!(
            validate_write_request(&bad_ts).unwrap_err().to_string(),
            "Time series 0, sample 1 has invalid timestamp: 0"
        );
    }

    #[test]
    fn test_invalid_request_maps_to_wire_validation() {
        let err: Error = InvalidRequest::NoData { series: 3 }.into();
        assert!(matches!(err, Error::WireValidation(msg) if msg.contains("Time series 3")));
    }

    #[test]
    fn test_corrupt_payload_names_byte_count() {
        let err = decode_write_request(&[0xff, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, Error::WireDecode(msg) if msg.contains("5 bytes")));
    }
}
