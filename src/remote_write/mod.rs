//! Prometheus remote-write adapter
//!
//! Turns one snappy-compressed protobuf `WriteRequest` into Arrow batches:
//!
//! 1. decompress and decode ([`decode_write_request`])
//! 2. validate ([`validate_write_request`])
//! 3. flatten series into rows ([`extract_samples`])
//! 4. infer a schema from the rows and chunk them into batches
//!    ([`RemoteWriteConverter`])

mod convert;
mod flatten;
pub mod headers;
pub mod proto;
mod protocol;

pub use convert::{ConvertOptions, RemoteWriteConverter, DEFAULT_BATCH_SIZE};
pub use flatten::{
    extract_samples, FlattenedSample, HistogramPoint, LabelSet, RowMetadata, SampleKind,
};
pub use proto::WriteRequest;
pub use protocol::{
    decode_write_request, metadata_entries, statistics, validate_write_request, InvalidRequest,
    MetadataEntry, WriteRequestStats,
};
