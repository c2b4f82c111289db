//! # arrowsink
//!
//! Streaming ingestion of columnar data into Parquet under backpressure.
//!
//! Two wire sources feed the same pipeline:
//!
//! - **Arrow IPC streams**: one schema header followed by record batches
//! - **Prometheus remote-write**: snappy-compressed protobuf time series,
//!   flattened into rows with a schema inferred per request
//!
//! ## Architecture
//!
//! - **Buffer**: bounded FIFO of record batches, capped by bytes and depth
//! - **Ingester**: a producer fills the buffer while a consumer drains it and
//!   flushes every N batches to a sequentially named Parquet file
//! - **Catalog**: told about the written files once a run completes
//! - **API**: axum routes for both wire sources

pub mod api;
pub mod catalog;
pub mod config;
pub mod ingester;
pub mod remote_write;
pub mod schema;
pub mod telemetry;

mod error;

pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::catalog::{CatalogClient, LocalCatalog};
    pub use crate::config::{IngestConfig, StorageLayout};
    pub use crate::ingester::{
        ArrowIpcCodec, BatchSource, BoundedBatchBuffer, IngestRequest, IngesterConfig,
        IngestionMetrics, PrometheusIngestor, StreamingIngestor,
    };
    pub use crate::remote_write::{ConvertOptions, RemoteWriteConverter};
    pub use crate::schema::MetricSchema;
    pub use crate::{Error, Result};
}
