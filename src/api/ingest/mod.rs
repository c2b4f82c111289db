//! Ingestion endpoints

pub mod arrow_stream;
pub mod prometheus;
