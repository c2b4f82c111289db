//! Ingester telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

struct IngesterInstruments {
    buffer_puts: Counter<u64>,
    buffer_put_bytes: Counter<u64>,
    buffer_queue_depth: Histogram<u64>,
    buffer_fullness_ratio: Histogram<f64>,
    backpressure_overflows: Counter<u64>,
    flush_duration_seconds: Histogram<f64>,
    flush_bytes: Histogram<u64>,
    flush_rows: Histogram<u64>,
    ingest_outcomes: Counter<u64>,
    catalog_registration_outcomes: Counter<u64>,
    remote_write_requests: Counter<u64>,
    remote_write_rows: Counter<u64>,
}

fn instruments() -> &'static IngesterInstruments {
    static INSTRUMENTS: OnceLock<IngesterInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("arrowsink.ingester");
        IngesterInstruments {
            buffer_puts: meter
                .u64_counter("arrowsink.ingester.buffer.puts")
                .with_description("Batches accepted into the bounded buffer")
                .init(),
            buffer_put_bytes: meter
                .u64_counter("arrowsink.ingester.buffer.put_bytes")
                .with_description("In-memory bytes accepted into the bounded buffer")
                .with_unit("By")
                .init(),
            buffer_queue_depth: meter
                .u64_histogram("arrowsink.ingester.buffer.queue_depth")
                .with_description("Queue depth sampled after each enqueue")
                .init(),
            buffer_fullness_ratio: meter
                .f64_histogram("arrowsink.ingester.buffer.fullness_ratio")
                .with_description("Byte fullness ratio sampled after each enqueue")
                .init(),
            backpressure_overflows: meter
                .u64_counter("arrowsink.ingester.backpressure.overflows")
                .with_description("Puts that timed out waiting for buffer room")
                .init(),
            flush_duration_seconds: meter
                .f64_histogram("arrowsink.ingester.flush.duration")
                .with_description("Parquet flush duration")
                .with_unit("s")
                .init(),
            flush_bytes: meter
                .u64_histogram("arrowsink.ingester.flush.bytes")
                .with_description("Parquet bytes written in each flush")
                .with_unit("By")
                .init(),
            flush_rows: meter
                .u64_histogram("arrowsink.ingester.flush.rows")
                .with_description("Rows written in each flush")
                .init(),
            ingest_outcomes: meter
                .u64_counter("arrowsink.ingester.ingest.outcomes")
                .with_description("Completed ingestion runs by outcome")
                .init(),
            catalog_registration_outcomes: meter
                .u64_counter("arrowsink.ingester.catalog.outcomes")
                .with_description("Catalog registration outcomes")
                .init(),
            remote_write_requests: meter
                .u64_counter("arrowsink.ingester.remote_write.requests")
                .with_description("Remote write requests converted, by outcome")
                .init(),
            remote_write_rows: meter
                .u64_counter("arrowsink.ingester.remote_write.rows")
                .with_description("Rows produced from remote write requests")
                .init(),
        }
    })
}

pub fn record_put(batch_size_bytes: u64, queue_depth: u64, fullness_ratio: f64) {
    let i = instruments();
    i.buffer_puts.add(1, &[]);
    i.buffer_put_bytes.add(batch_size_bytes, &[]);
    i.buffer_queue_depth.record(queue_depth, &[]);
    i.buffer_fullness_ratio
        .record(fullness_ratio.clamp(0.0, 1.0), &[]);
}

pub fn record_backpressure_overflow() {
    instruments().backpressure_overflows.add(1, &[]);
}

pub fn record_flush(duration_seconds: f64, bytes: u64, rows: u64) {
    let i = instruments();
    i.flush_duration_seconds.record(duration_seconds, &[]);
    i.flush_bytes.record(bytes, &[]);
    i.flush_rows.record(rows, &[]);
}

pub fn record_ingest_outcome(outcome: &'static str) {
    instruments()
        .ingest_outcomes
        .add(1, &[KeyValue::new("outcome", outcome)]);
}

pub fn record_catalog_outcome(outcome: &'static str) {
    instruments()
        .catalog_registration_outcomes
        .add(1, &[KeyValue::new("outcome", outcome)]);
}

pub fn record_remote_write(outcome: &'static str, rows: u64) {
    let i = instruments();
    i.remote_write_requests
        .add(1, &[KeyValue::new("outcome", outcome)]);
    i.remote_write_rows.add(rows, &[]);
}
