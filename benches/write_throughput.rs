//! Write throughput benchmark

use arrowsink::ingester::{BatchSource, IngestRequest, IngesterConfig, ParquetWriter, StreamingIngestor};
use arrowsink::remote_write::proto::{encode_compressed, Label, Sample, TimeSeries, WriteRequest};
use arrowsink::remote_write::RemoteWriteConverter;

use arrow_array::{Float64Array, RecordBatch, StringArray, TimestampMillisecondArray};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;

fn create_test_batch(rows: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            false,
        ),
        Field::new("value", DataType::Float64, true),
        Field::new("__name__", DataType::Utf8, true),
        Field::new("instance", DataType::Utf8, true),
        Field::new("job", DataType::Utf8, true),
    ]));

    let now = chrono::Utc::now().timestamp_millis();
    let timestamps: Vec<i64> = (0..rows as i64).map(|i| now + i * 15_000).collect();
    let values: Vec<f64> = (0..rows).map(|i| (i as f64 % 100.0) / 100.0).collect();
    let names: Vec<&str> = (0..rows).map(|_| "node_cpu_seconds_total").collect();
    let instances: Vec<String> = (0..rows).map(|i| format!("node-{:02}:9100", i % 10)).collect();
    let jobs: Vec<&str> = (0..rows)
        .map(|i| match i % 3 {
            0 => "node",
            1 => "api",
            _ => "worker",
        })
        .collect();

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(TimestampMillisecondArray::from(timestamps).with_timezone("UTC")),
            Arc::new(Float64Array::from(values)),
            Arc::new(StringArray::from(names)),
            Arc::new(StringArray::from(instances)),
            Arc::new(StringArray::from(jobs)),
        ],
    )
    .unwrap()
}

fn create_write_request(series: usize, samples_per_series: usize) -> WriteRequest {
    let timeseries = (0..series)
        .map(|s| TimeSeries {
            labels: vec![
                Label {
                    name: "__name__".to_string(),
                    value: format!("metric_{}", s % 20),
                },
                Label {
                    name: "instance".to_string(),
                    value: format!("node-{}", s),
                },
            ],
            samples: (0..samples_per_series)
                .map(|i| Sample {
                    value: i as f64,
                    timestamp: 1_700_000_000_000 + i as i64 * 15_000,
                })
                .collect(),
            ..Default::default()
        })
        .collect();

    WriteRequest {
        timeseries,
        metadata: vec![],
    }
}

fn benchmark_parquet_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("parquet_write");

    for rows in [1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(rows as u64));

        let batch = create_test_batch(rows);
        let writer = ParquetWriter::new();

        group.bench_function(format!("{}_rows", rows), |b| {
            b.iter(|| {
                let _ = black_box(writer.write_batches(std::slice::from_ref(&batch)).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_remote_write_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("remote_write_convert");
    let converter = RemoteWriteConverter::default();

    for series in [100, 1_000] {
        let payload = encode_compressed(&create_write_request(series, 10)).unwrap();
        group.throughput(Throughput::Elements((series * 10) as u64));

        group.bench_function(format!("{}_series", series), |b| {
            b.iter(|| {
                let _ = black_box(converter.convert_write_request(&payload).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_streaming_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming_ingest");
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let ingestor = StreamingIngestor::new(IngesterConfig::default(), None);

    let batches: Vec<RecordBatch> = (0..20).map(|_| create_test_batch(5_000)).collect();
    group.throughput(Throughput::Elements(100_000));

    group.bench_function("20x5000_rows", |b| {
        b.to_async(&runtime).iter(|| async {
            let request = IngestRequest::new(
                "bench",
                "metrics",
                BatchSource::Batches(batches.clone()),
                dir.path(),
            )
            .with_flush_every(5);
            black_box(ingestor.ingest(request).await.unwrap())
        });
    });

    group.finish();
}

fn benchmark_compression_ratio(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression");

    for rows in [10_000, 100_000] {
        let batch = create_test_batch(rows);
        let writer = ParquetWriter::new();

        let uncompressed_size = batch.get_array_memory_size();
        let compressed = writer.write_batches(std::slice::from_ref(&batch)).unwrap();
        let ratio = uncompressed_size as f64 / compressed.len() as f64;

        println!(
            "Rows: {}, Uncompressed: {} bytes, Compressed: {} bytes, Ratio: {:.2}x",
            rows,
            uncompressed_size,
            compressed.len(),
            ratio
        );

        group.bench_function(format!("{}_rows", rows), |b| {
            b.iter(|| {
                let _ = black_box(writer.write_batches(std::slice::from_ref(&batch)).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_parquet_write,
    benchmark_remote_write_convert,
    benchmark_streaming_ingest,
    benchmark_compression_ratio,
);

criterion_main!(benches);
