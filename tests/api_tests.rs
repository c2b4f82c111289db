//! HTTP API tests against a live server on an ephemeral port

use arrowsink::api::{build_http_router, ApiState};
use arrowsink::catalog::{CatalogClient, LocalCatalog};
use arrowsink::config::IngestConfig;
use arrowsink::ingester::ArrowIpcCodec;
use arrowsink::remote_write::headers::{BYTES_RECEIVED_HEADER, STATUS_HEADER};
use arrowsink::remote_write::proto::{encode_compressed, Label, Sample, TimeSeries, WriteRequest};

use arrow_array::{Int64Array, RecordBatch};
use arrow_schema::{DataType, Field, Schema};
use futures::stream;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

struct TestServer {
    addr: SocketAddr,
    catalog: Arc<LocalCatalog>,
    dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    async fn start_with(customize: impl FnOnce(&mut IngestConfig)) -> Self {
        let dir = tempdir().unwrap();
        let mut config = IngestConfig {
            storage_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        customize(&mut config);

        let catalog = Arc::new(LocalCatalog::new());
        let client: Arc<dyn CatalogClient> = catalog.clone();
        let router = build_http_router(ApiState::new(config, Some(client)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, catalog, dir }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }
}

fn sample_request() -> WriteRequest {
    WriteRequest {
        timeseries: vec![TimeSeries {
            labels: vec![
                Label {
                    name: "__name__".to_string(),
                    value: "up".to_string(),
                },
                Label {
                    name: "job".to_string(),
                    value: "node".to_string(),
                },
            ],
            samples: (0..5)
                .map(|i| Sample {
                    value: i as f64,
                    timestamp: 1_700_000_000_000 + i * 1_000,
                })
                .collect(),
            ..Default::default()
        }],
        metadata: vec![],
    }
}

/// An IPC stream body of `batches` two-row batches
async fn arrow_stream_body(batches: i64) -> Vec<u8> {
    let scratch = tempdir().unwrap();
    let path = scratch.path().join("upload.arrows");
    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
    let batches: Vec<RecordBatch> = (0..batches)
        .map(|i| {
            RecordBatch::try_new(
                schema.clone(),
                vec![Arc::new(Int64Array::from(vec![i * 10, i * 10 + 1]))],
            )
            .unwrap()
        })
        .collect();
    ArrowIpcCodec::new()
        .write_stream(stream::iter(batches), &path)
        .await
        .unwrap();
    tokio::fs::read(&path).await.unwrap()
}

fn remote_write(client: &reqwest::Client, url: String, body: Vec<u8>) -> reqwest::RequestBuilder {
    client
        .post(url)
        .header("Content-Type", "application/x-protobuf")
        .header("Content-Encoding", "snappy")
        .header("X-Prometheus-Remote-Write-Version", "0.1.0")
        .body(body)
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;

    let resp = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_remote_write_success() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let body = encode_compressed(&sample_request()).unwrap();
    let body_len = body.len();

    let resp = remote_write(&client, server.url("/api/v1/stream/prometheus/prom"), body)
        .header("X-Scope-OrgID", "acme")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()[STATUS_HEADER], "success");
    assert_eq!(
        resp.headers()[BYTES_RECEIVED_HEADER],
        body_len.to_string().as_str()
    );

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["total_rows"], 5);
    assert_eq!(json["files_written"], 1);
    assert_eq!(json["unique_metrics"], 1);

    let dataset_dir = server.root().join("accounts/acme/datasets/prom");
    assert!(dataset_dir.join("stream_00001.parquet").exists());
    assert_eq!(
        server.catalog.dataset_glob("prom"),
        Some(dataset_dir.join("*.parquet").display().to_string())
    );
}

#[tokio::test]
async fn test_remote_write_query_overrides_batch_size() {
    let server = TestServer::start_with(|c| c.flush_every_n_batches = 1).await;
    let client = reqwest::Client::new();
    let body = encode_compressed(&sample_request()).unwrap();

    let resp = remote_write(
        &client,
        server.url("/api/v1/stream/prometheus/prom?batch_size=2"),
        body,
    )
    .send()
    .await
    .unwrap();

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["total_batches"], 3);
    assert_eq!(json["files_written"], 3);
}

#[tokio::test]
async fn test_remote_write_zero_batch_size_is_client_error() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let body = encode_compressed(&sample_request()).unwrap();

    let resp = remote_write(
        &client,
        server.url("/api/v1/stream/prometheus/prom?batch_size=0"),
        body,
    )
    .send()
    .await
    .unwrap();

    assert_eq!(resp.status(), 400);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert!(json["error"].as_str().unwrap().contains("batch_size"));
    assert!(!server.root().join("accounts/default/datasets/prom").exists());
}

#[tokio::test]
async fn test_remote_write_wrong_content_type() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/v1/stream/prometheus/prom"))
        .header("Content-Type", "application/json")
        .header("Content-Encoding", "snappy")
        .body(encode_compressed(&sample_request()).unwrap())
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert!(json["error"].as_str().unwrap().contains("Content-Type"));
}

#[tokio::test]
async fn test_remote_write_undecodable_body() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = remote_write(
        &client,
        server.url("/api/v1/stream/prometheus/prom"),
        b"not snappy at all".to_vec(),
    )
    .send()
    .await
    .unwrap();

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_remote_write_invalid_request() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = remote_write(
        &client,
        server.url("/api/v1/stream/prometheus/prom"),
        encode_compressed(&WriteRequest::default()).unwrap(),
    )
    .send()
    .await
    .unwrap();

    assert_eq!(resp.status(), 400);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert!(json["error"].as_str().unwrap().contains("no time series"));
}

#[tokio::test]
async fn test_remote_write_oversized_body() {
    let server = TestServer::start_with(|c| c.max_request_bytes = 64).await;
    let client = reqwest::Client::new();

    let resp = remote_write(
        &client,
        server.url("/api/v1/stream/prometheus/prom"),
        vec![0u8; 1024],
    )
    .send()
    .await
    .unwrap();

    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn test_arrow_stream_upload() {
    let server = TestServer::start_with(|c| c.flush_every_n_batches = 2).await;
    let body = arrow_stream_body(3).await;

    let resp = reqwest::Client::new()
        .post(server.url("/api/v1/stream/events"))
        .header("Content-Type", "application/vnd.apache.arrow.stream")
        .header("X-Account-ID", "acme")
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["total_rows"], 6);
    assert_eq!(json["files_written"], 2);
    assert!(server
        .root()
        .join("accounts/acme/datasets/events/stream_00002.parquet")
        .exists());
}

#[tokio::test]
async fn test_arrow_stream_rejects_garbage() {
    let server = TestServer::start().await;

    let resp = reqwest::Client::new()
        .post(server.url("/api/v1/stream/events"))
        .body("this is not arrow")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    assert!(server.catalog.registrations().is_empty());
}

#[tokio::test]
async fn test_arrow_stream_rejects_empty_body() {
    let server = TestServer::start().await;

    let resp = reqwest::Client::new()
        .post(server.url("/api/v1/stream/events"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_arrow_stream_query_overrides_flush_count() {
    let server = TestServer::start_with(|c| c.flush_every_n_batches = 10).await;

    let resp = reqwest::Client::new()
        .post(server.url(
            "/api/v1/stream/events?batch_flush_count=1&max_buffer_size_mb=8&max_queue_depth=2",
        ))
        .body(arrow_stream_body(3).await)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["total_rows"], 6);
    assert_eq!(json["files_written"], 3);
    assert!(json["max_queue_depth"].as_u64().unwrap() <= 2);
}

#[tokio::test]
async fn test_arrow_stream_rejects_out_of_range_params() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    for query in [
        "batch_flush_count=0",
        "max_buffer_size_mb=1001",
        "max_queue_depth=0",
    ] {
        let resp = client
            .post(server.url(&format!("/api/v1/stream/events?{}", query)))
            .body(arrow_stream_body(1).await)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "query {}", query);
    }
    assert!(server.catalog.registrations().is_empty());
}

#[tokio::test]
async fn test_dataset_status_reports_stored_files() {
    let server = TestServer::start_with(|c| c.flush_every_n_batches = 1).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/v1/stream/events"))
        .header("X-Account-ID", "acme")
        .body(arrow_stream_body(2).await)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(server.url("/api/v1/stream/events/status"))
        .header("X-Account-ID", "acme")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    let dataset_dir = server.root().join("accounts/acme/datasets/events");
    let expected_bytes: u64 = ["stream_00001.parquet", "stream_00002.parquet"]
        .iter()
        .map(|name| std::fs::metadata(dataset_dir.join(name)).unwrap().len())
        .sum();
    assert_eq!(json["dataset_name"], "events");
    assert_eq!(json["status"], "ready");
    assert_eq!(json["files_count"], 2);
    assert_eq!(json["total_bytes"], expected_bytes);
    assert_eq!(json["storage_path"], dataset_dir.display().to_string());
    assert!(json["updated_at"].is_string());
}

#[tokio::test]
async fn test_dataset_status_unknown_dataset_is_not_found() {
    let server = TestServer::start().await;

    let resp = reqwest::get(server.url("/api/v1/stream/missing/status"))
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert!(json["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_formats_lists_both_endpoints() {
    let server = TestServer::start_with(|c| c.max_queue_depth = 7).await;

    let resp = reqwest::get(server.url("/api/v1/stream/formats")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    let formats: Vec<&str> = json["formats"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["format"].as_str().unwrap())
        .collect();
    assert_eq!(formats, vec!["arrow", "prometheus"]);
    assert_eq!(json["buffer_config"]["default_max_queue_depth"], 7);
    assert_eq!(json["buffer_config"]["max_queue_depth"], 1000);
}
