//! Arrowsink binary
//!
//! `serve` receives Prometheus remote-write and Arrow IPC streams over HTTP.
//! `ingest` and `validate` work on a local Arrow IPC stream file.

use arrowsink::api::{self, ApiState};
use arrowsink::config::{ComponentFactory, IngestConfig};
use arrowsink::ingester::{ArrowIpcCodec, BatchSource, IngestRequest, StreamingIngestor};
use arrowsink::telemetry::Telemetry;
use arrowsink::Error;

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

/// Arrowsink ingestion server and tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP ingestion server
    Serve(ServeArgs),
    /// Ingest one Arrow IPC stream file into Parquet
    Ingest(IngestArgs),
    /// Read and check an Arrow IPC stream file without writing anything
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// HTTP API port
    #[arg(long, env = "ARROWSINK_HTTP_PORT", default_value = "8080")]
    http_port: u16,

    /// Overrides ARROWSINK_STORAGE_ROOT
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// Overrides ARROWSINK_FLUSH_EVERY_N_BATCHES
    #[arg(long)]
    flush_every_n_batches: Option<usize>,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Arrow IPC stream file to ingest
    source: PathBuf,

    /// Dataset the files are registered under
    #[arg(long)]
    dataset: String,

    /// Account the data belongs to
    #[arg(long, env = "ARROWSINK_DEFAULT_ACCOUNT", default_value = "default")]
    account: String,

    /// Overrides ARROWSINK_STORAGE_ROOT
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// Overrides ARROWSINK_FLUSH_EVERY_N_BATCHES
    #[arg(long)]
    flush_every_n_batches: Option<usize>,

    /// Overrides ARROWSINK_MAX_BUFFER_BYTES
    #[arg(long)]
    max_buffer_bytes: Option<usize>,

    /// Overrides ARROWSINK_MAX_QUEUE_DEPTH
    #[arg(long)]
    max_queue_depth: Option<usize>,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Arrow IPC stream file to check
    source: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let _telemetry = Telemetry::init_for_component("arrowsink")?;

    match cli.command {
        Command::Serve(args) => serve(args).await?,
        Command::Ingest(args) => ingest(args).await?,
        Command::Validate(args) => validate(args).await?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Arrowsink");

    let mut config = IngestConfig::from_env()?;
    if let Some(root) = args.storage_root {
        config.storage_root = root;
    }
    if let Some(n) = args.flush_every_n_batches {
        config.flush_every_n_batches = n;
    }
    config.validate()?;

    tokio::fs::create_dir_all(&config.storage_root).await?;
    info!(
        storage_root = %config.storage_root.display(),
        flush_every_n_batches = config.flush_every_n_batches,
        max_queue_depth = config.max_queue_depth,
        max_request_bytes = config.max_request_bytes,
        "Ingest configuration"
    );

    let catalog = ComponentFactory::create_catalog()?;
    let router = api::build_http_router(ApiState::new(config, catalog));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.http_port));
    let listener = TcpListener::bind(addr).await?;
    info!(http_port = args.http_port, "Arrowsink ready");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(format!("HTTP server error: {e}")))?;

    info!("Arrowsink shutting down");
    Ok(())
}

async fn ingest(args: IngestArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = IngestConfig::from_env()?;
    if let Some(root) = args.storage_root {
        config.storage_root = root;
    }
    if let Some(n) = args.flush_every_n_batches {
        config.flush_every_n_batches = n;
    }
    if let Some(bytes) = args.max_buffer_bytes {
        config.max_buffer_bytes = bytes;
    }
    if let Some(depth) = args.max_queue_depth {
        config.max_queue_depth = depth;
    }
    config.validate()?;

    let storage_root = config
        .storage_layout()
        .dataset_dir(&args.account, &args.dataset)?;
    let catalog = ComponentFactory::create_catalog()?;
    let ingestor = StreamingIngestor::new(config.ingester_config(), catalog);

    let request = IngestRequest::new(
        args.account,
        args.dataset,
        BatchSource::IpcFile(args.source),
        storage_root,
    );
    let metrics = ingestor.ingest(request).await?;

    info!(
        total_rows = metrics.total_rows,
        files_written = metrics.files_written,
        duration_seconds = metrics.duration_seconds,
        "Ingestion finished"
    );
    for file in &metrics.files {
        println!("{}", file.display());
    }
    Ok(())
}

async fn validate(args: ValidateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let stream = ArrowIpcCodec::new().read_stream(&args.source).await?;
    let schema = stream.schema();
    ArrowIpcCodec::validate_schema(&schema)?;

    let (batches, rows) = stream.count_remaining().await?;

    info!(
        path = %args.source.display(),
        fields = schema.fields().len(),
        batches,
        rows,
        "IPC stream is valid"
    );
    println!("{} fields, {} batches, {} rows", schema.fields().len(), batches, rows);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
