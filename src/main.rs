//! PDF Conversion Worker Service
//!
//! Drains a Redis job queue, converting each referenced PDF and publishing
//! the result to S3, then exits once the queue is empty.
//!
//! ## Architecture
//!
//! - **Input queue**: Redis list of jobs (`action`, `file_url`, `task_id`)
//! - **Output queue**: Redis list of `"{action}:{url}\t{result}\n"` notifications
//! - **Storage**: S3 bucket, objects under `output/` with public-read ACL
//! - **Telemetry**: OpenTelemetry OTLP export
//!
//! ## Configuration
//!
//! See `pdf-convert-worker --help`. Besides the flags:
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP collector endpoint
//! - `RUST_LOG`: Log level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use pdf_convert_worker::{
    config::WorkerConfig,
    converter::PdfConverter,
    fetch::HttpPdfSource,
    queue::RedisQueue,
    runner::{JobRunner, WorkerContext},
    storage::S3ObjectStore,
    telemetry,
};
use redis::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::parse();

    // Initialize OpenTelemetry
    if let Err(e) = telemetry::init_telemetry() {
        warn!("Failed to initialize telemetry: {}", e);
    }

    info!("Starting PDF conversion worker");
    info!(
        "Configuration: input_queue={}, output_queue={}, bucket={}, redis_url={}",
        config.input_queue, config.output_queue, config.bucket, config.redis_url
    );

    // Connect to Redis
    let client = Client::open(config.redis_url.as_str())
        .context("Failed to create Redis client")?;
    let conn = redis::aio::ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;

    info!("Connected to Redis");

    let queue = RedisQueue::new(conn, config.receive_wait_secs);
    let requeued = queue
        .requeue_in_flight(&config.input_queue)
        .await
        .context("Failed to requeue in-flight messages")?;
    if requeued > 0 {
        warn!("Recovered {} messages left over from a previous run", requeued);
    }

    let ctx = WorkerContext {
        queue: Arc::new(queue),
        store: Arc::new(S3ObjectStore::new(config.s3_settings()).await),
        source: Arc::new(HttpPdfSource::new(config.call_timeout())),
        converter: Arc::new(PdfConverter::new(config.image_dpi, config.pdfium_path.clone())),
    };

    let runner = JobRunner::new(ctx, config.runner_settings());
    let result = runner.run().await;

    telemetry::shutdown_telemetry();

    let summary = result.context("Worker stopped on a queue error")?;
    info!(
        "Worker shutdown complete: received={}, succeeded={}, failed={}",
        summary.received, summary.succeeded, summary.failed
    );
    Ok(())
}
