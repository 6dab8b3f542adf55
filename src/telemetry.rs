//! Telemetry and structured logging for the conversion worker.

use crate::job::JobResult;
use crate::runner::RunSummary;
use opentelemetry::trace::{Span, Tracer};
use opentelemetry::{global, KeyValue};
use tracing::{info, warn};

const TRACER_NAME: &str = "pdf-convert-worker";

/// Jobs slower than this are reported as exceeding the performance threshold.
const SLOW_JOB_MS: i64 = 5000;

/// Records telemetry for one handled message.
///
/// Emits a `pdf_convert_job` span and a structured log line. `action` is the
/// raw token from the message so rejected jobs are reported too.
pub fn record_job_telemetry(action: &str, task_id: Option<&str>, result: &JobResult, duration_ms: i64) {
    let tracer = global::tracer(TRACER_NAME);
    let mut span = tracer.start("pdf_convert_job");

    let task_id = task_id.unwrap_or_default();
    span.set_attribute(KeyValue::new("action", action.to_string()));
    span.set_attribute(KeyValue::new("task_id", task_id.to_string()));
    span.set_attribute(KeyValue::new("success", result.success));
    span.set_attribute(KeyValue::new("duration_ms", duration_ms));

    if result.success {
        span.set_attribute(KeyValue::new("output_url", result.output_url.clone()));
        info!(
            task_id = %task_id,
            action = %action,
            duration_ms = duration_ms,
            output_url = %result.output_url,
            "PDF conversion job completed"
        );
    } else {
        span.set_attribute(KeyValue::new("error", result.error_detail.clone()));
        warn!(
            task_id = %task_id,
            action = %action,
            duration_ms = duration_ms,
            error = %result.error_detail,
            "PDF conversion job failed"
        );
    }

    if duration_ms > SLOW_JOB_MS {
        warn!(
            task_id = %task_id,
            duration_ms = duration_ms,
            "PDF conversion exceeded performance threshold ({}ms)",
            SLOW_JOB_MS
        );
    }

    span.end();
}

/// Records the totals of a finished run.
pub fn record_run_summary(summary: &RunSummary) {
    let tracer = global::tracer(TRACER_NAME);
    let mut span = tracer.start("worker_shutdown");

    span.set_attribute(KeyValue::new("received", summary.received as i64));
    span.set_attribute(KeyValue::new("succeeded", summary.succeeded as i64));
    span.set_attribute(KeyValue::new("failed", summary.failed as i64));
    span.set_attribute(KeyValue::new("queue_errors", summary.queue_errors as i64));
    span.end();

    info!(
        received = summary.received,
        succeeded = summary.succeeded,
        failed = summary.failed,
        queue_errors = summary.queue_errors,
        "Finished work, shutting down"
    );
}

/// Initializes OpenTelemetry with OTLP exporter.
///
/// This should be called once at worker startup, inside the tokio runtime.
/// Reads configuration from environment variables:
/// - `OTEL_EXPORTER_OTLP_ENDPOINT` - Collector endpoint (default: http://localhost:4317)
/// - `OTEL_SERVICE_NAME` - Service name (default: pdf-convert-worker)
pub fn init_telemetry() -> Result<(), Box<dyn std::error::Error>> {
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::Config;

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| TRACER_NAME.to_string());

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&endpoint),
        )
        .with_trace_config(Config::default().with_resource(
            opentelemetry_sdk::Resource::new(vec![
                KeyValue::new("service.name", service_name),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    if let Some(provider) = tracer.provider() {
        global::set_tracer_provider(provider);
    }

    info!("Telemetry initialized: endpoint={}", endpoint);
    Ok(())
}

/// Flushes pending spans.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without init_telemetry the global provider is a no-op; these only
    // check that recording never panics.

    #[test]
    fn test_record_job_telemetry() {
        record_job_telemetry("ToText", Some("T1"), &JobResult::success("https://b/o"), 12);
    }

    #[test]
    fn test_record_failed_job() {
        record_job_telemetry("ToPng", None, &JobResult::failure("unsupported action 'ToPng'"), 6000);
    }

    #[test]
    fn test_record_run_summary() {
        record_run_summary(&RunSummary {
            received: 3,
            succeeded: 2,
            failed: 1,
            queue_errors: 0,
        });
    }
}
