//! The poll, convert, upload, notify, acknowledge loop.

use crate::converter::DocumentConverter;
use crate::error::{ConversionError, FetchError, JobError, QueueError, UploadError};
use crate::fetch::PdfSource;
use crate::job::{Job, JobResult, Notification, ATTR_ACTION, ATTR_TASK_ID};
use crate::queue::{QueueClient, ReceivedMessage};
use crate::storage::ObjectStore;
use crate::telemetry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Collaborators the runner drives. Built once at startup.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<dyn QueueClient>,
    pub store: Arc<dyn ObjectStore>,
    pub source: Arc<dyn PdfSource>,
    pub converter: Arc<dyn DocumentConverter>,
}

/// Queue and bucket names plus call bounds.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub input_queue: String,
    pub output_queue: String,
    pub bucket: String,
    /// Bound for every fetch, conversion, upload, send and delete.
    pub call_timeout: Duration,
    /// Bound for a receive, which may block on the queue first.
    pub receive_timeout: Duration,
}

/// Totals for one run of the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Undecodable envelopes and failed sends or deletes.
    pub queue_errors: usize,
}

/// Sequential job consumer.
///
/// One message is in flight at a time. Every received message gets exactly
/// one notification attempt followed by exactly one delete attempt.
pub struct JobRunner {
    ctx: WorkerContext,
    settings: RunnerSettings,
}

impl JobRunner {
    pub fn new(ctx: WorkerContext, settings: RunnerSettings) -> Self {
        Self { ctx, settings }
    }

    /// Processes messages until the input queue is empty.
    ///
    /// Per-job failures are reported to the output queue and never end the
    /// run. Only a failure to receive from the queue is returned as an error.
    ///
    /// # Returns
    /// Counts of received, succeeded and failed jobs plus queue errors that
    /// were logged and skipped.
    pub async fn run(&self) -> Result<RunSummary, QueueError> {
        let mut summary = RunSummary::default();

        info!("Receiving messages from {}", self.settings.input_queue);

        loop {
            let received = match self.receive().await {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(QueueError::Decode(e)) => {
                    warn!("Discarding undecodable message: {}", e);
                    summary.queue_errors += 1;
                    continue;
                }
                Err(e) => {
                    error!("Failed to receive from {}: {}", self.settings.input_queue, e);
                    return Err(e);
                }
            };

            summary.received += 1;
            self.handle_message(&received, &mut summary).await;
        }

        telemetry::record_run_summary(&summary);
        Ok(summary)
    }

    /// Fetches, converts and uploads one job.
    ///
    /// # Arguments
    /// * `job` - Decoded job; its action and source URL pick the conversion
    ///   and its object key
    ///
    /// # Returns
    /// The public URL of the uploaded artifact. Each step is bounded by the
    /// call timeout and a timeout surfaces as that step's error.
    pub async fn process_job(&self, job: &Job) -> Result<String, JobError> {
        let limit = self.settings.call_timeout;

        let pdf = timeout(limit, self.ctx.source.fetch(&job.source_url))
            .await
            .map_err(|_| FetchError::Timeout {
                url: job.source_url.clone(),
                after: limit,
            })??;

        let converter = Arc::clone(&self.ctx.converter);
        let action = job.action;
        let artifact = timeout(
            limit,
            tokio::task::spawn_blocking(move || converter.convert(action, &pdf)),
        )
        .await
        .map_err(|_| ConversionError::Timeout(limit))?
        .map_err(|e| ConversionError::Task(e.to_string()))??;

        let key = job.object_key();
        let url = timeout(limit, self.ctx.store.upload(&self.settings.bucket, &key, artifact))
            .await
            .map_err(|_| UploadError::Timeout {
                key: key.clone(),
                after: limit,
            })??;

        Ok(url)
    }

    async fn handle_message(&self, received: &ReceivedMessage, summary: &mut RunSummary) {
        let started = Instant::now();
        let message = &received.message;
        debug!("Processing message: id={}", message.id);

        let (notification, result) = match Job::from_message(message) {
            Ok(job) => {
                info!(
                    "Performing task: task_id={}, action={}, url={}",
                    job.task_id, job.action, job.source_url
                );

                let result = match self.process_job(&job).await {
                    Ok(output_url) => JobResult::success(output_url),
                    Err(e) => {
                        error!("Job failed: task_id={}, kind={}, error={}", job.task_id, e.kind(), e);
                        JobResult::failure(e.to_string())
                    }
                };
                (Notification::for_result(&job, &result), result)
            }
            Err(e) => {
                warn!("Rejected message: id={}, error={}", message.id, e);
                (Notification::for_rejected(message, &e), JobResult::failure(e.to_string()))
            }
        };

        if result.success {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
        }

        if let Err(e) = self.notify(notification).await {
            error!("Failed to send notification for message {}: {}", message.id, e);
            summary.queue_errors += 1;
        }

        if let Err(e) = self.acknowledge(received).await {
            error!("Failed to delete message {}: {}", message.id, e);
            summary.queue_errors += 1;
        }

        telemetry::record_job_telemetry(
            message.attribute(ATTR_ACTION).unwrap_or_default(),
            message.attribute(ATTR_TASK_ID),
            &result,
            started.elapsed().as_millis() as i64,
        );
    }

    async fn receive(&self) -> Result<Option<ReceivedMessage>, QueueError> {
        let limit = self.settings.receive_timeout;
        timeout(limit, self.ctx.queue.receive_one(&self.settings.input_queue))
            .await
            .map_err(|_| QueueError::Timeout {
                op: "receive",
                after: limit,
            })?
    }

    async fn notify(&self, notification: Notification) -> Result<(), QueueError> {
        let limit = self.settings.call_timeout;
        let message = notification.into_message();
        timeout(limit, self.ctx.queue.send_message(&self.settings.output_queue, message))
            .await
            .map_err(|_| QueueError::Timeout {
                op: "send",
                after: limit,
            })?
    }

    async fn acknowledge(&self, received: &ReceivedMessage) -> Result<(), QueueError> {
        let limit = self.settings.call_timeout;
        timeout(limit, self.ctx.queue.delete(&self.settings.input_queue, received))
            .await
            .map_err(|_| QueueError::Timeout {
                op: "delete",
                after: limit,
            })?
    }
}
