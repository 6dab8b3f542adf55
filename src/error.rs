//! Error taxonomy for the conversion worker.
//!
//! Every failure that can happen while handling a single job is folded into
//! [`JobError`], which the runner turns into a failure notification. Only
//! [`QueueError`] raised while *receiving* is allowed to stop the worker.

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::put_object::PutObjectError;
use std::time::Duration;
use thiserror::Error;

/// Source document could not be retrieved or is not a PDF.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to fetch {url}: server responded with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("document at {url} is not a valid PDF: {detail}")]
    InvalidPdf { url: String, detail: String },

    #[error("fetching {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },
}

/// The PDF was fetched but could not be turned into the requested output.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("text extraction failed: {0}")]
    Text(#[from] lopdf::Error),

    #[error("page rendering failed: {0}")]
    Render(String),

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("pdfium library unavailable: {0}")]
    Library(String),

    #[error("conversion task failed: {0}")]
    Task(String),

    #[error("conversion timed out after {0:?}")]
    Timeout(Duration),
}

/// Object storage rejected or did not complete a write.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to upload {bucket}/{key}: {detail}")]
    Write {
        bucket: String,
        key: String,
        detail: String,
    },

    /// S3 request failure. `detail` carries the full error chain, since the
    /// SDK's own `Display` often reduces it to "unhandled error".
    #[error("failed to upload {bucket}/{key}: {detail}")]
    S3 {
        bucket: String,
        key: String,
        detail: String,
        #[source]
        source: Box<SdkError<PutObjectError, HttpResponse>>,
    },

    #[error("upload of {key} timed out after {after:?}")]
    Timeout { key: String, after: Duration },
}

/// Message queue failures.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("failed to decode queue message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode queue message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("queue operation '{op}' timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
}

/// Everything that can go wrong with one job.
///
/// The `Display` text of this error is what ends up in the failure
/// notification sent back to the submitter.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("unsupported action '{0}'")]
    UnsupportedAction(String),

    #[error("message is missing the '{0}' attribute")]
    MissingAttribute(&'static str),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl JobError {
    /// Short machine-friendly label used in logs and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::UnsupportedAction(_) => "unsupported_action",
            JobError::MissingAttribute(_) => "missing_attribute",
            JobError::Fetch(_) => "fetch",
            JobError::Conversion(_) => "conversion",
            JobError::Upload(_) => "upload",
        }
    }
}
