//! Retrieval of source PDFs.

use crate::error::FetchError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info};

/// A fetched document that has been checked to parse as a PDF.
#[derive(Debug, Clone)]
pub struct SourcePdf {
    pub bytes: Bytes,
    pub page_count: usize,
}

impl SourcePdf {
    /// Validates `bytes` as a PDF with at least one page.
    pub fn parse(url: &str, bytes: Bytes) -> Result<Self, FetchError> {
        let invalid = |detail: String| FetchError::InvalidPdf {
            url: url.to_string(),
            detail,
        };

        if !bytes.starts_with(b"%PDF-") {
            let head = String::from_utf8_lossy(&bytes[..bytes.len().min(8)]).into_owned();
            return Err(invalid(format!("missing %PDF header (starts with {:?})", head)));
        }

        let doc = lopdf::Document::load_mem(&bytes).map_err(|e| invalid(e.to_string()))?;
        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(invalid("document has no pages".to_string()));
        }

        Ok(Self { bytes, page_count })
    }
}

/// Where source documents come from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PdfSource: Send + Sync {
    /// Retrieves the document at `url` and checks that it is a usable PDF.
    ///
    /// # Returns
    /// The document bytes with their page count, or a [`FetchError`] for an
    /// unreachable host, a non-2xx status, or a body that is not a PDF.
    async fn fetch(&self, url: &str) -> Result<SourcePdf, FetchError>;
}

/// Fetches documents over HTTP(S).
#[derive(Clone)]
pub struct HttpPdfSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPdfSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn request_error(&self, url: &str, source: reqwest::Error) -> FetchError {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                after: self.timeout,
            }
        } else {
            FetchError::Request {
                url: url.to_string(),
                source,
            }
        }
    }
}

#[async_trait]
impl PdfSource for HttpPdfSource {
    async fn fetch(&self, url: &str) -> Result<SourcePdf, FetchError> {
        info!("Fetching document: url={}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let pdf = SourcePdf::parse(url, bytes)?;
        debug!(
            "Fetched document: url={}, bytes={}, pages={}",
            url,
            pdf.bytes.len(),
            pdf.page_count
        );
        Ok(pdf)
    }
}
