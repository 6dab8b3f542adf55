//! PDF Conversion Worker Library
//!
//! Core of a queue worker that turns PDFs into JPEG images, HTML or plain
//! text. Each job names an action and a source URL; the worker fetches the
//! document, converts it, uploads the result to object storage and answers
//! on an output queue, tagging the answer with the job's task id.
//!
//! ## Module Overview
//!
//! - `config`: command line and environment configuration
//! - `converter`: PDF to text/HTML (lopdf) and first-page JPEG (pdfium)
//! - `error`: error taxonomy
//! - `fetch`: HTTP retrieval and validation of source PDFs
//! - `job`: job decoding, results and notification formatting
//! - `queue`: queue client trait and Redis implementation
//! - `runner`: the sequential poll/convert/upload/notify loop
//! - `storage`: object store trait and S3 implementation
//! - `telemetry`: OpenTelemetry integration and structured logging
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pdf_convert_worker::{
//!     converter::{DocumentConverter, PdfConverter},
//!     fetch::{HttpPdfSource, PdfSource},
//!     job::Action,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = HttpPdfSource::new(Duration::from_secs(30));
//!     let pdf = source.fetch("https://example.com/doc.pdf").await.unwrap();
//!
//!     let artifact = PdfConverter::default()
//!         .convert(Action::ToText, &pdf)
//!         .unwrap();
//!     println!("{}", String::from_utf8_lossy(&artifact.bytes));
//! }
//! ```

pub mod config;
pub mod converter;
pub mod error;
pub mod fetch;
pub mod job;
pub mod queue;
pub mod runner;
pub mod storage;
pub mod telemetry;
