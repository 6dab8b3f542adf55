//! Startup configuration. Every option can be given as a flag or through
//! its environment variable.

use crate::converter::DEFAULT_IMAGE_DPI;
use crate::runner::RunnerSettings;
use crate::storage::S3Settings;
use clap::Parser;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "pdf-convert-worker", version, about)]
pub struct WorkerConfig {
    /// Queue to take conversion jobs from
    #[arg(env = "INPUT_QUEUE")]
    pub input_queue: String,

    /// Queue that receives completion and failure notifications
    #[arg(env = "OUTPUT_QUEUE")]
    pub output_queue: String,

    /// Bucket converted artifacts are uploaded to
    #[arg(env = "BUCKET")]
    pub bucket: String,

    /// Redis connection string
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1/")]
    pub redis_url: String,

    /// Seconds to wait for a message before treating the queue as empty
    #[arg(long, env = "RECEIVE_WAIT_SECS", default_value_t = 0)]
    pub receive_wait_secs: u64,

    /// Upper bound in seconds for each fetch, conversion, upload and queue call
    #[arg(long, env = "CALL_TIMEOUT_SECS", default_value_t = 60)]
    pub call_timeout_secs: u64,

    #[arg(long, env = "S3_REGION", default_value = "us-east-1")]
    pub s3_region: String,

    /// Endpoint of an S3-compatible store
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    #[arg(long, env = "S3_FORCE_PATH_STYLE")]
    pub s3_force_path_style: bool,

    #[arg(long, env = "S3_ACCESS_KEY")]
    pub s3_access_key: Option<String>,

    #[arg(long, env = "S3_SECRET_KEY", hide_env_values = true)]
    pub s3_secret_key: Option<String>,

    /// Base URL reported for uploaded objects instead of the S3 URL
    #[arg(long, env = "PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Resolution used when rendering ToImage output
    #[arg(
        long,
        env = "IMAGE_DPI",
        default_value_t = DEFAULT_IMAGE_DPI,
        value_parser = clap::value_parser!(u32).range(1..=1200)
    )]
    pub image_dpi: u32,

    /// Directory containing libpdfium
    #[arg(long, env = "PDFIUM_PATH")]
    pub pdfium_path: Option<String>,
}

impl WorkerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            region: self.s3_region.clone(),
            endpoint: self.s3_endpoint.clone(),
            force_path_style: self.s3_force_path_style,
            public_base_url: self.public_base_url.clone(),
            access_key: self.s3_access_key.clone(),
            secret_key: self.s3_secret_key.clone(),
        }
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            input_queue: self.input_queue.clone(),
            output_queue: self.output_queue.clone(),
            bucket: self.bucket.clone(),
            call_timeout: self.call_timeout(),
            receive_timeout: self.call_timeout() + Duration::from_secs(self.receive_wait_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_arguments() {
        let config = WorkerConfig::try_parse_from(["worker", "jobs", "results", "my-bucket"]).unwrap();

        assert_eq!(config.input_queue, "jobs");
        assert_eq!(config.output_queue, "results");
        assert_eq!(config.bucket, "my-bucket");
        assert_eq!(config.image_dpi, 256);

        let settings = config.runner_settings();
        assert_eq!(settings.bucket, "my-bucket");
    }

    #[test]
    fn test_overrides() {
        let config = WorkerConfig::try_parse_from([
            "worker",
            "jobs",
            "results",
            "bucket",
            "--call-timeout-secs",
            "5",
            "--s3-endpoint",
            "http://localhost:9000",
            "--s3-force-path-style",
            "--receive-wait-secs",
            "20",
        ])
        .unwrap();

        assert_eq!(config.call_timeout(), Duration::from_secs(5));
        assert_eq!(config.runner_settings().receive_timeout, Duration::from_secs(25));

        let s3 = config.s3_settings();
        assert_eq!(s3.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(s3.force_path_style);
    }

    #[test]
    fn test_image_dpi_bounds() {
        let parse = |dpi: &str| {
            WorkerConfig::try_parse_from(["worker", "jobs", "results", "bucket", "--image-dpi", dpi])
        };

        assert_eq!(parse("300").unwrap().image_dpi, 300);
        assert_eq!(parse("1200").unwrap().image_dpi, 1200);
        assert!(parse("0").is_err());
        assert!(parse("5000").is_err());
    }

    #[test]
    fn test_static_credentials_passed_through() {
        let config = WorkerConfig::try_parse_from([
            "worker",
            "jobs",
            "results",
            "bucket",
            "--s3-access-key",
            "AKIA",
            "--s3-secret-key",
            "secret",
        ])
        .unwrap();

        let s3 = config.s3_settings();
        assert_eq!(s3.access_key.as_deref(), Some("AKIA"));
        assert_eq!(s3.secret_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_missing_bucket_rejected() {
        assert!(WorkerConfig::try_parse_from(["worker", "jobs", "results"]).is_err());
    }
}
