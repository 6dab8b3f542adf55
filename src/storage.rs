//! Object storage for converted artifacts.

use crate::converter::Artifact;
use crate::error::UploadError;
use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region, SharedCredentialsProvider};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::ObjectCannedAcl;
use tracing::info;

/// Public-read object storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `artifact` under `key` with public-read access and returns the
    /// URL it can be retrieved from.
    async fn upload(&self, bucket: &str, key: &str, artifact: Artifact) -> Result<String, UploadError>;
}

/// Connection settings for [`S3ObjectStore`].
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...).
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    /// Overrides the URL returned for uploaded objects, e.g. a CDN.
    pub public_base_url: Option<String>,
    /// Static credentials. Both must be set to take effect.
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// S3-backed store. Credentials come from the settings when given, otherwise
/// from the default AWS provider chain.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    settings: S3Settings,
}

impl S3ObjectStore {
    pub async fn new(settings: S3Settings) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));
        if let (Some(access_key), Some(secret_key)) = (&settings.access_key, &settings.secret_key) {
            loader = loader.credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "static",
            )));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        builder.set_endpoint_url(settings.endpoint.clone());
        builder.set_force_path_style(Some(settings.force_path_style));

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            settings,
        }
    }

    /// URL under which a public object is served.
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        public_url(&self.settings, bucket, key)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[tracing::instrument(skip(self, artifact), name = "S3ObjectStore::upload", err, fields(size = artifact.bytes.len()))]
    async fn upload(&self, bucket: &str, key: &str, artifact: Artifact) -> Result<String, UploadError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .content_type(artifact.content_type)
            .body(artifact.bytes.into())
            .send()
            .await
            .map_err(|e| UploadError::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
                detail: DisplayErrorContext(&e).to_string(),
                source: Box::new(e),
            })?;

        let url = self.public_url(bucket, key);
        info!("Uploaded artifact: url={}", url);
        Ok(url)
    }
}

fn public_url(settings: &S3Settings, bucket: &str, key: &str) -> String {
    let path = encode_key(key);

    if let Some(base) = &settings.public_base_url {
        return format!("{}/{}", base.trim_end_matches('/'), path);
    }

    match &settings.endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, path),
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, settings.region, path),
    }
}

/// Percent-encodes each path segment of `key`, keeping the separators.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> S3Settings {
        S3Settings {
            region: "us-east-1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_public_url_aws() {
        assert_eq!(
            public_url(&settings(), "bucket", "output/abcToText-doc.pdf"),
            "https://bucket.s3.us-east-1.amazonaws.com/output/abcToText-doc.pdf"
        );
    }

    #[test]
    fn test_public_url_custom_endpoint() {
        let settings = S3Settings {
            endpoint: Some("http://localhost:9000/".to_string()),
            force_path_style: true,
            ..settings()
        };

        assert_eq!(
            public_url(&settings, "bucket", "output/k.pdf"),
            "http://localhost:9000/bucket/output/k.pdf"
        );
    }

    #[test]
    fn test_public_url_base_override() {
        let settings = S3Settings {
            endpoint: Some("http://localhost:9000".to_string()),
            public_base_url: Some("https://cdn.example.com/".to_string()),
            ..settings()
        };

        assert_eq!(
            public_url(&settings, "bucket", "output/k.pdf"),
            "https://cdn.example.com/output/k.pdf"
        );
    }

    #[tokio::test]
    async fn test_connection_failure_detail() {
        // Port 9 (discard) on localhost is closed in test environments
        let store = S3ObjectStore::new(S3Settings {
            endpoint: Some("http://127.0.0.1:9".to_string()),
            force_path_style: true,
            access_key: Some("test".to_string()),
            secret_key: Some("test".to_string()),
            ..settings()
        })
        .await;
        let artifact = Artifact {
            bytes: b"hello".to_vec(),
            content_type: "text/plain; charset=utf-8",
        };

        let err = store.upload("bucket", "output/k.txt", artifact).await.unwrap_err();

        let UploadError::S3 { detail, .. } = &err else {
            panic!("unexpected error: {:?}", err);
        };
        assert!(detail.to_lowercase().contains("connect"), "detail: {}", detail);
        assert_ne!(detail.as_str(), "unhandled error");
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("failed to upload bucket/output/k.txt: "));
    }

    #[test]
    fn test_key_segments_encoded() {
        assert_eq!(
            encode_key("output/idToText-my report#1.pdf"),
            "output/idToText-my%20report%231.pdf"
        );
    }
}
