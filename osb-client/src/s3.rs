//! # S3 Backend
//!
//! Purpose: `StorageBackend` over aws-sdk-s3 against any S3-compatible
//! endpoint. One client is built per endpoint; the engine rotates across
//! them per operation. Request payload checksums are restricted to
//! operations that require them, since the benchmark measures throughput,
//! not integrity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region, RequestChecksumCalculation};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::StorageClass;
use bytes::Bytes;

use osb_common::PayloadSource;

use crate::backend::{
    GetOutcome, ListPage, ListedObject, StorageBackend, StorageError, StorageResult,
    ERR_DEADLINE_EXCEEDED,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// `StorageBackend` implementation backed by one aws-sdk-s3 client.
pub struct S3Backend {
    client: aws_sdk_s3::Client,
}

impl S3Backend {
    /// Builds a client for one endpoint with static credentials and forced
    /// path-style addressing (bucket-in-path works against every
    /// S3-compatible store; virtual-host style does not).
    pub fn new(endpoint: &str, region: &str, access_key: &str, secret_key: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "osb-static");
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(CONNECT_TIMEOUT)
                    .build(),
            )
            .build();
        S3Backend {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }
}

/// Builds the per-endpoint backend set the engine rotates through.
pub fn build_backends(
    endpoints: &[String],
    region: &str,
    access_key: &str,
    secret_key: &str,
) -> Vec<Arc<dyn StorageBackend>> {
    endpoints
        .iter()
        .map(|endpoint| {
            Arc::new(S3Backend::new(endpoint, region, access_key, secret_key))
                as Arc<dyn StorageBackend>
        })
        .collect()
}

/// Maps an SDK failure to the engine's code + message form. Service errors
/// keep their S3 error code; transport-class failures get stable synthetic
/// codes so the histogram stays meaningful.
fn map_sdk_error<E, R>(err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let code = err
        .as_service_error()
        .and_then(|service| service.code())
        .map(str::to_string)
        .unwrap_or_else(|| match &err {
            SdkError::TimeoutError(_) => ERR_DEADLINE_EXCEEDED.to_string(),
            SdkError::DispatchFailure(_) => "DispatchFailure".to_string(),
            SdkError::ResponseError(_) => "ResponseError".to_string(),
            SdkError::ConstructionFailure(_) => "ConstructionFailure".to_string(),
            _ => "RequestError".to_string(),
        });
    StorageError::new(code, DisplayErrorContext(&err).to_string())
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: PayloadSource,
        storage_class: Option<&str>,
    ) -> StorageResult<()> {
        // The SDK retries from an in-memory body without help; the source
        // stays seekable for callers that stream it elsewhere.
        let payload = Bytes::from(body.into_bytes());
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(payload))
            .set_storage_class(storage_class.map(StorageClass::from))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<&str>,
    ) -> StorageResult<GetOutcome> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_range(range.map(str::to_string))
            .send()
            .await
            .map_err(map_sdk_error)?;

        let content_length = output.content_length();
        let mut body = output.body;
        let mut bytes_read: i64 = 0;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|err| StorageError::new("BodyReadError", err.to_string()))?
        {
            bytes_read += chunk.len() as i64;
        }

        Ok(GetOutcome {
            bytes_read,
            content_length,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        marker: &str,
        max_keys: i64,
    ) -> StorageResult<ListPage> {
        let mut request = self
            .client
            .list_objects()
            .bucket(bucket)
            .max_keys(max_keys as i32);
        if !marker.is_empty() {
            request = request.marker(marker);
        }
        let output = request.send().await.map_err(map_sdk_error)?;

        let objects = output
            .contents()
            .iter()
            .map(|object| ListedObject {
                key: object.key().unwrap_or_default().to_string(),
                size: object.size().unwrap_or(0),
            })
            .collect();

        Ok(ListPage {
            objects,
            truncated: output.is_truncated().unwrap_or(false),
            next_marker: output.next_marker().map(str::to_string),
        })
    }

    async fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }
}
