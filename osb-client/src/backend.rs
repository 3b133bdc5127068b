//! # Storage Backend Contract
//!
//! Purpose: The narrow interface the benchmark engine drives. Every
//! operation returns either success (with whatever the engine needs for
//! byte accounting) or a `StorageError` carrying a service error code; the
//! engine counts errors, it never retries them.

use async_trait::async_trait;
use thiserror::Error;

use osb_common::PayloadSource;

/// Error code reported when the surrounding context cancelled an operation.
pub const ERR_CONTEXT_CANCELED: &str = "request context canceled";
/// Error code reported when a per-operation timeout fired.
pub const ERR_DEADLINE_EXCEEDED: &str = "context deadline exceeded";

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A storage-service failure at the engine boundary.
///
/// `code` is the stable identifier that feeds the per-window error
/// histogram; `message` is free-form context for the log.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct StorageError {
    pub code: String,
    pub message: String,
}

impl StorageError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The error produced by an expired per-operation timeout.
    pub fn deadline_exceeded() -> Self {
        StorageError::new(ERR_DEADLINE_EXCEEDED, "operation timed out")
    }

    /// Cancellation-class codes are counted but kept off the error log.
    pub fn is_suppressed(&self) -> bool {
        self.code == ERR_CONTEXT_CANCELED || self.code == ERR_DEADLINE_EXCEEDED
    }

    /// Bucket-creation outcomes that bucket-init treats as success.
    pub fn is_bucket_already_there(&self) -> bool {
        self.code == "BucketAlreadyExists" || self.code == "BucketAlreadyOwnedByYou"
    }
}

/// Result of a GET after the body has been fully consumed.
#[derive(Debug, Clone, Copy)]
pub struct GetOutcome {
    /// Bytes actually read from the response body.
    pub bytes_read: i64,
    /// Content length advertised by the service, when present.
    pub content_length: Option<i64>,
}

/// One key in a listing page.
#[derive(Debug, Clone)]
pub struct ListedObject {
    pub key: String,
    pub size: i64,
}

/// One page of a marker-based listing.
#[derive(Debug, Clone)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    pub truncated: bool,
    pub next_marker: Option<String>,
}

impl ListPage {
    /// Marker to resume from: the service-provided one, or the last listed
    /// key when the service returned none.
    pub fn resume_marker(&self) -> Option<String> {
        if !self.truncated {
            return None;
        }
        self.next_marker
            .clone()
            .or_else(|| self.objects.last().map(|o| o.key.clone()))
    }
}

/// The storage operations the benchmark engine performs.
///
/// Implementations own transport concerns (connection pooling, request
/// signing, internal retries); the engine owns timing and accounting. A GET
/// implementation must consume the response body to the last byte before
/// returning, so the engine's latency measurement covers the transfer.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Uploads `body.len()` deterministic bytes.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: PayloadSource,
        storage_class: Option<&str>,
    ) -> StorageResult<()>;

    /// Downloads an object, optionally with an HTTP `Range` header value,
    /// draining and counting the body.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<&str>,
    ) -> StorageResult<GetOutcome>;

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Lists one page of at most `max_keys` keys after `marker` (empty
    /// marker starts from the beginning).
    async fn list_objects(
        &self,
        bucket: &str,
        marker: &str,
        max_keys: i64,
    ) -> StorageResult<ListPage>;

    async fn create_bucket(&self, bucket: &str) -> StorageResult<()>;

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_codes_are_suppressed() {
        assert!(StorageError::deadline_exceeded().is_suppressed());
        assert!(StorageError::new(ERR_CONTEXT_CANCELED, "").is_suppressed());
        assert!(!StorageError::new("NoSuchKey", "missing").is_suppressed());
    }

    #[test]
    fn resume_marker_falls_back_to_last_key() {
        let page = ListPage {
            objects: vec![
                ListedObject {
                    key: "a".into(),
                    size: 1,
                },
                ListedObject {
                    key: "b".into(),
                    size: 2,
                },
            ],
            truncated: true,
            next_marker: None,
        };
        assert_eq!(page.resume_marker().as_deref(), Some("b"));

        let done = ListPage {
            truncated: false,
            ..page.clone()
        };
        assert_eq!(done.resume_marker(), None);

        let explicit = ListPage {
            next_marker: Some("m".into()),
            ..page
        };
        assert_eq!(explicit.resume_marker().as_deref(), Some("m"));
    }
}
