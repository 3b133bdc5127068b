//! # In-Memory Backend
//!
//! Purpose: A hermetic `StorageBackend` holding buckets and object sizes in
//! process memory, so whole benchmark phases can run in tests without a
//! storage service. Payload bytes are drained and counted but not kept;
//! the engine only ever accounts sizes.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use osb_common::PayloadSource;

use crate::backend::{GetOutcome, ListPage, ListedObject, StorageBackend, StorageError, StorageResult};

/// Bucket name → (key → object size), ordered per bucket for listings.
type Store = HashMap<String, BTreeMap<String, i64>>;

/// In-memory object store with S3-shaped error codes.
#[derive(Default)]
pub struct MemoryBackend {
    store: Mutex<Store>,
    /// Artificial per-operation latency, so duration-capped phases produce
    /// realistic operation counts instead of spinning.
    op_delay: Option<Duration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// A backend whose every operation takes roughly `delay`.
    pub fn with_op_delay(delay: Duration) -> Self {
        MemoryBackend {
            store: Mutex::default(),
            op_delay: Some(delay),
        }
    }

    async fn pause(&self) {
        if let Some(delay) = self.op_delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Existing bucket names, unordered.
    pub fn bucket_names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Keys currently in a bucket, in listing order.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Stored size of one object.
    pub fn object_size(&self, bucket: &str, key: &str) -> Option<i64> {
        self.lock().get(bucket)?.get(key).copied()
    }

    /// Total object count across all buckets.
    pub fn total_objects(&self) -> usize {
        self.lock().values().map(BTreeMap::len).sum()
    }

    /// Sum of stored object sizes across all buckets.
    pub fn total_bytes(&self) -> i64 {
        self.lock().values().flat_map(BTreeMap::values).sum()
    }

    /// Creates a bucket directly, without an error when it exists.
    pub fn ensure_bucket(&self, bucket: &str) {
        self.lock().entry(bucket.to_string()).or_default();
    }

    /// Seeds an object directly, creating the bucket if needed.
    pub fn insert_object(&self, bucket: &str, key: &str, size: i64) {
        self.lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), size);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().expect("store mutex poisoned")
    }
}

/// Interprets an HTTP `Range` header value (`bytes=start-` or
/// `bytes=start-end`, end inclusive) against an object of `size` bytes.
fn ranged_length(size: i64, range: &str) -> StorageResult<i64> {
    let invalid = || StorageError::new("InvalidRange", format!("unsupported range '{range}'"));

    let spec = range.strip_prefix("bytes=").ok_or_else(invalid)?;
    let (start_text, end_text) = spec.split_once('-').ok_or_else(invalid)?;
    let start: i64 = start_text.parse().map_err(|_| invalid())?;
    if start < 0 || start >= size {
        return Err(StorageError::new(
            "InvalidRange",
            format!("range start {start} outside object of {size} bytes"),
        ));
    }

    if end_text.is_empty() {
        return Ok(size - start);
    }
    let end: i64 = end_text.parse().map_err(|_| invalid())?;
    if end < start {
        return Err(invalid());
    }
    Ok(end.min(size - 1) - start + 1)
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: PayloadSource,
        _storage_class: Option<&str>,
    ) -> StorageResult<()> {
        self.pause().await;
        // Drain the payload the way a real transport would.
        let mut written: i64 = 0;
        let mut buf = [0u8; 8192];
        loop {
            let n = body.read(&mut buf).map_err(|err| {
                StorageError::new("BodyReadError", err.to_string())
            })?;
            if n == 0 {
                break;
            }
            written += n as i64;
        }

        let mut store = self.lock();
        let objects = store
            .get_mut(bucket)
            .ok_or_else(|| StorageError::new("NoSuchBucket", format!("bucket '{bucket}'")))?;
        objects.insert(key.to_string(), written);
        Ok(())
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<&str>,
    ) -> StorageResult<GetOutcome> {
        self.pause().await;
        let size = {
            let store = self.lock();
            let objects = store
                .get(bucket)
                .ok_or_else(|| StorageError::new("NoSuchBucket", format!("bucket '{bucket}'")))?;
            *objects
                .get(key)
                .ok_or_else(|| StorageError::new("NoSuchKey", format!("key '{key}'")))?
        };

        let transferred = match range {
            Some(range) => ranged_length(size, range)?,
            None => size,
        };
        Ok(GetOutcome {
            bytes_read: transferred,
            content_length: Some(transferred),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.pause().await;
        let mut store = self.lock();
        let objects = store
            .get_mut(bucket)
            .ok_or_else(|| StorageError::new("NoSuchBucket", format!("bucket '{bucket}'")))?;
        // Deleting a missing key succeeds, as it does on S3.
        objects.remove(key);
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        marker: &str,
        max_keys: i64,
    ) -> StorageResult<ListPage> {
        self.pause().await;
        let store = self.lock();
        let objects = store
            .get(bucket)
            .ok_or_else(|| StorageError::new("NoSuchBucket", format!("bucket '{bucket}'")))?;

        let page: Vec<ListedObject> = objects
            .range::<str, _>((
                std::ops::Bound::Excluded(marker),
                std::ops::Bound::Unbounded,
            ))
            .take(max_keys.max(0) as usize)
            .map(|(key, size)| ListedObject {
                key: key.clone(),
                size: *size,
            })
            .collect();

        let truncated = match page.last() {
            Some(last) => objects
                .range::<str, _>((
                    std::ops::Bound::Excluded(last.key.as_str()),
                    std::ops::Bound::Unbounded,
                ))
                .next()
                .is_some(),
            None => false,
        };

        // Like S3 without a delimiter: no NextMarker, callers resume from
        // the last returned key.
        Ok(ListPage {
            objects: page,
            truncated,
            next_marker: None,
        })
    }

    async fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.pause().await;
        let mut store = self.lock();
        if store.contains_key(bucket) {
            return Err(StorageError::new(
                "BucketAlreadyOwnedByYou",
                format!("bucket '{bucket}' exists"),
            ));
        }
        store.insert(bucket.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.pause().await;
        let mut store = self.lock();
        let objects = store
            .get(bucket)
            .ok_or_else(|| StorageError::new("NoSuchBucket", format!("bucket '{bucket}'")))?;
        if !objects.is_empty() {
            return Err(StorageError::new(
                "BucketNotEmpty",
                format!("bucket '{bucket}' still holds {} objects", objects.len()),
            ));
        }
        store.remove(bucket);
        Ok(())
    }
}
