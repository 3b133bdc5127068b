//! Storage backends for the osb benchmark: the `StorageBackend` trait the
//! engine drives, its aws-sdk-s3 implementation, and an in-memory
//! implementation used to exercise whole benchmark phases in tests.

pub mod backend;
pub mod memory;
pub mod s3;

pub use backend::{
    GetOutcome, ListPage, ListedObject, StorageBackend, StorageError, StorageResult,
    ERR_CONTEXT_CANCELED, ERR_DEADLINE_EXCEEDED,
};
pub use memory::MemoryBackend;
pub use s3::{build_backends, S3Backend};
