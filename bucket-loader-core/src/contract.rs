//! # contract: storage capability interface
//!
//! The transfer engine never talks to a provider SDK directly. It depends on
//! two traits:
//!
//! - [`StorageConnector`] authenticates (or connects anonymously) and hands
//!   back an [`ObjectStorage`] handle.
//! - [`ObjectStorage`] is the per-session capability set: bucket metadata,
//!   object metadata, read stream, write stream, delete and close.
//!
//! Real clients live in the CLI crate; the in-memory backend in
//! [`crate::memory`] and the `mockall` mocks generated here are used by tests.
//!
//! ## Mocking
//! Both traits are annotated with `automock`; the mocks are exported when the
//! `test-export-mocks` feature is on (default) so downstream crates can use them.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::io::AsyncWrite;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::StorageError;

/// Chunks of an object being read.
pub type ObjectStream = BoxStream<'static, Result<Bytes, StorageError>>;

/// Write side of an object upload. The object becomes visible once the writer
/// is shut down successfully; a failed shutdown means the object may be absent
/// or incomplete.
pub type ObjectWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Metadata of a remote object.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ObjectDescriptor {
    pub bucket: String,
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// CRC32C of the content, when the provider reports one.
    pub crc32c: Option<u32>,
    /// Provider generation (version) of the object.
    pub generation: Option<i64>,
    pub content_type: Option<String>,
}

impl fmt::Display for ObjectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIZE: {}, CRC32: ", self.size)?;
        match self.crc32c {
            Some(crc) => write!(f, "{crc}")?,
            None => f.write_str("-")?,
        }
        f.write_str(", GENERATION: ")?;
        match self.generation {
            Some(generation) => write!(f, "{generation}"),
            None => f.write_str("-"),
        }
    }
}

/// Metadata of a remote bucket.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BucketDescriptor {
    pub name: String,
    pub location: Option<String>,
    pub storage_class: Option<String>,
}

/// How a session authenticates against the provider.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum Authentication {
    /// Unauthenticated requests; only public buckets/objects are reachable.
    Anonymous,
    /// Service-account JSON key loaded from a local file.
    ServiceAccount(PathBuf),
}

impl Authentication {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Authentication::Anonymous)
    }
}

/// Per-session capability set against the remote provider.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Fetch bucket metadata. Absent bucket is [`StorageError::BucketNotFound`].
    async fn bucket_metadata(&self, bucket: &str) -> Result<BucketDescriptor, StorageError>;

    /// Fetch object metadata. Absent object is [`StorageError::ObjectNotFound`].
    async fn object_metadata(
        &self,
        bucket: &str,
        object: &str,
    ) -> Result<ObjectDescriptor, StorageError>;

    /// Open a read stream over the whole object.
    async fn open_read(&self, bucket: &str, object: &str) -> Result<ObjectStream, StorageError>;

    /// Open a write stream that replaces the object on successful shutdown.
    async fn open_write(
        &self,
        bucket: &str,
        object: &str,
        content_type: Option<String>,
    ) -> Result<ObjectWriter, StorageError>;

    /// Delete the object.
    async fn delete(&self, bucket: &str, object: &str) -> Result<(), StorageError>;

    /// Release network resources held by the handle.
    async fn close(&self);
}

/// Builds [`ObjectStorage`] handles: the "authenticate" capability.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait StorageConnector: Send + Sync {
    /// Construct a client. `timeout` bounds individual provider requests.
    async fn connect(
        &self,
        authentication: &Authentication,
        timeout: Duration,
    ) -> Result<Arc<dyn ObjectStorage>, StorageError>;
}
