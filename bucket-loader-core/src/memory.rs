//! In-memory storage backend.
//!
//! Implements the full [`ObjectStorage`] capability set over a map of buckets.
//! Every committed write bumps a store-wide generation counter, mirroring how
//! the real provider versions objects. Writes become visible only when the
//! writer is shut down, and fail at that point if the bucket is gone.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWrite;

use crate::contract::{
    Authentication, BucketDescriptor, ObjectDescriptor, ObjectStorage, ObjectStream,
    ObjectWriter, StorageConnector,
};
use crate::error::StorageError;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    generation: i64,
    content_type: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    buckets: HashMap<String, HashMap<String, StoredObject>>,
    last_generation: i64,
}

impl State {
    fn commit(
        &mut self,
        bucket: &str,
        object: &str,
        data: Bytes,
        content_type: Option<String>,
    ) -> Result<i64, StorageError> {
        let objects = self
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            })?;
        self.last_generation += 1;
        let generation = self.last_generation;
        objects.insert(
            object.to_string(),
            StoredObject {
                data,
                generation,
                content_type,
            },
        );
        Ok(generation)
    }

    fn object(&self, bucket: &str, object: &str) -> Result<&StoredObject, StorageError> {
        self.buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            })?
            .get(object)
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                object: object.to_string(),
            })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
    close_calls: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        self.create_bucket(bucket);
        self
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.lock().buckets.entry(bucket.to_string()).or_default();
    }

    pub fn remove_bucket(&self, bucket: &str) {
        self.lock().buckets.remove(bucket);
    }

    /// Store `data` directly, bypassing the writer. Returns the new generation.
    pub fn put(
        &self,
        bucket: &str,
        object: &str,
        data: impl Into<Bytes>,
    ) -> Result<i64, StorageError> {
        self.lock().commit(bucket, object, data.into(), None)
    }

    pub fn get(&self, bucket: &str, object: &str) -> Option<Bytes> {
        self.lock()
            .object(bucket, object)
            .ok()
            .map(|stored| stored.data.clone())
    }

    pub fn content_type(&self, bucket: &str, object: &str) -> Option<String> {
        self.lock()
            .object(bucket, object)
            .ok()
            .and_then(|stored| stored.content_type.clone())
    }

    /// How many times [`ObjectStorage::close`] was called on this backend.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned map is still a consistent map: every mutation is a single insert/remove.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn bucket_metadata(&self, bucket: &str) -> Result<BucketDescriptor, StorageError> {
        if self.lock().buckets.contains_key(bucket) {
            Ok(BucketDescriptor {
                name: bucket.to_string(),
                location: Some("MEMORY".to_string()),
                storage_class: None,
            })
        } else {
            Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            })
        }
    }

    async fn object_metadata(
        &self,
        bucket: &str,
        object: &str,
    ) -> Result<ObjectDescriptor, StorageError> {
        let state = self.lock();
        let stored = state.object(bucket, object)?;
        Ok(ObjectDescriptor {
            bucket: bucket.to_string(),
            name: object.to_string(),
            size: stored.data.len() as u64,
            crc32c: None,
            generation: Some(stored.generation),
            content_type: stored.content_type.clone(),
        })
    }

    async fn open_read(&self, bucket: &str, object: &str) -> Result<ObjectStream, StorageError> {
        let data = self.lock().object(bucket, object)?.data.clone();
        let chunks: Vec<Result<Bytes, StorageError>> = (0..data.len())
            .step_by(READ_CHUNK)
            .map(|start| Ok(data.slice(start..(start + READ_CHUNK).min(data.len()))))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn open_write(
        &self,
        bucket: &str,
        object: &str,
        content_type: Option<String>,
    ) -> Result<ObjectWriter, StorageError> {
        Ok(Box::new(MemoryWriter {
            state: Arc::clone(&self.state),
            bucket: bucket.to_string(),
            object: object.to_string(),
            content_type,
            buffer: Vec::new(),
            committed: false,
        }))
    }

    async fn delete(&self, bucket: &str, object: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            })?;
        objects
            .remove(object)
            .map(|_| ())
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                object: object.to_string(),
            })
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

struct MemoryWriter {
    state: Arc<Mutex<State>>,
    bucket: String,
    object: String,
    content_type: Option<String>,
    buffer: Vec<u8>,
    committed: bool,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.committed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write after shutdown",
            )));
        }
        this.buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.committed {
            return Poll::Ready(Ok(()));
        }
        let data = Bytes::from(std::mem::take(&mut this.buffer));
        let mut state = this
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = state
            .commit(&this.bucket, &this.object, data, this.content_type.take())
            .map(|_| ())
            .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e.to_string()));
        this.committed = true;
        Poll::Ready(result)
    }
}

/// Connector handing out one shared [`MemoryStorage`].
///
/// Service-account authentication only succeeds when the key file exists, so
/// tests can tell whether a credential path was actually used.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    storage: Arc<MemoryStorage>,
    connections: Mutex<Vec<Authentication>>,
}

impl MemoryConnector {
    pub fn new(storage: Arc<MemoryStorage>) -> Self {
        Self {
            storage,
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn storage(&self) -> Arc<MemoryStorage> {
        Arc::clone(&self.storage)
    }

    /// Authentications seen by [`StorageConnector::connect`], in order.
    pub fn connections(&self) -> Vec<Authentication> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl StorageConnector for MemoryConnector {
    async fn connect(
        &self,
        authentication: &Authentication,
        _timeout: Duration,
    ) -> Result<Arc<dyn ObjectStorage>, StorageError> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(authentication.clone());
        if let Authentication::ServiceAccount(path) = authentication {
            if !path.is_file() {
                return Err(StorageError::Credentials {
                    message: format!("key file {} not found", path.display()),
                });
            }
        }
        Ok(Arc::clone(&self.storage) as Arc<dyn ObjectStorage>)
    }
}
