use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bucket_loader_core::config::{Action, Configuration};
use bucket_loader_core::contract::{
    Authentication, BucketDescriptor, MockObjectStorage, MockStorageConnector, ObjectDescriptor,
    ObjectStorage, ObjectStream, ObjectWriter,
};
use bucket_loader_core::error::StorageError;
use bucket_loader_core::transfer::run_transfer;
use bytes::Bytes;
use futures::StreamExt;
use tempfile::tempdir;
use tokio::io::AsyncWrite;

fn config(action: Action, local_path: PathBuf, extra_checks: bool) -> Configuration {
    Configuration {
        action,
        local_path,
        bucket: "b".to_string(),
        object: "o".to_string(),
        authentication: Authentication::ServiceAccount(PathBuf::from("k.json")),
        content_type: None,
        extra_checks,
        timeout_secs: 0,
    }
}

fn connector_for(storage: MockObjectStorage) -> MockStorageConnector {
    let mut connector = MockStorageConnector::new();
    connector
        .expect_connect()
        .times(1)
        .return_once(move |_, _| Ok(Arc::new(storage) as Arc<dyn ObjectStorage>));
    connector
}

fn bucket() -> BucketDescriptor {
    BucketDescriptor {
        name: "b".to_string(),
        location: Some("EU".to_string()),
        storage_class: Some("STANDARD".to_string()),
    }
}

fn provider_down() -> StorageError {
    StorageError::provider("503 Service Unavailable")
}

/// Accepts every byte, then refuses to finalize.
struct UnfinalizableWriter;

impl AsyncWrite for UnfinalizableWriter {
    fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "upload session aborted")))
    }
}

#[tokio::test]
async fn bucket_fetch_failure_is_connection_error_and_nothing_is_written() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("a.txt");
    std::fs::write(&file, "hi").unwrap();

    let mut storage = MockObjectStorage::new();
    storage
        .expect_bucket_metadata()
        .times(1)
        .returning(|_| Err(provider_down()));
    storage.expect_open_write().times(0);
    storage.expect_close().times(1).returning(|| ());

    let err = run_transfer(&config(Action::Upload, file, true), &connector_for(storage))
        .await
        .unwrap_err();

    assert!(err.is_connection(), "got {err:?}");
    assert!(err.to_string().contains("cannot fetch bucket info"));
}

#[tokio::test]
async fn object_fetch_failure_on_download_is_connection_error() {
    let dir = tempdir().unwrap();

    let mut storage = MockObjectStorage::new();
    storage
        .expect_bucket_metadata()
        .returning(|_| Ok(bucket()));
    storage
        .expect_object_metadata()
        .withf(|b, o| b == "b" && o == "o")
        .times(1)
        .returning(|_, _| Err(provider_down()));
    storage.expect_open_read().times(0);
    storage.expect_close().times(1).returning(|| ());

    let err = run_transfer(
        &config(Action::Download, dir.path().join("out.txt"), true),
        &connector_for(storage),
    )
    .await
    .unwrap_err();

    assert!(err.is_connection(), "got {err:?}");
    assert!(err.to_string().contains("cannot fetch object info"));
}

#[tokio::test]
async fn broken_remote_stream_is_io_error() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("out.txt");

    let mut storage = MockObjectStorage::new();
    storage.expect_open_read().times(1).returning(|_, _| {
        let chunks: Vec<Result<Bytes, StorageError>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(StorageError::provider("connection reset")),
        ];
        Ok(futures::stream::iter(chunks).boxed() as ObjectStream)
    });
    storage.expect_close().times(1).returning(|| ());

    let err = run_transfer(
        &config(Action::Download, target.clone(), false),
        &connector_for(storage),
    )
    .await
    .unwrap_err();

    assert!(err.is_io(), "got {err:?}");
    assert!(err.to_string().contains("cannot copy object from bucket"));
    assert!(target.is_file());
}

#[tokio::test]
async fn finalize_failure_is_connection_error() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("a.txt");
    std::fs::write(&file, "hello").unwrap();

    let mut storage = MockObjectStorage::new();
    storage
        .expect_open_write()
        .withf(|b, o, ct| b == "b" && o == "o" && ct.is_none())
        .times(1)
        .returning(|_, _, _| Ok(Box::new(UnfinalizableWriter) as ObjectWriter));
    storage.expect_object_metadata().times(0);
    storage.expect_close().times(1).returning(|| ());

    let err = run_transfer(&config(Action::Upload, file, false), &connector_for(storage))
        .await
        .unwrap_err();

    assert!(err.is_connection(), "got {err:?}");
    assert!(err.to_string().contains("upload session aborted"));
}

#[tokio::test]
async fn refetch_failure_after_upload_is_connection_error() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("a.txt");
    std::fs::write(&file, "hello").unwrap();

    let calls = AtomicUsize::new(0);
    let mut storage = MockObjectStorage::new();
    storage.expect_bucket_metadata().returning(|_| Ok(bucket()));
    storage
        .expect_object_metadata()
        .times(2)
        .returning(move |b, o| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StorageError::ObjectNotFound {
                    bucket: b.to_string(),
                    object: o.to_string(),
                })
            } else {
                Err(provider_down())
            }
        });
    storage
        .expect_open_write()
        .times(1)
        .returning(|_, _, _| Ok(Box::new(tokio::io::sink()) as ObjectWriter));
    storage.expect_close().times(1).returning(|| ());

    let err = run_transfer(&config(Action::Upload, file, true), &connector_for(storage))
        .await
        .unwrap_err();

    assert!(err.is_connection(), "got {err:?}");
}

#[tokio::test]
async fn existing_object_metadata_is_passed_through_on_upload() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("a.txt");
    std::fs::write(&file, "hello").unwrap();

    let generation = AtomicUsize::new(41);
    let mut storage = MockObjectStorage::new();
    storage.expect_bucket_metadata().returning(|_| Ok(bucket()));
    storage
        .expect_object_metadata()
        .times(2)
        .returning(move |b, o| {
            Ok(ObjectDescriptor {
                bucket: b.to_string(),
                name: o.to_string(),
                size: 5,
                crc32c: Some(2_562_079_211),
                generation: Some(generation.fetch_add(1, Ordering::SeqCst) as i64),
                content_type: None,
            })
        });
    storage
        .expect_open_write()
        .returning(|_, _, _| Ok(Box::new(tokio::io::sink()) as ObjectWriter));
    storage.expect_close().times(1).returning(|| ());

    let report = run_transfer(&config(Action::Upload, file, true), &connector_for(storage))
        .await
        .expect("upload");

    let object = report.object.expect("metadata after upload");
    assert_eq!(object.generation, Some(42));
    assert_eq!(report.bytes_written, 5);
}

/// Storage whose bucket lookup never answers in time.
struct StalledStorage;

#[async_trait]
impl ObjectStorage for StalledStorage {
    async fn bucket_metadata(&self, _bucket: &str) -> Result<BucketDescriptor, StorageError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(bucket())
    }

    async fn object_metadata(&self, _: &str, _: &str) -> Result<ObjectDescriptor, StorageError> {
        Err(provider_down())
    }

    async fn open_read(&self, _: &str, _: &str) -> Result<ObjectStream, StorageError> {
        Err(provider_down())
    }

    async fn open_write(
        &self,
        _: &str,
        _: &str,
        _: Option<String>,
    ) -> Result<ObjectWriter, StorageError> {
        Err(provider_down())
    }

    async fn delete(&self, _: &str, _: &str) -> Result<(), StorageError> {
        Err(provider_down())
    }

    async fn close(&self) {}
}

#[tokio::test(start_paused = true)]
async fn elapsed_deadline_aborts_the_step_in_progress() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("a.txt");
    std::fs::write(&file, "hi").unwrap();

    let mut connector = MockStorageConnector::new();
    connector
        .expect_connect()
        .withf(|_, timeout| *timeout == Duration::from_secs(2))
        .return_once(|_, _| Ok(Arc::new(StalledStorage) as Arc<dyn ObjectStorage>));

    let mut cfg = config(Action::Upload, file, true);
    cfg.timeout_secs = 2;
    let err = run_transfer(&cfg, &connector).await.unwrap_err();

    assert!(err.is_connection(), "got {err:?}");
    assert!(err.to_string().contains("deadline of 2s exceeded while fetching bucket info"));
}
