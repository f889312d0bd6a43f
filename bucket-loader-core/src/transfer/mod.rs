//! Transfer engine.
//!
//! [`execute`] is the whole pipeline for one run: resolve the configuration,
//! open a session, perform the upload or download, release the session.
//! Each step either succeeds or ends the run with a [`LoaderError`]; nothing
//! is retried and no partial object is cleaned up.

pub mod download;
pub mod upload;

pub use download::download;
pub use upload::upload;

use tracing::debug;

use crate::config::{Action, Arguments, Configuration};
use crate::contract::{BucketDescriptor, ObjectDescriptor, StorageConnector};
use crate::error::{LoaderError, StorageError};
use crate::session::{create_session, Session};

/// Outcome of a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub action: Action,
    pub bytes_written: u64,
    /// Post-upload object metadata; only fetched when extra checks are on.
    pub object: Option<ObjectDescriptor>,
}

/// Resolve `args` and run the transfer it describes. A configuration error
/// returns before any session is created.
pub async fn execute(
    args: &Arguments,
    connector: &dyn StorageConnector,
) -> Result<TransferReport, LoaderError> {
    let config = Configuration::resolve(args)?;
    config.trace_loaded();
    run_transfer(&config, connector).await
}

/// Open a session for `config`, transfer, and release the session whatever
/// the transfer outcome.
pub async fn run_transfer(
    config: &Configuration,
    connector: &dyn StorageConnector,
) -> Result<TransferReport, LoaderError> {
    let session = create_session(connector, config.timeout_secs, &config.authentication).await?;

    let outcome = match config.action {
        Action::Upload => {
            upload(
                &session,
                &config.local_path,
                &config.bucket,
                &config.object,
                config.content_type.as_deref(),
                config.extra_checks,
            )
            .await
        }
        Action::Download => {
            download(
                &session,
                &config.local_path,
                &config.bucket,
                &config.object,
                config.extra_checks,
            )
            .await
        }
    };

    session.release().await;
    outcome
}

/// Bucket existence check shared by both directions.
pub(crate) async fn check_bucket(
    session: &Session,
    bucket: &str,
) -> Result<BucketDescriptor, LoaderError> {
    let fetched = session
        .bounded("fetching bucket info", session.storage().bucket_metadata(bucket))
        .await?;
    match fetched {
        Ok(descriptor) => {
            debug!(
                bucket = %descriptor.name,
                location = ?descriptor.location,
                storage_class = ?descriptor.storage_class,
                "Bucket exists"
            );
            Ok(descriptor)
        }
        Err(StorageError::BucketNotFound { .. }) => Err(LoaderError::Config(format!(
            "bucket '{bucket}' does not exist"
        ))),
        Err(e) => Err(LoaderError::connection("cannot fetch bucket info", e)),
    }
}

/// Object metadata lookup shared by both directions. `Ok(None)` means the
/// object is absent; deciding whether that is fatal is up to the caller.
pub(crate) async fn lookup_object(
    session: &Session,
    bucket: &str,
    object: &str,
) -> Result<Option<ObjectDescriptor>, LoaderError> {
    let fetched = session
        .bounded(
            "fetching object info",
            session.storage().object_metadata(bucket, object),
        )
        .await?;
    match fetched {
        Ok(descriptor) => Ok(Some(descriptor)),
        Err(StorageError::ObjectNotFound { .. }) => Ok(None),
        Err(e) => Err(LoaderError::connection("cannot fetch object info", e)),
    }
}
