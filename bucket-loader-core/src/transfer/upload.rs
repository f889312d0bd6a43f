use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::config::Action;
use crate::error::LoaderError;
use crate::session::Session;
use crate::transfer::{check_bucket, lookup_object, TransferReport};

/// Stream `local_path` into `bucket/object`, replacing whatever is there.
///
/// With `extra_checks` the bucket must exist, the current object state is
/// reported before writing, and the final object metadata is re-fetched after.
pub async fn upload(
    session: &Session,
    local_path: &Path,
    bucket: &str,
    object: &str,
    content_type: Option<&str>,
    extra_checks: bool,
) -> Result<TransferReport, LoaderError> {
    let storage = session.storage();

    let mut file = File::open(local_path).await.map_err(|e| {
        LoaderError::io(
            format!("cannot open requested file {}", local_path.display()),
            e,
        )
    })?;

    if extra_checks {
        check_bucket(session, bucket).await?;
        match lookup_object(session, bucket, object).await? {
            Some(existing) => warn!(
                bucket = %bucket,
                object = %object,
                "Object exists, going to overwrite it! (Existing object's {existing})"
            ),
            None => warn!(
                bucket = %bucket,
                object = %object,
                "Object does not exist, going to create a new one"
            ),
        }
    }

    let content_type = content_type
        .filter(|ct| !ct.is_empty())
        .map(str::to_string);
    let mut writer = session
        .bounded(
            "opening object writer",
            storage.open_write(bucket, object, content_type),
        )
        .await?
        .map_err(|e| LoaderError::connection("cannot open object for writing", e))?;

    let bytes = session
        .bounded(
            "copying file to bucket",
            tokio::io::copy(&mut file, &mut writer),
        )
        .await?
        .map_err(|e| LoaderError::io("cannot copy file to bucket", e))?;

    // The object may be absent or partial if this fails; it is left as is.
    session
        .bounded("finalizing object", writer.shutdown())
        .await?
        .map_err(|e| {
            error!(bucket = %bucket, object = %object, "Upload not finalized, object state unknown");
            LoaderError::connection("cannot write file to bucket", e)
        })?;

    if !extra_checks {
        info!(
            bucket = %bucket,
            object = %object,
            bytes,
            "SUCCESS: Object uploaded to bucket (Written bytes: {bytes})"
        );
        return Ok(TransferReport {
            action: Action::Upload,
            bytes_written: bytes,
            object: None,
        });
    }

    let uploaded = lookup_object(session, bucket, object)
        .await?
        .ok_or_else(|| {
            LoaderError::Connection(format!(
                "cannot fetch object info, {bucket}/{object} not found after upload"
            ))
        })?;
    info!(
        bucket = %bucket,
        object = %object,
        bytes,
        "SUCCESS: Object uploaded to bucket (Uploaded object's {uploaded})"
    );
    match serde_json::to_string_pretty(&uploaded) {
        Ok(json) => debug!(json = %json, "Uploaded object descriptor as JSON"),
        Err(e) => debug!(error = ?e, "Failed to serialize object descriptor as JSON"),
    }

    Ok(TransferReport {
        action: Action::Upload,
        bytes_written: bytes,
        object: Some(uploaded),
    })
}
