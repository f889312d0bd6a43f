use std::io;
use std::path::Path;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::Action;
use crate::error::LoaderError;
use crate::session::Session;
use crate::transfer::{check_bucket, lookup_object, TransferReport};

/// Stream `bucket/object` into `local_path`, truncating any existing file.
///
/// The local file is created before any remote call, so a failing download
/// leaves an empty (or partial) file behind.
pub async fn download(
    session: &Session,
    local_path: &Path,
    bucket: &str,
    object: &str,
    extra_checks: bool,
) -> Result<TransferReport, LoaderError> {
    match tokio::fs::metadata(local_path).await {
        Ok(meta) if meta.is_file() => warn!(
            file = %local_path.display(),
            "File exists, going to overwrite it! (Existing file's SIZE: {})",
            meta.len()
        ),
        Ok(_) => warn!(
            file = %local_path.display(),
            "Path exists but is not a regular file!"
        ),
        Err(_) => {}
    }

    let mut file = File::create(local_path).await.map_err(|e| {
        LoaderError::io(
            format!("cannot create requested file {}", local_path.display()),
            e,
        )
    })?;

    if extra_checks {
        check_bucket(session, bucket).await?;
        match lookup_object(session, bucket, object).await? {
            Some(existing) => warn!(
                bucket = %bucket,
                object = %object,
                "Object exists! (Existing object's {existing})"
            ),
            None => {
                return Err(LoaderError::Config(format!(
                    "object '{object}' does not exist in bucket '{bucket}'"
                )));
            }
        }
    }

    let mut stream = session
        .bounded(
            "opening object reader",
            session.storage().open_read(bucket, object),
        )
        .await?
        .map_err(|e| LoaderError::connection("cannot create new reader", e))?;

    let bytes = session
        .bounded("copying object from bucket", async {
            let mut total: u64 = 0;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| {
                    LoaderError::io("cannot copy object from bucket", io::Error::other(e))
                })?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| LoaderError::io("cannot copy object from bucket", e))?;
                total += chunk.len() as u64;
            }
            file.flush()
                .await
                .map_err(|e| LoaderError::io("cannot flush downloaded file", e))?;
            Ok::<u64, LoaderError>(total)
        })
        .await??;

    info!(
        bucket = %bucket,
        object = %object,
        file = %local_path.display(),
        bytes,
        "SUCCESS: Object downloaded from bucket (Written bytes: {bytes})"
    );

    Ok(TransferReport {
        action: Action::Download,
        bytes_written: bytes,
        object: None,
    })
}
