use thiserror::Error;

/// Failure reported by a storage backend through the [`crate::contract`] traits.
///
/// Backends map their provider errors onto these variants so the transfer
/// engine can tell "absent" apart from "could not ask".
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("bucket not found: {bucket}")]
    BucketNotFound { bucket: String },

    #[error("object not found: {bucket}/{object}")]
    ObjectNotFound { bucket: String, object: String },

    #[error("invalid credentials: {message}")]
    Credentials { message: String },

    #[error("{message}")]
    Provider { message: String },

    #[error("stream error: {0}")]
    Stream(#[from] std::io::Error),
}

impl StorageError {
    pub fn provider(message: impl Into<String>) -> Self {
        StorageError::Provider {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::BucketNotFound { .. } | StorageError::ObjectNotFound { .. }
        )
    }
}

/// Every way a run can fail. All variants are fatal for the run.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Missing or contradictory parameters, or a bucket/object that is not in
    /// the state the operation requires.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local file open/create/copy/flush failures.
    #[error("I/O error: {context} ({source})")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Client construction, stream open/finalize, metadata fetch and deadline
    /// failures.
    #[error("connection error: {0}")]
    Connection(String),
}

impl LoaderError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        LoaderError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn connection(context: &str, err: impl std::fmt::Display) -> Self {
        LoaderError::Connection(format!("{context} ({err})"))
    }

    pub fn is_config(&self) -> bool {
        matches!(self, LoaderError::Config(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, LoaderError::Io { .. })
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, LoaderError::Connection(_))
    }
}
