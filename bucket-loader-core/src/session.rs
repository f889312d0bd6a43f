//! Session manager: one authenticated (or anonymous) storage handle plus the
//! run deadline. Every remote step and every stream copy goes through
//! [`Session::bounded`], so the deadline is the single cancellation point.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::contract::{Authentication, ObjectStorage, StorageConnector};
use crate::error::LoaderError;

/// Deadline used when the timeout flag is 0.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub fn effective_timeout(timeout_secs: u64) -> Duration {
    if timeout_secs == 0 {
        DEFAULT_TIMEOUT
    } else {
        Duration::from_secs(timeout_secs)
    }
}

pub struct Session {
    storage: Arc<dyn ObjectStorage>,
    authentication: Authentication,
    timeout: Duration,
    deadline: Instant,
    released: bool,
}

impl Session {
    pub fn storage(&self) -> &dyn ObjectStorage {
        self.storage.as_ref()
    }

    pub fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Run `fut` under the session deadline. `step` names what was in
    /// progress when the deadline hit.
    pub async fn bounded<F>(&self, step: &str, fut: F) -> Result<F::Output, LoaderError>
    where
        F: Future,
    {
        tokio::time::timeout_at(self.deadline, fut)
            .await
            .map_err(|_| {
                LoaderError::Connection(format!(
                    "deadline of {}s exceeded while {step}",
                    self.timeout.as_secs()
                ))
            })
    }

    /// Release the storage handle. Must be called exactly once per session.
    pub async fn release(mut self) {
        self.storage.close().await;
        self.released = true;
        debug!("Storage session released");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.released {
            warn!("Storage session dropped without being released");
        }
    }
}

/// Connect through `connector` and start the deadline clock.
pub async fn create_session(
    connector: &dyn StorageConnector,
    timeout_secs: u64,
    authentication: &Authentication,
) -> Result<Session, LoaderError> {
    let timeout = effective_timeout(timeout_secs);
    let deadline = Instant::now() + timeout;

    let storage = tokio::time::timeout_at(deadline, connector.connect(authentication, timeout))
        .await
        .map_err(|_| {
            LoaderError::Connection(format!(
                "deadline of {}s exceeded while creating storage client",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| LoaderError::connection("cannot create new storage client", e))?;

    info!(
        anonymous = authentication.is_anonymous(),
        timeout_secs = timeout.as_secs(),
        "Storage session created"
    );

    Ok(Session {
        storage,
        authentication: authentication.clone(),
        timeout,
        deadline,
        released: false,
    })
}
