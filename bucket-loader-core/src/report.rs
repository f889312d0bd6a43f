//! Reporter: the four output channels.
//!
//! - error: `tracing::error!`, for the failure that ends a run
//! - warning: `tracing::warn!`, for anomalies that do not stop the run
//! - info: `tracing::info!`, for success lines
//! - always: `INFO` events on [`ALWAYS_TARGET`]; subscribers keep this target
//!   enabled whatever the filter says
//!
//! Channels never decide control flow; the entry point does that from the
//! returned `Result`.

use std::time::{Duration, Instant};

use tracing::error;

use crate::error::LoaderError;

/// Target of the always-shown channel.
pub const ALWAYS_TARGET: &str = "bucket_loader::always";

pub fn always(message: &str) {
    tracing::info!(target: "bucket_loader::always", "{message}");
}

pub fn greeting(program: &str, version: &str) {
    always(&format!("Welcome to {program} v{version}"));
}

/// Log the error that ends the run.
pub fn failure(err: &LoaderError) {
    let kind = match err {
        LoaderError::Config(_) => "config",
        LoaderError::Io { .. } => "io",
        LoaderError::Connection(_) => "connection",
    };
    error!(kind, "FATAL: {err}");
}

/// One decimal place of seconds, e.g. `1.3s`.
pub fn format_duration(elapsed: Duration) -> String {
    format!("{:.1}s", elapsed.as_secs_f64())
}

/// Wall clock for a whole run.
pub struct RunClock {
    started: Instant,
}

impl RunClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Emit the closing duration line.
    pub fn finish(&self) {
        always(&format!("All done in {}, bye!", format_duration(self.elapsed())));
    }
}
