use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::contract::Authentication;
use crate::error::LoaderError;

/// Direction of the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    Upload,
    Download,
}

impl FromStr for Action {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("upload") {
            Ok(Action::Upload)
        } else if s.eq_ignore_ascii_case("download") {
            Ok(Action::Download)
        } else {
            Err(LoaderError::Config(format!(
                "wrong action '{s}', expected 'upload' or 'download'"
            )))
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Upload => f.write_str("upload"),
            Action::Download => f.write_str("download"),
        }
    }
}

/// Flags as they come off the command line, before any validation.
/// Empty strings count as absent.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    pub action: Option<String>,
    pub file: Option<String>,
    pub bucket: Option<String>,
    pub object: Option<String>,
    pub key: Option<String>,
    pub content_type: Option<String>,
    pub extra: bool,
    pub public: bool,
    pub timeout: u64,
}

/// Validated configuration for one run. Built once, then passed by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Configuration {
    pub action: Action,
    pub local_path: PathBuf,
    pub bucket: String,
    pub object: String,
    pub authentication: Authentication,
    /// Content-type override; only ever set for uploads.
    pub content_type: Option<String>,
    pub extra_checks: bool,
    /// Raw timeout flag; 0 selects the session default.
    pub timeout_secs: u64,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl Configuration {
    /// Validate `args`:
    /// mandatory flags first, then the action name, then the credential rules.
    pub fn resolve(args: &Arguments) -> Result<Self, LoaderError> {
        let mandatory = [
            ("action", &args.action),
            ("file", &args.file),
            ("bucket", &args.bucket),
            ("object", &args.object),
        ];
        if let Some((flag, _)) = mandatory.iter().find(|(_, v)| present(v).is_none()) {
            return Err(LoaderError::Config(format!(
                "missing mandatory parameter -{flag}, all of -action, -file, -bucket and -object must be filled"
            )));
        }
        // Checked above.
        let action: Action = present(&args.action).unwrap_or_default().parse()?;
        let local_path = PathBuf::from(present(&args.file).unwrap_or_default());
        let bucket = present(&args.bucket).unwrap_or_default().to_string();
        let object = present(&args.object).unwrap_or_default().to_string();

        let authentication = match (args.public, present(&args.key)) {
            (false, None) => {
                return Err(LoaderError::Config(
                    "missing credential, -key is mandatory when -public is not set".into(),
                ));
            }
            (false, Some(key)) => Authentication::ServiceAccount(PathBuf::from(key)),
            (true, Some(key)) => {
                warn!(key = %key, "Key parameter is unnecessary and discarded when public is set");
                Authentication::Anonymous
            }
            (true, None) => Authentication::Anonymous,
        };

        let content_type = match (action, present(&args.content_type)) {
            (Action::Upload, Some(ct)) => Some(ct.to_string()),
            (Action::Download, Some(ct)) => {
                warn!(content_type = %ct, "Type parameter only applies to upload, ignored");
                None
            }
            (_, None) => None,
        };

        Ok(Configuration {
            action,
            local_path,
            bucket,
            object,
            authentication,
            content_type,
            extra_checks: args.extra,
            timeout_secs: args.timeout,
        })
    }

    pub fn trace_loaded(&self) {
        info!(
            action = %self.action,
            file = %self.local_path.display(),
            bucket = %self.bucket,
            object = %self.object,
            anonymous = self.authentication.is_anonymous(),
            extra_checks = self.extra_checks,
            "Loaded configuration"
        );
        debug!(?self, "Configuration loaded (full debug)");
    }
}
