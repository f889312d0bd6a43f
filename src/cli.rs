//! Command-line surface for bucket-loader.
//!
//! Two parsers share this module:
//! - [`Cli`]: the dual-direction `bucket-loader` binary
//! - [`UploadCli`]: the upload-only `bucket-upload` binary, always authenticated
//!
//! Mandatory flags are `Option`s here; the resolver in `bucket-loader-core`
//! names the missing one and fails the run the same way for both binaries.
//!
//! Flags are written Go-style (`-file a.txt`, `-file=a.txt`, `-extra`) or
//! GNU-style (`--file=a.txt`); [`normalize_args`] rewrites the known ones into
//! the attached `--name=value` form before clap sees them.

use std::collections::HashMap;
use std::ffi::OsString;
use std::process::ExitCode;

use bucket_loader_core::config::Arguments;
use bucket_loader_core::contract::StorageConnector;
use bucket_loader_core::report::{self, RunClock};
use bucket_loader_core::transfer::{execute, TransferReport};
use bucket_loader_core::LoaderError;
use clap::{ArgAction, Command, Parser};

use crate::gcs::GcsConnector;

/// Upload a local file to, or download it from, a Google Cloud Storage bucket.
#[derive(Parser, Debug)]
#[clap(
    name = "bucket-loader",
    version,
    about = "Upload a local file to, or download it from, a Google Cloud Storage bucket"
)]
pub struct Cli {
    /// Type of action, either 'upload' or 'download' (mandatory)
    #[clap(long)]
    pub action: Option<String>,

    /// Path of the local file to upload, or to download into (mandatory)
    #[clap(long)]
    pub file: Option<String>,

    /// Name of the bucket (mandatory)
    #[clap(long)]
    pub bucket: Option<String>,

    /// Path of the object inside the bucket (mandatory)
    #[clap(long)]
    pub object: Option<String>,

    /// Path of the service-account JSON key (mandatory unless -public is set)
    #[clap(long)]
    pub key: Option<String>,

    /// IANA media type for the uploaded object (optional, upload only)
    #[clap(long = "type")]
    pub content_type: Option<String>,

    /// Check bucket and object state before and after the transfer
    #[clap(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    pub extra: bool,

    /// Connect without authentication
    #[clap(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    pub public: bool,

    /// Deadline for the whole transfer in seconds; 0 means 60
    #[clap(long, default_value_t = 0)]
    pub timeout: u64,
}

impl Cli {
    pub fn into_arguments(self) -> Arguments {
        Arguments {
            action: self.action,
            file: self.file,
            bucket: self.bucket,
            object: self.object,
            key: self.key,
            content_type: self.content_type,
            extra: self.extra,
            public: self.public,
            timeout: self.timeout,
        }
    }
}

/// Upload a local file to a Google Cloud Storage bucket with a service-account key.
#[derive(Parser, Debug)]
#[clap(
    name = "bucket-upload",
    version,
    about = "Upload a local file to a Google Cloud Storage bucket"
)]
pub struct UploadCli {
    /// Path of the local file to upload (mandatory)
    #[clap(long)]
    pub file: Option<String>,

    /// Name of the bucket (mandatory)
    #[clap(long)]
    pub bucket: Option<String>,

    /// Path of the object inside the bucket (mandatory)
    #[clap(long)]
    pub object: Option<String>,

    /// Path of the service-account JSON key (mandatory)
    #[clap(long)]
    pub key: Option<String>,

    /// IANA media type for the uploaded object (optional)
    #[clap(long = "type")]
    pub content_type: Option<String>,

    /// Check bucket and object state before and after the upload
    #[clap(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    pub extra: bool,
}

impl UploadCli {
    pub fn into_arguments(self) -> Arguments {
        Arguments {
            action: Some("upload".to_string()),
            file: self.file,
            bucket: self.bucket,
            object: self.object,
            key: self.key,
            content_type: self.content_type,
            extra: self.extra,
            public: false,
            timeout: 0,
        }
    }
}

/// How a long flag consumes the tokens after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagKind {
    /// `-help`, `-version`: never takes a value.
    Switch,
    /// `-extra`, `-public`: value only when attached with `=`.
    Bool,
    /// `-file a.txt` or `-file=a.txt`.
    Value,
}

enum Rewrite {
    Keep,
    Flag(String),
    NeedsValue(String),
    Rest,
}

fn flag_kinds(mut command: Command) -> HashMap<String, FlagKind> {
    command.build();
    command
        .get_arguments()
        .filter_map(|arg| {
            let long = arg.get_long()?;
            let kind = if !arg.get_action().takes_values() {
                FlagKind::Switch
            } else if arg.get_num_args().is_some_and(|range| range.min_values() == 0) {
                FlagKind::Bool
            } else {
                FlagKind::Value
            };
            Some((long.to_string(), kind))
        })
        .collect()
}

fn rewrite(token: &str, kinds: &HashMap<String, FlagKind>) -> Rewrite {
    if token == "--" {
        return Rewrite::Rest;
    }
    let Some(flag) = token.strip_prefix("--").or_else(|| token.strip_prefix('-')) else {
        return Rewrite::Keep;
    };
    let (name, attached) = match flag.split_once('=') {
        Some((name, _)) => (name, true),
        None => (flag, false),
    };
    match (kinds.get(name), attached) {
        (None, _) => Rewrite::Keep,
        (Some(FlagKind::Bool), false) => Rewrite::Flag(format!("--{name}=true")),
        (Some(FlagKind::Value), false) => Rewrite::NeedsValue(format!("--{name}=")),
        (Some(_), _) => Rewrite::Flag(format!("--{flag}")),
    }
}

/// Rewrite Go-style flags for `command` into clap's attached `--name=value` form.
///
/// Only long flags `command` knows are touched. A value flag written without
/// `=` takes the next token verbatim, even one starting with `-`; a bare
/// boolean flag means `true` and never consumes the next token. Unknown
/// tokens, short flags and everything after a bare `--` pass through.
pub fn normalize_args<I>(args: I, command: Command) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let kinds = flag_kinds(command);
    let mut args = args.into_iter();
    let mut normalized: Vec<OsString> = args.next().into_iter().collect();
    while let Some(arg) = args.next() {
        let action = arg
            .to_str()
            .map(|token| rewrite(token, &kinds))
            .unwrap_or(Rewrite::Keep);
        match action {
            Rewrite::Keep => normalized.push(arg),
            Rewrite::Flag(flag) => normalized.push(OsString::from(flag)),
            Rewrite::NeedsValue(prefix) => match args.next() {
                Some(value) => {
                    let mut joined = OsString::from(prefix);
                    joined.push(value);
                    normalized.push(joined);
                }
                None => normalized.push(OsString::from(prefix.trim_end_matches('='))),
            },
            Rewrite::Rest => {
                normalized.push(arg);
                normalized.extend(args.by_ref());
                break;
            }
        }
    }
    normalized
}

/// Run one transfer against Google Cloud Storage.
pub async fn run(args: Arguments) -> Result<TransferReport, LoaderError> {
    let connector = GcsConnector::new();
    run_with(args, &connector).await
}

/// Run one transfer against any storage backend.
pub async fn run_with(
    args: Arguments,
    connector: &dyn StorageConnector,
) -> Result<TransferReport, LoaderError> {
    tracing::debug!(?args, "Command-line arguments parsed");
    execute(&args, connector).await
}

/// Map the outcome of a run to the process exit code; reports the failure or
/// the closing duration line.
pub fn finish(outcome: &Result<TransferReport, LoaderError>, clock: &RunClock) -> ExitCode {
    match outcome {
        Ok(report) => {
            tracing::debug!(?report, "Transfer report");
            clock.finish();
            ExitCode::SUCCESS
        }
        Err(e) => {
            report::failure(e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn known_flags_are_rewritten_to_attached_form() {
        let normalized = normalize_args(
            os(&[
                "bucket-loader",
                "-action=upload",
                "-file",
                "a.txt",
                "-extra",
                "--bucket=b",
                "-h",
                "-help",
            ]),
            Cli::command(),
        );
        assert_eq!(
            normalized,
            os(&[
                "bucket-loader",
                "--action=upload",
                "--file=a.txt",
                "--extra=true",
                "--bucket=b",
                "-h",
                "--help",
            ])
        );
    }

    #[test]
    fn value_flag_takes_next_token_even_with_leading_dash() {
        let normalized = normalize_args(os(&["bucket-loader", "-object", "-dash"]), Cli::command());
        assert_eq!(normalized, os(&["bucket-loader", "--object=-dash"]));

        let cli = Cli::try_parse_from(normalized).expect("parse");
        assert_eq!(cli.object.as_deref(), Some("-dash"));
    }

    #[test]
    fn bare_boolean_flag_does_not_consume_next_token() {
        let normalized = normalize_args(os(&["bucket-loader", "-extra", "false"]), Cli::command());
        assert_eq!(normalized, os(&["bucket-loader", "--extra=true", "false"]));
        assert!(Cli::try_parse_from(normalized).is_err());
    }

    #[test]
    fn unknown_flags_pass_through_untouched() {
        let normalized = normalize_args(os(&["bucket-loader", "-sideways=1"]), Cli::command());
        assert_eq!(normalized, os(&["bucket-loader", "-sideways=1"]));
    }

    #[test]
    fn tokens_after_double_dash_are_untouched() {
        let normalized = normalize_args(os(&["bucket-loader", "--", "-file"]), Cli::command());
        assert_eq!(normalized, os(&["bucket-loader", "--", "-file"]));
    }

    #[test]
    fn upload_variant_knows_only_its_own_flags() {
        let normalized = normalize_args(
            os(&["bucket-upload", "-key", "k.json", "-public"]),
            UploadCli::command(),
        );
        assert_eq!(normalized, os(&["bucket-upload", "--key=k.json", "-public"]));
    }

    #[test]
    fn go_style_flags_parse_into_arguments() {
        let cli = Cli::try_parse_from(normalize_args(
            os(&[
                "bucket-loader",
                "-action=Download",
                "-file=out.txt",
                "-bucket=b",
                "-object=dir/o",
                "-public=true",
                "-extra",
                "-timeout",
                "15",
            ]),
            Cli::command(),
        ))
        .expect("parse");
        let args = cli.into_arguments();
        assert_eq!(args.action.as_deref(), Some("Download"));
        assert_eq!(args.object.as_deref(), Some("dir/o"));
        assert!(args.public);
        assert!(args.extra);
        assert_eq!(args.timeout, 15);
        assert_eq!(args.key, None);
    }

    #[test]
    fn boolean_flags_accept_explicit_false() {
        let cli = Cli::try_parse_from(normalize_args(
            os(&["bucket-loader", "-extra=false"]),
            Cli::command(),
        ))
        .expect("parse");
        assert!(!cli.extra);
    }

    #[test]
    fn upload_variant_is_always_authenticated_upload() {
        let cli = UploadCli::try_parse_from(normalize_args(
            os(&[
                "bucket-upload",
                "-file=a.txt",
                "-bucket=b",
                "-object=o",
                "-key=k.json",
                "-type=text/plain",
            ]),
            UploadCli::command(),
        ))
        .expect("parse");
        let args = cli.into_arguments();
        assert_eq!(args.action.as_deref(), Some("upload"));
        assert!(!args.public);
        assert_eq!(args.timeout, 0);
        assert_eq!(args.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn upload_variant_rejects_dual_direction_flags() {
        let parsed = UploadCli::try_parse_from(normalize_args(
            os(&["bucket-upload", "-public"]),
            UploadCli::command(),
        ));
        assert!(parsed.is_err());
    }
}
