pub mod cli;
pub mod gcs;
pub mod logging;

pub use cli::{finish, normalize_args, run, run_with, Cli, UploadCli};
pub use gcs::GcsConnector;
