#![doc = "bucket-loader-core: configuration rules, storage contract, session manager and transfer engine for bucket-loader."]

//! All business logic lives here; provider clients live in the CLI crate and
//! plug in through the traits in [`contract`].
//!
//! # Usage
//! Build [`config::Arguments`] from the command line, pass them with a
//! [`contract::StorageConnector`] to [`transfer::execute`], and turn the
//! resulting `Result` into an exit code.

pub mod config;
pub mod contract;
pub mod error;
pub mod memory;
pub mod report;
pub mod session;
pub mod transfer;

pub use config::{Action, Arguments, Configuration};
pub use error::{LoaderError, StorageError};
pub use transfer::{execute, run_transfer, TransferReport};
