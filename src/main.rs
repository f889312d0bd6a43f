use std::process::ExitCode;

use bucket_loader::{cli, logging, Cli};
use bucket_loader_core::report::{self, RunClock};
use clap::{CommandFactory, Parser};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = logging::init() {
        eprintln!("[ERROR] cannot initialise logging: {e}");
        return ExitCode::FAILURE;
    }
    let clock = RunClock::start();
    report::greeting(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse_from(cli::normalize_args(std::env::args_os(), Cli::command()));
    let outcome = cli::run(cli.into_arguments()).await;
    cli::finish(&outcome, &clock)
}
