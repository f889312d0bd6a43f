//! Tracing subscriber for the binaries.
//!
//! `ERROR` events (the fatal line) go to stderr; everything else goes to
//! stdout. The always channel stays enabled whatever `RUST_LOG` says.

use std::io::IsTerminal;

use bucket_loader_core::report::ALWAYS_TARGET;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const THIRD_PARTY_FILTER: &str = "hyper=warn,hyper_util=warn,h2=warn,reqwest=warn,rustls=warn,object_store=warn";

pub fn init() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .map(|filter| {
            format!("{filter},{THIRD_PARTY_FILTER}")
                .parse()
                .unwrap_or(filter)
        })
        .unwrap_or_else(|_| format!("info,{THIRD_PARTY_FILTER}").into())
        .add_directive(format!("{ALWAYS_TARGET}=info").parse()?);

    let writer = std::io::stderr
        .with_max_level(Level::ERROR)
        .or_else(std::io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(std::io::stdout().is_terminal())
                .with_target(false)
                .with_writer(writer),
        )
        .try_init()?;
    Ok(())
}
