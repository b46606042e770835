//! # dockrestore
//! Restores a docker host from the most recent backup set: named volumes,
//! images, the application-data volume and the compose bundle.
mod commands;
mod observability;

use anyhow::Result;
use clap::{Parser, crate_version};
use librestore_cli::{GlobalOpts, Restore};

macro_rules! dockrestore_version {
    // For compatibility with Clap's default version handling.
    () => {
        concat!(crate_version!(), "\ncommit: ", env!("VERGEN_GIT_SHA"))
    };
}

// High-level commandline option definition
// This takes global options as well as the restore options
#[derive(Parser, Debug)]
#[clap(version = dockrestore_version!(), author = env!("CARGO_PKG_AUTHORS"))]
struct Opts {
    #[clap(flatten)]
    global: GlobalOpts,

    #[clap(flatten)]
    restore: Restore,
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    // A log that cannot be written is a usage error: nothing has been
    // touched yet and the run would leave no trace.
    observability::init(&opts.global).map_err(|err| {
        eprintln!("failed to initialize logging: {err:?}");
        err
    })?;

    tracing::debug!(
        "started by user {} with {:?}",
        nix::unistd::geteuid(),
        std::env::args_os()
    );

    let cmd_result = commands::restore::restore(opts.restore);
    if let Err(ref e) = cmd_result {
        tracing::error!("error in executing command: {:?}", e);
    }
    cmd_result
}
