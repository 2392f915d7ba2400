// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::error::Error as _;
use std::io;
use std::process::ExitCode;

use clap::Parser;
use templater::cli::Args;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    // Diagnostics go to stderr; stdout carries rendered output only.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .try_init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    if args.version {
        println!("templater {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    init_logging(&args.log_level);

    let Some(options) = args.render_options() else {
        return ExitCode::from(2);
    };
    match templater::render::run(&options, io::stdin().lock(), io::stdout().lock()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            let mut cause = err.source();
            while let Some(inner) = cause {
                eprintln!("  caused by: {inner}");
                cause = inner.source();
            }
            ExitCode::FAILURE
        }
    }
}
