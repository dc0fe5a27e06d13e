//! `quotaflow` plans, validates and simulates batches of documents that fan
//! out into calls to a quota-limited remote service.
//!
//! The binary is a wrapper around quotaflow-lib.
//!
//! Check whether 10 documents fit the limits in `quotaflow.toml`:
//! ```sh
//! quotaflow validate --documents 10
//! ```
//!
//! Get recommended settings for 10 documents of 80 pages:
//! ```sh
//! quotaflow plan --documents 10 --pages 80
//! ```
//!
//! Run a synthetic batch and print what the limiters saw:
//! ```sh
//! quotaflow --global-limit 20 simulate --documents 5 --pages 30 --latency 200ms
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use anyhow::Result;
use clap::Parser;
use formatters::log::init_logging;
use log::error;

mod commands;
mod formatters;
mod options;
mod verbosity;

use crate::commands::simulate::Simulation;
use crate::formatters::report::get_report_formatter;
use crate::options::{Command, QuotaflowOptions};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't run destructors, so the actual work happens
    // in another function
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Load the configuration and dispatch to the subcommand
fn run_main() -> Result<i32> {
    let opts = QuotaflowOptions::parse();
    init_logging(&opts.verbose);

    let config = match opts.config() {
        Ok(config) => config,
        Err(e) => {
            error!("Error while loading config: {e:#}");
            return Ok(ExitCode::ConfigFile as i32);
        }
    };

    let exit_code = match opts.command {
        Command::Validate { documents, pages } => {
            commands::validate(&config, documents, pages)
        }
        Command::Plan { documents, pages } => {
            commands::plan(&config, documents, pages)?;
            ExitCode::Success
        }
        Command::Simulate {
            documents,
            pages,
            latency,
            cost,
            fail_every,
            format,
        } => {
            let simulation = Simulation {
                documents,
                pages,
                latency,
                cost,
                fail_every,
            };
            let runtime = tokio::runtime::Runtime::new()?;
            let report = match runtime.block_on(commands::simulate(&config, simulation)) {
                Ok(report) => report,
                Err(e) => {
                    error!("Invalid configuration: {e:#}");
                    return Ok(ExitCode::ConfigFile as i32);
                }
            };
            println!("{}", get_report_formatter(format).format(&report)?);
            ExitCode::Success
        }
    };

    Ok(exit_code as i32)
}
