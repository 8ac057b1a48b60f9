//! # CLI Interface
//!
//! Defines the command-line argument structure for `deedflow-node` using
//! `clap` derive. Supports three subcommands: `run`, `demo`, and
//! `version`.

use clap::{Parser, Subcommand};

use crate::logging::LogFormat;

/// Deedflow escrow node.
///
/// Hosts the escrow ledger for four-party asset sales and exposes the
/// transaction-submission HTTP API plus Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "deedflow-node",
    about = "Deedflow escrow node",
    version,
    propagate_version = true
)]
pub struct DeedflowCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the deedflow-node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the escrow node and serve the HTTP API.
    Run(RunArgs),
    /// Run a scripted end-to-end sale against an in-process ledger and
    /// print each step. Useful as a smoke test and a worked example.
    Demo(DemoArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Port for the HTTP transaction-submission API.
    #[arg(long, env = "DEEDFLOW_PORT", default_value_t = 8750)]
    pub port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "DEEDFLOW_METRICS_PORT", default_value_t = 8751)]
    pub metrics_port: u16,

    /// Account id of the seller. Fixed for the lifetime of the node.
    #[arg(long, env = "DEEDFLOW_SELLER")]
    pub seller: String,

    /// Account id of the inspector. Fixed for the lifetime of the node.
    #[arg(long, env = "DEEDFLOW_INSPECTOR")]
    pub inspector: String,

    /// Account id of the lender. Fixed for the lifetime of the node.
    #[arg(long, env = "DEEDFLOW_LENDER")]
    pub lender: String,

    /// Account id under which the escrow holds assets and funds.
    #[arg(long, env = "DEEDFLOW_ESCROW_ACCOUNT", default_value = "escrow-vault")]
    pub escrow_account: String,

    /// Log output format.
    #[arg(long, env = "DEEDFLOW_LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Arguments for the `demo` subcommand.
#[derive(Parser, Debug)]
pub struct DemoArgs {
    /// Purchase price for the demo listing, in smallest units.
    #[arg(long, default_value_t = 10)]
    pub price: u64,

    /// Earnest deposit for the demo listing, in smallest units.
    #[arg(long, default_value_t = 5)]
    pub earnest: u64,
}
