// Copyright (c) 2026 Deedflow Contributors. MIT License.
// See LICENSE for details.

//! # Deedflow Escrow Node
//!
//! Entry point for the `deedflow-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and serves the transaction-submission
//! HTTP API for the escrow ledger.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the escrow node
//! - `demo`    — run a scripted end-to-end sale in process
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use cli::{Commands, DeedflowCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DeedflowCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Demo(args) => run_demo(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full escrow node: transaction API and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "deedflow_node=info,deedflow_contracts=info,tower_http=debug",
        args.log_format,
    );

    tracing::info!(
        port = args.port,
        metrics_port = args.metrics_port,
        seller = %args.seller,
        inspector = %args.inspector,
        lender = %args.lender,
        escrow_account = %args.escrow_account,
        "starting deedflow-node"
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Application state ---
    let app_state = api::AppState::new(
        args.seller,
        args.inspector,
        args.lender,
        args.escrow_account,
        Arc::clone(&node_metrics),
    );

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("deedflow-node stopped");
    Ok(())
}

/// Runs a scripted four-party sale against an in-process ledger and
/// prints each step. Doubles as a smoke test and a worked example of
/// the escrow lifecycle.
fn run_demo(args: cli::DemoArgs) -> Result<()> {
    use deedflow_contracts::escrow::EscrowLedger;
    use deedflow_contracts::ledger::{CashLedger, ValueLedger};
    use deedflow_contracts::registry::{AssetRegistry, DeedRegistry};
    use parking_lot::Mutex;

    logging::init_logging("deedflow_node=info", LogFormat::Pretty);

    let price = args.price;
    let earnest = args.earnest.min(args.price);

    let registry = Arc::new(Mutex::new(DeedRegistry::new()));
    let ledger = Arc::new(Mutex::new(CashLedger::new()));
    let mut escrow = EscrowLedger::new(
        Arc::clone(&registry),
        Arc::clone(&ledger),
        "escrow-vault".to_string(),
        "seller".to_string(),
        "inspector".to_string(),
        "lender".to_string(),
    );

    println!("Deedflow demo sale (price={price}, earnest={earnest})");

    let asset_id = registry.lock().mint("seller".into(), "ipfs://deed/demo".into());
    registry
        .lock()
        .approve_transfer(asset_id, &"seller".into(), &"escrow-vault".into())?;
    ledger.lock().credit(&"buyer".into(), earnest)?;
    ledger.lock().credit(&"lender".into(), price - earnest)?;
    println!("  minted asset {asset_id} to seller, funded buyer and lender");

    escrow.list(&"seller".into(), asset_id, "buyer".into(), price, earnest)?;
    println!("  seller listed asset {asset_id}; escrow holds custody");

    escrow.deposit_earnest(&"buyer".into(), asset_id, earnest)?;
    println!("  buyer deposited earnest of {earnest}");

    escrow.update_inspection(&"inspector".into(), asset_id, true)?;
    println!("  inspector recorded a passing inspection");

    for party in ["buyer", "seller", "lender"] {
        escrow.approve_sale(&party.to_string(), asset_id)?;
        println!("  {party} approved the sale");
    }

    escrow.fund_loan(&"lender".into(), asset_id, price - earnest)?;
    println!("  lender funded the remaining {}", price - earnest);

    escrow.finalize_sale(asset_id)?;
    println!("  sale finalized");

    let owner = registry
        .lock()
        .owner_of(asset_id)
        .context("demo asset disappeared from the registry")?;
    let seller_balance = ledger.lock().balance_of(&"seller".into());
    println!("  asset {asset_id} now owned by {owner}; seller balance {seller_balance}");

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("deedflow-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc         {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
