// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # offcoin Node
//!
//! Entry point for the `offcoin-node` binary. Parses CLI arguments,
//! initializes logging, and either runs the settlement server or performs
//! one agent-device action.
//!
//! - `serve`: order store, REST API, metrics
//! - `agent sync`: pull the pending-order feed into the device cache
//! - `agent scan`: verify a scanned code offline and log it
//! - `agent log`: print the redemption log
//! - `agent submit`: reconcile the log with the server, then clear it
//! - `version`: print build version information

mod api;
mod cli;
mod client;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use offcoin_protocol::agent::{AgentDevice, AgentStore};
use offcoin_protocol::clock::SystemClock;
use offcoin_protocol::storage::OrderDb;
use offcoin_protocol::wire::PendingOrder;

use cli::{AgentArgs, AgentCommand, Commands, OffcoinNodeCli};
use client::ServerClient;
use logging::{LogFormat, Role};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = OffcoinNodeCli::parse();
    let format = LogFormat::from_str_lossy(&cli.log_format);

    match cli.command {
        Commands::Serve(args) => {
            logging::init_logging(Role::Server, format)?;
            serve(args).await
        }
        Commands::Agent(args) => {
            logging::init_logging(Role::Agent, format)?;
            run_agent(args).await
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Runs the settlement server: REST API and metrics endpoint.
async fn serve(args: cli::ServeArgs) -> Result<()> {
    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting offcoin-node"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("orders");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let db = Arc::new(
        OrderDb::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?,
    );
    tracing::info!(
        path = %db_path.display(),
        orders = db.order_count(),
        coins = db.coin_count(),
        "database opened"
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            offcoin_protocol::config::PROTOCOL_VERSION,
        ),
        db: Arc::clone(&db),
        clock: Arc::new(SystemClock),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
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

    db.flush().context("failed to flush database on shutdown")?;
    tracing::info!("offcoin-node stopped");
    Ok(())
}

/// Performs one agent-device action.
async fn run_agent(args: AgentArgs) -> Result<()> {
    std::fs::create_dir_all(&args.agent_dir).with_context(|| {
        format!(
            "failed to create agent directory: {}",
            args.agent_dir.display()
        )
    })?;
    let store = AgentStore::open(&args.agent_dir).with_context(|| {
        format!(
            "failed to open agent store at {}",
            args.agent_dir.display()
        )
    })?;
    let device = AgentDevice::open(store, Arc::new(SystemClock))?;

    match args.action {
        AgentCommand::Sync => {
            let client = ServerClient::new(&args.server_url)?;
            let feed = client.pending_orders(args.agent_id.as_deref()).await?;
            let cached = device.refresh(feed.into_iter().map(PendingOrder::into_order).collect())?;
            println!("cached {} pending offline orders", cached);
        }
        AgentCommand::Scan { payload } => match device.scan(&payload) {
            Ok(record) => println!("{}", serde_json::to_string(&record)?),
            Err(e) => {
                tracing::warn!(error = %e, "scan rejected");
                anyhow::bail!("scan rejected: {}", e);
            }
        },
        AgentCommand::Log => {
            let pending = device.pending_submission()?;
            println!("{}", serde_json::to_string_pretty(&pending)?);
            if let Some(age) = device.cache_age() {
                eprintln!("cache age: {}s", age.num_seconds());
            }
        }
        AgentCommand::Submit => {
            if device.pending_submission()?.is_empty() {
                println!("nothing to submit");
                return Ok(());
            }
            let client = ServerClient::new(&args.server_url)?;
            let totals = client.submit_log(&device).await?;
            println!(
                "{} batches: {} settled, {} already settled, {} conflicts ({} entries cleared)",
                totals.batches,
                totals.settled,
                totals.already_settled,
                totals.conflicts,
                totals.cleared,
            );
        }
    }
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("offcoin-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol     {}", offcoin_protocol::config::PROTOCOL_VERSION);
    println!("rustc        {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that branch simply never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
