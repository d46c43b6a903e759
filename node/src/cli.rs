//! # CLI Interface
//!
//! Defines the command-line argument structure for `offcoin-node` using
//! `clap` derive. One binary, two roles: `serve` runs the settlement
//! server, `agent ...` drives a local agent device.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use offcoin_protocol::config::{DEFAULT_API_PORT, DEFAULT_METRICS_PORT};

/// offcoin settlement server and agent device.
#[derive(Parser, Debug)]
#[command(
    name = "offcoin-node",
    about = "Offline coin settlement for delivery orders",
    version,
    propagate_version = true
)]
pub struct OffcoinNodeCli {
    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "OFFCOIN_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the settlement server.
    Serve(ServeArgs),
    /// Operate a local agent device.
    Agent(AgentArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `serve` subcommand.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Directory holding the order store. Created on first run.
    #[arg(long, short = 'd', env = "OFFCOIN_DATA_DIR", default_value = "./offcoin-data")]
    pub data_dir: PathBuf,

    /// Port for the REST API.
    #[arg(long, env = "OFFCOIN_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "OFFCOIN_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,
}

/// Arguments shared by every `agent` action.
#[derive(Args, Debug)]
pub struct AgentArgs {
    /// Directory holding the device's cache and redemption log.
    #[arg(long, env = "OFFCOIN_AGENT_DIR", default_value = "./offcoin-agent")]
    pub agent_dir: PathBuf,

    /// Settlement server base URL.
    #[arg(long, env = "OFFCOIN_SERVER_URL", default_value = "http://127.0.0.1:8000")]
    pub server_url: String,

    /// Only sync orders assigned to this agent.
    #[arg(long, env = "OFFCOIN_AGENT_ID")]
    pub agent_id: Option<String>,

    #[command(subcommand)]
    pub action: AgentCommand,
}

/// What the agent device should do.
#[derive(Subcommand, Debug)]
pub enum AgentCommand {
    /// Pull the pending-order feed into the local cache.
    Sync,
    /// Verify a scanned code offline and log the redemption.
    Scan {
        /// The scanned payload: a raw token or `{"signedCoin": "..."}`.
        payload: String,
    },
    /// Show the redemption log.
    Log,
    /// Submit the redemption log and clear it once accepted.
    Submit,
}
