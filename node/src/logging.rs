//! # Logging
//!
//! One `tracing` subscriber per process, writing to stderr. stdout belongs
//! to the agent subcommands, which print records and totals for scripts.
//!
//! The server logs chatty and wide (targets, file and line). The agent CLI
//! stays quiet unless something is off, since an agent runs it by hand.
//! `RUST_LOG` replaces either default.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Line format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    /// One JSON object per event, fields flattened to the top level.
    Json,
}

impl LogFormat {
    /// `"json"` in any case selects JSON. Anything else is pretty.
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// What the process is doing, which decides the default verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// `offcoin-node serve`
    Server,
    /// `offcoin-node agent ...`
    Agent,
}

impl Role {
    /// Filter used when `RUST_LOG` is unset.
    pub fn default_filter(self) -> &'static str {
        match self {
            Role::Server => "offcoin_node=info,offcoin_protocol=info,tower_http=debug",
            Role::Agent => "offcoin_node=warn,offcoin_protocol=warn",
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(role: Role, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(role.default_filter()));
    let verbose = role == Role::Server;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbose)
                    .with_file(verbose)
                    .with_line_number(verbose),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(std::io::stderr)
                    .with_target(verbose),
            )
            .try_init(),
    };
    installed.context("a tracing subscriber is already installed")?;

    tracing::debug!(?role, ?format, "logging initialized");
    Ok(())
}
