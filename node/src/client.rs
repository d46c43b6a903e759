//! # Server Client
//!
//! How the agent subcommands talk to the settlement server. Two calls: pull
//! the pending-order feed, and push the redemption log back in batches the
//! server will accept.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use url::Url;

use offcoin_protocol::agent::AgentDevice;
use offcoin_protocol::config::MAX_RECONCILE_BATCH;
use offcoin_protocol::wire::{PendingOrder, ReconcileRequest, ReconcileResponse};

/// Feed (GET) and reconciliation (POST) share one path.
const AGENT_ORDERS_PATH: &str = "agent/orders";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client bound to one settlement server.
#[derive(Debug, Clone)]
pub struct ServerClient {
    http: reqwest::Client,
    base: Url,
}

/// What a full log submission amounted to.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubmitTotals {
    pub batches: usize,
    pub settled: usize,
    pub already_settled: usize,
    pub conflicts: usize,
    /// Log entries removed after the server confirmed them.
    pub cleared: usize,
}

impl ServerClient {
    /// `base_url` is `http(s)://host[:port][/prefix]`.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base: Url = base_url
            .parse()
            .with_context(|| format!("invalid server URL: {}", base_url))?;
        if !matches!(base.scheme(), "http" | "https") {
            bail!("unsupported URL scheme: {}", base.scheme());
        }
        if base.host_str().is_none() {
            bail!("missing host in URL: {}", base_url);
        }
        // Relative joins replace the last segment unless the path ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("offcoin-node/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { http, base })
    }

    /// Pull the pending Offline orders, optionally narrowed to one agent.
    pub async fn pending_orders(&self, agent_id: Option<&str>) -> Result<Vec<PendingOrder>> {
        let request = self.feed_request(agent_id)?;
        self.execute(request).await
    }

    /// Post one reconciliation batch.
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<ReconcileResponse> {
        let request = self
            .http
            .post(self.endpoint(AGENT_ORDERS_PATH)?)
            .json(request)
            .build()
            .context("failed to build reconcile request")?;
        self.execute(request).await
    }

    /// Submit the device's whole log, oldest first, in batches no larger
    /// than the server accepts. Each batch is cleared only after the server
    /// answered it. On error, everything not yet confirmed stays logged.
    pub async fn submit_log(&self, device: &AgentDevice) -> Result<SubmitTotals> {
        let mut totals = SubmitTotals::default();

        while let Some(batch) = device.next_submission(MAX_RECONCILE_BATCH)? {
            let response = self
                .reconcile(&ReconcileRequest {
                    data: batch.records.clone(),
                })
                .await
                .with_context(|| {
                    format!(
                        "submission failed after {} batches; the log is kept for retry",
                        totals.batches
                    )
                })?;

            totals.cleared += device.confirm_submitted(&batch)?;
            totals.batches += 1;
            totals.settled += response.summary.settled;
            totals.already_settled += response.summary.already_settled;
            totals.conflicts += response.summary.conflicts;
            tracing::info!(
                records = batch.len(),
                settled = response.summary.settled,
                conflicts = response.summary.conflicts,
                "batch reconciled"
            );
        }
        Ok(totals)
    }

    fn feed_request(&self, agent_id: Option<&str>) -> Result<reqwest::Request> {
        let mut builder = self.http.get(self.endpoint(AGENT_ORDERS_PATH)?);
        if let Some(agent) = agent_id {
            builder = builder.query(&[("agentId", agent)]);
        }
        builder.build().context("failed to build feed request")
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| anyhow!("bad endpoint {}: {}", path, e))
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::Request) -> Result<T> {
        let method = request.method().clone();
        let url = request.url().clone();

        let response = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("{} {} failed", method, url))?;
        tracing::debug!(%method, %url, status = response.status().as_u16(), "server replied");

        let status_err = response.error_for_status_ref().err();
        if let Some(err) = status_err {
            let body = response.text().await.unwrap_or_default();
            bail!("{}: {}", err, body);
        }
        response
            .json()
            .await
            .with_context(|| format!("invalid JSON from {} {}", method, url))
    }
}
