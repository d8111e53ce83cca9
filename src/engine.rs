// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Engine
 * Three-node state machine driving the Reason -> Act -> Observe loop
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::cortex;
use crate::findings::extract_findings;
use crate::frontier::diversity_override;
use crate::http_client::ProbeClient;
use crate::probe::execute_batch;
use crate::report::write_trace;
use crate::router::{route, RouteLabel};
use crate::state::{now_rfc3339, Action, Decision, RunState, StopReason};

/// What a completed run hands back to the caller.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub trace_path: PathBuf,
    pub findings_count: usize,
    pub stop_reason: StopReason,
    pub requests_used: u32,
    pub hops: u32,
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
}

/// Poll the target root until it answers or the window closes. A closed
/// window is not fatal; the run proceeds and lets the budget decide.
async fn wait_for_target(client: &ProbeClient, config: &AgentConfig) {
    if config.wait_for_target_ms == 0 {
        return;
    }
    let deadline = std::time::Instant::now() + Duration::from_millis(config.wait_for_target_ms);
    let root = match config.target_url_for("/") {
        Ok(url) => url,
        Err(_) => return,
    };
    loop {
        match client.get(root.clone()).await {
            Ok(response) => {
                info!("Target answered readiness probe with {}", response.status);
                return;
            }
            Err(e) => debug!("Target not ready yet: {}", e),
        }
        if std::time::Instant::now() >= deadline {
            warn!(
                "Target did not become ready within {}ms; starting anyway",
                config.wait_for_target_ms
            );
            return;
        }
        tokio::time::sleep(Duration::from_millis(config.wait_interval_ms)).await;
    }
}

/// Run the agent once against the configured target.
pub async fn run_once(config: &AgentConfig) -> Result<RunSummary> {
    run_once_with_cancel(config, None).await
}

/// `run_once` with a host-provided cancellation signal. When the signal
/// flips, no further requests are issued and the reporter still runs over
/// whatever state exists.
pub async fn run_once_with_cancel(
    config: &AgentConfig,
    cancel: Option<watch::Receiver<bool>>,
) -> Result<RunSummary> {
    config
        .ensure_valid()
        .context("refusing to start with invalid configuration")?;

    let client = ProbeClient::new(config.request_timeout_ms, config.body_snippet_bytes)
        .context("failed to construct probe HTTP client")?;
    let provider = cortex::create_provider(config);

    let mut state = RunState::new();
    let started_at = now_rfc3339();
    info!(
        "Run {} starting against {} (budget: {} requests, {} hops)",
        state.run_id, config.target_url, config.max_requests, config.max_hops
    );

    wait_for_target(&client, config).await;

    loop {
        if is_cancelled(&cancel) {
            warn!("Cancellation requested; routing to report");
            state.decision = Decision::Report;
            route(&mut state, config);
            break;
        }

        // Probe node: execute the staged batch, bootstrapping the first hop
        // with a root recon fetch.
        let actions: Vec<Action> = if state.next_actions.is_empty() {
            vec![Action::get("/", "initial reconnaissance of the target root")]
        } else {
            std::mem::take(&mut state.next_actions)
        };
        let outcome = execute_batch(&mut state, &client, config, &actions).await;
        debug!(
            "Hop {}: {} ok / {} failed",
            state.hops, outcome.successes, outcome.failures
        );

        if is_cancelled(&cancel) {
            warn!("Cancellation requested; routing to report");
            state.decision = Decision::Report;
            route(&mut state, config);
            break;
        }

        // Cortex node.
        let decision = cortex::reason(&mut state, provider.as_deref(), &client, config).await;

        // Diversity enforcement may commandeer the staged batch.
        if decision == Decision::Probe {
            if let Some(tool) = diversity_override(&state) {
                info!("Diversity enforcement forcing {} on the next hop", tool);
                state.next_actions =
                    vec![Action::forced(tool, "/", "tool diversity enforcement")];
            }
        }

        // Router node.
        match route(&mut state, config) {
            RouteLabel::Probe => continue,
            RouteLabel::Report => break,
        }
    }

    // Reporter: findings are always derived from whatever observations
    // exist, including on early termination.
    let findings = extract_findings(&state.observations);
    let finished_at = now_rfc3339();
    let trace_path = write_trace(&state, config, &findings, &started_at, &finished_at)
        .await
        .context("failed to write trace artifact")?;

    let stop_reason = state
        .stop_reason
        .unwrap_or(StopReason::DecisionReport);

    let summary = RunSummary {
        run_id: state.run_id.clone(),
        trace_path,
        findings_count: findings.len(),
        stop_reason,
        requests_used: state.metrics.requests(),
        hops: state.hops,
    };
    info!(
        "Run {} finished: {} findings, {} requests, {} hops, stop={}",
        summary.run_id,
        summary.findings_count,
        summary.requests_used,
        summary.hops,
        summary.stop_reason.as_str()
    );
    Ok(summary)
}
