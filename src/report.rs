// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Trace Reporter
 * Assembles and persists the run trace artifact
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

use crate::config::AgentConfig;
use crate::errors::AgentError;
use crate::findings::Finding;
use crate::state::RunState;

/// The fixed graph shape recorded in every trace.
const NODES_VISITED: [&str; 3] = ["probe", "cortex", "report"];

/// Count findings per OWASP category, sorted by descending count with ties
/// broken by first appearance.
fn owasp_summary(findings: &[Finding]) -> Vec<Value> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
    for finding in findings {
        if !counts.contains_key(&finding.owasp) {
            order.push(finding.owasp.clone());
        }
        *counts.entry(finding.owasp.clone()).or_insert(0) += 1;
    }

    let mut entries: Vec<(usize, String, u32)> = order
        .into_iter()
        .enumerate()
        .map(|(idx, category)| {
            let count = counts[&category];
            (idx, category, count)
        })
        .collect();
    entries.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));

    entries
        .into_iter()
        .map(|(_, category, count)| json!({ "category": category, "count": count }))
        .collect()
}

/// Build the complete trace document.
pub fn build_trace(
    state: &RunState,
    config: &AgentConfig,
    findings: &[Finding],
    started_at: &str,
    finished_at: &str,
) -> Value {
    json!({
        "run_id": state.run_id,
        "target": config.target_url,
        "startedAt": started_at,
        "finishedAt": finished_at,
        "summary": {
            "findingsCount": findings.len(),
            "owaspCategories": owasp_summary(findings),
            "toolUsage": state.tool_usage,
            "batchStats": state.batch_stats,
            "skippedHops": state.skipped_hops,
        },
        "findings": findings,
        "observations": state.observations,
        "reasoningLog": state.reasoning_log,
        "metrics": {
            "requests": state.metrics.requests(),
            "perTool": state.metrics.per_tool_snapshot(),
            "errors": state.metrics.errors_snapshot(),
        },
        "llmMeta": state.llm_meta,
        "decisions": state.decisions,
        "hops": state.hops,
        "stopReason": state.stop_reason,
        "visitedPaths": state.visited_paths(),
        "requestBudget": {
            "used": state.metrics.requests(),
            "max": config.max_requests,
        },
        "nodesVisited": NODES_VISITED,
    })
}

/// Serialize the trace and write `traces/trace-<runId>.json`. I/O failures
/// here are fatal for the process.
pub async fn write_trace(
    state: &RunState,
    config: &AgentConfig,
    findings: &[Finding],
    started_at: &str,
    finished_at: &str,
) -> Result<PathBuf, AgentError> {
    let trace = build_trace(state, config, findings, started_at, finished_at);
    let pretty = serde_json::to_string_pretty(&trace)
        .map_err(|e| AgentError::Report(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    tokio::fs::create_dir_all(&config.trace_dir).await?;
    let path = config.trace_dir.join(format!("trace-{}.json", state.run_id));
    tokio::fs::write(&path, pretty.as_bytes()).await?;

    info!("Trace written to {}", path.display());
    Ok(path)
}
