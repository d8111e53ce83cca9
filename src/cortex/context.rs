// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Compact reasoning context derived from run state.
//!
//! The cortex never sees the raw state; it sees this bounded projection,
//! so a long run cannot blow up the prompt.

use serde_json::{json, Value};

use crate::config::AgentConfig;
use crate::findings::extract_findings;
use crate::frontier::scored_candidates;
use crate::http_client::ProbeClient;
use crate::state::RunState;

const OBSERVATION_WINDOW: usize = 8;
const CANDIDATE_LIMIT: usize = 15;
const ERROR_WINDOW: usize = 5;
const DECISION_WINDOW: usize = 5;
const PATH_STATS_LIMIT: usize = 10;
const BODY_PREVIEW_CHARS: usize = 300;

fn preview(text: &str) -> String {
    text.chars().take(BODY_PREVIEW_CHARS).collect()
}

/// Build the bounded context document handed to the LLM.
pub fn build_context(state: &RunState, client: &ProbeClient, config: &AgentConfig) -> Value {
    let observations: Vec<Value> = state
        .observations
        .iter()
        .rev()
        .take(OBSERVATION_WINDOW)
        .rev()
        .map(|o| {
            json!({
                "id": o.id,
                "tool": o.tool,
                "url": o.url,
                "status": o.status,
                "latencyMs": o.latency_ms,
                "note": o.note,
                "bodyPreview": preview(&o.body_snippet),
            })
        })
        .collect();

    let requests_used = state.metrics.requests();
    let remaining_budget = config.max_requests.saturating_sub(requests_used);
    let remaining_hops = config.max_hops.saturating_sub(state.hops);

    let candidates = scored_candidates(state, CANDIDATE_LIMIT, config.max_hits_per_path);

    let findings: Vec<Value> = extract_findings(&state.observations)
        .iter()
        .map(|f| {
            json!({
                "type": f.finding_type,
                "subtype": f.subtype,
                "path": f.path,
                "owasp": f.owasp,
            })
        })
        .collect();

    let errors: Vec<Value> = state
        .metrics
        .last_errors(ERROR_WINDOW)
        .iter()
        .map(|e| json!({ "kind": e.kind, "path": e.path, "message": e.message }))
        .collect();

    let decisions: Vec<Value> = state
        .decisions
        .iter()
        .rev()
        .take(DECISION_WINDOW)
        .rev()
        .map(|d| json!({ "decision": d.decision, "actions": d.actions }))
        .collect();

    let mut path_stats: Vec<(&String, &crate::state::PathStat)> =
        state.path_stats.iter().collect();
    path_stats.sort_by(|a, b| b.1.hits.cmp(&a.1.hits).then_with(|| a.0.cmp(b.0)));
    let path_stats_summary: Vec<Value> = path_stats
        .into_iter()
        .take(PATH_STATS_LIMIT)
        .map(|(path, stat)| {
            json!({
                "path": path,
                "hits": stat.hits,
                "lastStatus": stat.last_status,
                "lastTool": stat.last_tool,
            })
        })
        .collect();

    let session_state = config
        .parsed_target()
        .map(|origin| client.session_state(&origin))
        .unwrap_or_default();

    json!({
        "target": config.target_url,
        "recentObservations": observations,
        "remainingBudget": remaining_budget,
        "remainingHops": remaining_hops,
        "visitedPaths": state.visited_paths(),
        "candidates": candidates,
        "findings": findings,
        "sessionState": session_state,
        "recentErrors": errors,
        "recentDecisions": decisions,
        "pathStatsSummary": path_stats_summary,
        "captcha": state.captcha,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{new_observation_id, now_rfc3339, Observation, ToolKind};

    fn observation(n: usize) -> Observation {
        Observation {
            id: new_observation_id(ToolKind::HttpGet),
            tool: ToolKind::HttpGet,
            label: "t".into(),
            url: format!("http://target:3000/p{}", n),
            method: "GET".into(),
            status: 200,
            headers: Default::default(),
            body_snippet: "x".repeat(2000),
            latency_ms: 1,
            timestamp: now_rfc3339(),
            note: None,
        }
    }

    #[test]
    fn context_is_bounded() {
        let mut state = RunState::new();
        for n in 0..30 {
            state.observations.push(observation(n));
        }
        for n in 0..40 {
            state.candidates.push_back(format!("/c{}", n));
        }
        let config = AgentConfig::default();
        let client = ProbeClient::new(1000, 2000).unwrap();

        let context = build_context(&state, &client, &config);
        assert_eq!(
            context["recentObservations"].as_array().unwrap().len(),
            OBSERVATION_WINDOW
        );
        assert_eq!(
            context["candidates"].as_array().unwrap().len(),
            CANDIDATE_LIMIT
        );
        // The newest observation is last in the window.
        let last = context["recentObservations"]
            .as_array()
            .unwrap()
            .last()
            .unwrap();
        assert_eq!(last["url"], "http://target:3000/p29");
        // Body previews are clipped well below the snippet limit.
        assert!(last["bodyPreview"].as_str().unwrap().len() <= BODY_PREVIEW_CHARS);
    }

    #[test]
    fn context_reports_remaining_budget() {
        let state = RunState::new();
        state.metrics.try_reserve(3, 80).unwrap();
        let config = AgentConfig::default();
        let client = ProbeClient::new(1000, 2000).unwrap();
        let context = build_context(&state, &client, &config);
        assert_eq!(context["remainingBudget"], 77);
        assert_eq!(context["remainingHops"], 40);
    }
}
