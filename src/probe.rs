// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Probe Executor
 * Translates staged action batches into bounded concurrent HTTP calls,
 * recording observations, metrics, and frontier updates
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::config::{AgentConfig, DEFAULT_CAPTCHA_PATH, MAX_ACTIONS_PER_DECISION};
use crate::errors::AgentError;
use crate::frontier;
use crate::http_client::{ProbeClient, ProbeResponse};
use crate::state::{
    new_observation_id, now_rfc3339, Action, CaptchaState, LastAction, Observation, PathStat,
    RunState, ToolKind,
};

/// Settled result of one probe invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOutcome {
    pub successes: u32,
    pub failures: u32,
}

/// Request payload resolved during the prepare phase.
#[derive(Debug, Clone)]
enum DispatchPayload {
    Get,
    PostJson(Value),
    PostRaw { body: String, content_type: String },
    Timing { control: Value, test: Value },
}

/// A dispatch that passed path selection and the budget gate, ready to issue.
#[derive(Debug, Clone)]
struct PlannedDispatch {
    tool: ToolKind,
    path: String,
    label: String,
    url: Url,
    payload: DispatchPayload,
}

/// Issued-request result carried back into the commit phase.
struct DispatchSuccess {
    observation: Observation,
    path: String,
    tool: ToolKind,
    captcha: Option<CaptchaState>,
}

// ---------------------------------------------------------------------------
// Prepare: path selection, budget gate, pre-issue bookkeeping (single-writer)
// ---------------------------------------------------------------------------

fn prepare_dispatch(
    state: &mut RunState,
    config: &AgentConfig,
    action: &Action,
) -> Result<PlannedDispatch, AgentError> {
    let tool = action.tool;

    // captcha_fetch has a canonical endpoint when the cortex names none.
    let desired = match tool {
        ToolKind::CaptchaFetch => Some(
            action
                .args
                .path
                .clone()
                .unwrap_or_else(|| DEFAULT_CAPTCHA_PATH.to_string()),
        ),
        _ => action.args.path.clone(),
    };

    let path = frontier::choose_path(state, tool, desired.as_deref(), config.max_hits_per_path)
        .ok_or_else(|| {
            AgentError::PathSelection(format!(
                "no usable path for {} (requested {:?})",
                tool,
                desired.as_deref()
            ))
        })?;

    // Budget gate. Claiming before issuing keeps the request counter within
    // one batch of the cap even when dispatches race.
    state
        .metrics
        .try_reserve(tool.request_cost(), config.max_requests)?;

    state.mark_visited(&path);
    state.record_hit(&path);

    let url = config.target_url_for(&path)?;
    let label = action
        .args
        .label
        .clone()
        .unwrap_or_else(|| tool.as_str().to_string());

    let payload = match tool {
        ToolKind::HttpGet | ToolKind::InspectHeaders | ToolKind::CaptchaFetch => {
            DispatchPayload::Get
        }
        ToolKind::HttpPost => {
            let body = action.args.body.clone().unwrap_or_else(|| json!({}));
            DispatchPayload::PostJson(merge_captcha(body, &path, state.captcha.as_ref()))
        }
        ToolKind::ProvokeError => DispatchPayload::PostRaw {
            // Transmitted as a literal; this string must never be parsed.
            body: "{ bad: }".to_string(),
            content_type: "application/json".to_string(),
        },
        ToolKind::MeasureTiming => DispatchPayload::Timing {
            control: action.args.control.clone().unwrap_or_else(|| json!({})),
            test: action.args.test.clone().unwrap_or_else(|| json!({})),
        },
    };

    Ok(PlannedDispatch {
        tool,
        path,
        label,
        url,
        payload,
    })
}

/// Feedback-style endpoints demand a solved CAPTCHA; inject the cached one.
fn merge_captcha(body: Value, path: &str, captcha: Option<&CaptchaState>) -> Value {
    let captcha = match captcha {
        Some(c) if path.to_lowercase().contains("feedbacks") => c,
        _ => return body,
    };
    match body {
        Value::Object(mut map) => {
            map.entry("captchaId".to_string())
                .or_insert_with(|| json!(captcha.captcha_id));
            map.entry("captcha".to_string())
                .or_insert_with(|| json!(captcha.answer));
            Value::Object(map)
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Issue: the HTTP call(s), run concurrently across a batch
// ---------------------------------------------------------------------------

async fn issue_dispatch(
    client: &ProbeClient,
    planned: PlannedDispatch,
) -> Result<DispatchSuccess, (AgentError, ToolKind, String)> {
    let PlannedDispatch {
        tool,
        path,
        label,
        url,
        payload,
    } = planned;

    let fail = |e: AgentError, path: &str| (e, tool, path.to_string());

    let (response, method, note) = match payload {
        DispatchPayload::Get => {
            let response = client.get(url).await.map_err(|e| fail(e, &path))?;
            let note = match tool {
                ToolKind::InspectHeaders => Some("header audit".to_string()),
                _ => None,
            };
            (response, "GET", note)
        }
        DispatchPayload::PostJson(body) => {
            let response = client
                .post_json(url, &body)
                .await
                .map_err(|e| fail(e, &path))?;
            (response, "POST", None)
        }
        DispatchPayload::PostRaw { body, content_type } => {
            let response = client
                .post_raw(url, body, &content_type)
                .await
                .map_err(|e| fail(e, &path))?;
            (response, "POST", Some("malformed json".to_string()))
        }
        DispatchPayload::Timing { control, test } => {
            // Control and test are issued back-to-back, never concurrently,
            // so the delta reflects the target rather than our own scheduling.
            let control_resp = client
                .post_json(url.clone(), &control)
                .await
                .map_err(|e| fail(e, &path))?;
            let test_resp = client
                .post_json(url, &test)
                .await
                .map_err(|e| fail(e, &path))?;
            let delta = test_resp.latency_ms as i64 - control_resp.latency_ms as i64;
            let note = format!(
                "timing control={}ms test={}ms delta={}ms",
                control_resp.latency_ms, test_resp.latency_ms, delta
            );
            (test_resp, "POST", Some(note))
        }
    };

    let captcha = if tool == ToolKind::CaptchaFetch {
        parse_captcha(&response)
    } else {
        None
    };

    let observation = Observation {
        id: new_observation_id(tool),
        tool,
        label,
        url: response.url.clone(),
        method: method.to_string(),
        status: response.status,
        headers: response.headers.clone(),
        body_snippet: response.body_snippet.clone(),
        latency_ms: response.latency_ms,
        timestamp: now_rfc3339(),
        note,
    };

    Ok(DispatchSuccess {
        observation,
        path,
        tool,
        captcha,
    })
}

fn json_field_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Pull `{captchaId|id, captcha, answer}` out of a captcha endpoint body.
fn parse_captcha(response: &ProbeResponse) -> Option<CaptchaState> {
    let parsed: Value = serde_json::from_str(response.body_snippet.trim()).ok()?;
    let captcha_id = parsed
        .get("captchaId")
        .or_else(|| parsed.get("id"))
        .and_then(json_field_string)?;
    let captcha = parsed.get("captcha").and_then(json_field_string)?;
    let answer = parsed.get("answer").and_then(json_field_string)?;
    Some(CaptchaState {
        captcha_id,
        captcha,
        answer,
        fetched_at: now_rfc3339(),
    })
}

// ---------------------------------------------------------------------------
// Commit: observation append, path stats, candidate discovery (single-writer)
// ---------------------------------------------------------------------------

fn commit_dispatch(state: &mut RunState, config: &AgentConfig, success: DispatchSuccess) {
    let DispatchSuccess {
        observation,
        path,
        tool,
        captcha,
    } = success;

    state.metrics.record_tool(tool, tool.request_cost());
    state.record_tool_usage(tool);

    let hits = state.hits_for(&path);
    let stat = state
        .path_stats
        .entry(path.clone())
        .or_insert_with(PathStat::default);
    stat.last_status = Some(observation.status);
    stat.last_tool = Some(tool);
    stat.last_observation_id = Some(observation.id.clone());
    stat.hits = hits;
    stat.last_at = Some(observation.timestamp.clone());

    if tool == ToolKind::HttpGet {
        if let (Ok(response_url), Ok(origin)) =
            (Url::parse(&observation.url), config.target_origin())
        {
            let discovered =
                frontier::extract_candidates(&observation.body_snippet, &response_url, &origin);
            let added = state.add_candidates(discovered);
            if added > 0 {
                debug!("Frontier grew by {} candidates from {}", added, path);
            }
        }
    }

    if let Some(c) = captcha {
        debug!("Cached captcha {} for later POSTs", c.captcha_id);
        state.captcha = Some(c);
    }

    state.last_action = Some(LastAction { tool, path });
    state.observations.push(observation);
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Dispatch a single action end to end. Returns `true` when a request was
/// issued and observed; `false` when the dispatch was skipped or failed
/// (the failure is recorded in `metrics.errors`, never raised).
pub async fn dispatch_tool(
    state: &mut RunState,
    client: &ProbeClient,
    config: &AgentConfig,
    action: &Action,
) -> bool {
    let planned = match prepare_dispatch(state, config, action) {
        Ok(p) => p,
        Err(e) => {
            warn!("Dispatch of {} skipped: {}", action.tool, e);
            state
                .metrics
                .record_error(&e, Some(action.tool), action.args.path.clone());
            return false;
        }
    };
    let path = planned.path.clone();
    match issue_dispatch(client, planned).await {
        Ok(success) => {
            commit_dispatch(state, config, success);
            true
        }
        Err((e, tool, path_issued)) => {
            warn!("Dispatch of {} to {} failed: {}", tool, path_issued, e);
            state.metrics.record_error(&e, Some(tool), Some(path));
            false
        }
    }
}

/// Execute one staged batch: prepare sequentially, issue concurrently, wait
/// for all to settle, commit in settle order, then update hop counters.
pub async fn execute_batch(
    state: &mut RunState,
    client: &ProbeClient,
    config: &AgentConfig,
    actions: &[Action],
) -> BatchOutcome {
    let batch: Vec<&Action> = actions.iter().take(MAX_ACTIONS_PER_DECISION).collect();
    if actions.len() > batch.len() {
        warn!(
            "Batch truncated from {} to {} actions",
            actions.len(),
            batch.len()
        );
    }

    let mut outcome = BatchOutcome::default();
    let mut planned = Vec::new();

    for action in &batch {
        match prepare_dispatch(state, config, action) {
            Ok(p) => planned.push(p),
            Err(e) => {
                warn!("Dispatch of {} skipped: {}", action.tool, e);
                state
                    .metrics
                    .record_error(&e, Some(action.tool), action.args.path.clone());
                outcome.failures += 1;
            }
        }
    }

    let issued = join_all(
        planned
            .into_iter()
            .map(|p| async move { issue_dispatch(client, p).await }),
    )
    .await;

    for result in issued {
        match result {
            Ok(success) => {
                commit_dispatch(state, config, success);
                outcome.successes += 1;
            }
            Err((e, tool, path)) => {
                warn!("Dispatch of {} to {} failed: {}", tool, path, e);
                state.metrics.record_error(&e, Some(tool), Some(path));
                outcome.failures += 1;
            }
        }
    }

    if outcome.successes > 0 {
        state.consecutive_skips = 0;
    } else {
        state.skipped_hops += 1;
        state.consecutive_skips += 1;
    }
    state.hops += 1;
    state.batch_stats.total_batches += 1;
    state.batch_stats.total_actions += batch.len() as u32;

    outcome
}
