// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Schema validation for cortex output.
//!
//! The LLM's reply is untrusted text. This module is the only place that
//! turns it into typed engine input: fences stripped, JSON parsed, every
//! field checked, legacy shapes normalized. Anything that fails here is an
//! `AgentError::Schema` and triggers the retry/fallback policy.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::config::MAX_ACTIONS_PER_DECISION;
use crate::errors::AgentError;
use crate::state::{Action, ActionArgs, Decision, RunState, ToolKind};

/// Validated, normalized cortex output.
#[derive(Debug, Clone)]
pub struct ParsedDecision {
    pub decision: Decision,
    pub actions: Vec<Action>,
    pub thought: String,
    pub hypothesis: String,
    pub owasp_category: String,
    pub confidence: f64,
    pub observation_ref: Option<String>,
}

/// Wire shape. Unknown fields are accepted and ignored; the engine has no
/// forward-compat reason to reject them.
#[derive(Debug, Deserialize)]
struct RawDecision {
    decision: Option<String>,
    #[serde(default)]
    next_actions: Option<Vec<Value>>,
    /// Legacy single-tool shape, synthesized into a one-action batch.
    #[serde(default)]
    next_tool: Option<Value>,
    thought: Option<String>,
    hypothesis: Option<String>,
    owasp_category: Option<Value>,
    confidence_0_1: Option<f64>,
    #[serde(default)]
    observation_ref: Option<String>,
}

/// Remove surrounding markdown code fences, if present.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the opening fence line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

fn parse_action(value: &Value) -> Result<Action, AgentError> {
    let tool_name = value["tool"]
        .as_str()
        .ok_or_else(|| AgentError::Schema("action missing tool".to_string()))?;
    let tool: ToolKind = tool_name.parse()?;

    let args: ActionArgs = match value.get("args") {
        Some(v) if !v.is_null() => serde_json::from_value(v.clone())
            .map_err(|e| AgentError::Schema(format!("invalid action args: {}", e)))?,
        _ => ActionArgs::default(),
    };

    let rationale = value["rationale"].as_str().unwrap_or_default().to_string();

    Ok(Action {
        tool,
        args,
        rationale,
    })
}

/// Legacy `next_tool` can be a bare tool name or `{tool, args}`.
fn parse_legacy_tool(value: &Value) -> Result<Action, AgentError> {
    match value {
        Value::String(name) => {
            let tool: ToolKind = name.as_str().parse()?;
            Ok(Action {
                tool,
                args: ActionArgs::default(),
                rationale: String::new(),
            })
        }
        Value::Object(_) => parse_action(value),
        other => Err(AgentError::Schema(format!(
            "next_tool must be a string or object, got {}",
            other
        ))),
    }
}

/// Parse and validate one raw LLM reply against the decision schema.
pub fn parse_decision(raw: &str, state: &RunState) -> Result<ParsedDecision, AgentError> {
    let stripped = strip_code_fences(raw);
    let parsed: RawDecision = serde_json::from_str(stripped)
        .map_err(|e| AgentError::Schema(format!("invalid JSON: {}", e)))?;

    let decision = match parsed.decision.as_deref() {
        Some("probe") | Some("continue") => Decision::Probe,
        Some("report") => Decision::Report,
        Some(other) => {
            return Err(AgentError::Schema(format!("unknown decision {:?}", other)))
        }
        None => return Err(AgentError::Schema("missing decision".to_string())),
    };

    let mut actions = Vec::new();
    if let Some(raw_actions) = &parsed.next_actions {
        if raw_actions.len() > MAX_ACTIONS_PER_DECISION {
            return Err(AgentError::Schema(format!(
                "next_actions has {} entries, max is {}",
                raw_actions.len(),
                MAX_ACTIONS_PER_DECISION
            )));
        }
        for value in raw_actions {
            actions.push(parse_action(value)?);
        }
    }
    if actions.is_empty() {
        if let Some(legacy) = &parsed.next_tool {
            actions.push(parse_legacy_tool(legacy)?);
        }
    }
    if decision == Decision::Probe && actions.is_empty() {
        return Err(AgentError::Schema(
            "probe decision carries no actions".to_string(),
        ));
    }

    let thought = parsed
        .thought
        .ok_or_else(|| AgentError::Schema("missing thought".to_string()))?;
    let hypothesis = parsed
        .hypothesis
        .ok_or_else(|| AgentError::Schema("missing hypothesis".to_string()))?;

    let owasp_category = match parsed.owasp_category {
        Some(Value::String(s)) => s,
        Some(Value::Array(items)) => items
            .first()
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| AgentError::Schema("owasp_category array is empty".to_string()))?,
        Some(other) => {
            return Err(AgentError::Schema(format!(
                "owasp_category must be string or array, got {}",
                other
            )))
        }
        None => return Err(AgentError::Schema("missing owasp_category".to_string())),
    };

    let confidence = parsed
        .confidence_0_1
        .ok_or_else(|| AgentError::Schema("missing confidence_0_1".to_string()))?;
    if !(0.0..=1.0).contains(&confidence) || !confidence.is_finite() {
        return Err(AgentError::Schema(format!(
            "confidence_0_1 out of range: {}",
            confidence
        )));
    }

    // An observation_ref must name evidence the engine actually holds.
    // A dangling reference is nulled rather than failing the whole reply.
    let observation_ref = match parsed.observation_ref {
        Some(id) if state.has_observation(&id) => Some(id),
        Some(id) => {
            warn!("Dropping dangling observation_ref {:?}", id);
            None
        }
        None => None,
    };

    Ok(ParsedDecision {
        decision,
        actions,
        thought,
        hypothesis,
        owasp_category,
        confidence,
        observation_ref,
    })
}
