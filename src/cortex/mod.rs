// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Cortex
 * Schema-constrained LLM reasoning node with retry and deterministic
 * fallback
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

pub mod context;
pub mod prompt;
pub mod provider;
pub mod schema;

use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::findings::OWASP_A05;
use crate::http_client::ProbeClient;
use crate::state::{
    now_rfc3339, Decision, DecisionAction, DecisionEntry, LlmMeta, ReasoningEntry, RunState,
};

pub use provider::{create_provider, LlmProvider, OpenAiProvider};
pub use schema::ParsedDecision;

/// Total attempts per hop before the deterministic fallback takes over.
const MAX_LLM_ATTEMPTS: u32 = 2;

fn push_decision(state: &mut RunState, decision: Decision) {
    let actions = state
        .next_actions
        .iter()
        .map(|a| DecisionAction {
            tool: a.tool,
            path: a.args.path.clone(),
        })
        .collect();
    state.decisions.push(DecisionEntry {
        decision,
        actions,
        at: now_rfc3339(),
    });
}

/// Deterministic entry used when no credential is configured.
fn stub_entry() -> ReasoningEntry {
    ReasoningEntry {
        thought: "No LLM credential configured; recording baseline recon and reporting.".into(),
        hypothesis: "Findings are limited to deterministic signals from the initial probe.".into(),
        owasp_category: OWASP_A05.into(),
        confidence_0_1: 0.2,
        observation_ref: None,
        timestamp: now_rfc3339(),
    }
}

/// Deterministic entry used when every reasoning attempt failed.
fn fallback_entry(attempts: u32) -> ReasoningEntry {
    ReasoningEntry {
        thought: format!(
            "Reasoning output failed validation after {} attempts; terminating the loop.",
            attempts
        ),
        hypothesis: "Remaining analysis relies on deterministic extraction over collected observations.".into(),
        owasp_category: OWASP_A05.into(),
        confidence_0_1: 0.2,
        observation_ref: None,
        timestamp: now_rfc3339(),
    }
}

/// Run one reasoning step: call the LLM (or its stub), validate the reply,
/// and stage the next action batch. Exactly one `ReasoningEntry` and one
/// `DecisionEntry` are appended per call, whatever happens.
pub async fn reason(
    state: &mut RunState,
    provider: Option<&dyn LlmProvider>,
    client: &ProbeClient,
    config: &AgentConfig,
) -> Decision {
    state.next_actions.clear();

    let provider = match provider {
        Some(p) => p,
        None => {
            info!("Cortex running without credential; using deterministic stub");
            state.reasoning_log.push(stub_entry());
            state.llm_meta = LlmMeta {
                attempts: 0,
                used_fallback: true,
                model: None,
                error: None,
            };
            state.decision = Decision::Report;
            push_decision(state, Decision::Report);
            return Decision::Report;
        }
    };

    let context = context::build_context(state, client, config);
    let system = prompt::build_system_prompt(&config.target_url);
    let user = prompt::build_user_prompt(&context);

    let mut last_error: Option<String> = None;

    for attempt in 1..=MAX_LLM_ATTEMPTS {
        let raw = match provider.complete(&system, &user).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cortex attempt {}/{} failed: {}", attempt, MAX_LLM_ATTEMPTS, e);
                state.metrics.record_error(&e, None, None);
                last_error = Some(e.to_string());
                continue;
            }
        };

        match schema::parse_decision(&raw, state) {
            Ok(parsed) => {
                state.reasoning_log.push(ReasoningEntry {
                    thought: parsed.thought,
                    hypothesis: parsed.hypothesis,
                    owasp_category: parsed.owasp_category,
                    confidence_0_1: parsed.confidence,
                    observation_ref: parsed.observation_ref,
                    timestamp: now_rfc3339(),
                });
                state.llm_meta = LlmMeta {
                    attempts: attempt,
                    used_fallback: false,
                    model: Some(provider.model().to_string()),
                    error: None,
                };
                state.next_actions = parsed.actions;
                state.decision = parsed.decision;
                push_decision(state, parsed.decision);
                return parsed.decision;
            }
            Err(e) => {
                warn!(
                    "Cortex reply failed validation on attempt {}/{}: {}",
                    attempt, MAX_LLM_ATTEMPTS, e
                );
                state.metrics.record_error(&e, None, None);
                last_error = Some(e.to_string());
            }
        }
    }

    info!("Cortex falling back after {} failed attempts", MAX_LLM_ATTEMPTS);
    state.reasoning_log.push(fallback_entry(MAX_LLM_ATTEMPTS));
    state.llm_meta = LlmMeta {
        attempts: MAX_LLM_ATTEMPTS,
        used_fallback: true,
        model: Some(provider.model().to_string()),
        error: last_error,
    };
    state.decision = Decision::Report;
    push_decision(state, Decision::Report);
    Decision::Report
}
