// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Router
 * Ordered stop-condition evaluation between hops
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use tracing::info;

use crate::config::AgentConfig;
use crate::state::{Decision, RunState, StopReason};

/// Consecutive fully-skipped hops tolerated before giving up on the frontier.
const MAX_CONSECUTIVE_SKIPS: u32 = 3;

/// Next node to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteLabel {
    Probe,
    Report,
}

/// Evaluate stop conditions in their fixed precedence order and return the
/// first match. When two conditions hold at once, the earlier one names the
/// stop reason. Also stamps `stop_reason`, which is write-once.
pub fn route(state: &mut RunState, config: &AgentConfig) -> RouteLabel {
    let reason = if state.hops >= config.max_hops {
        Some(StopReason::MaxHops)
    } else if state.metrics.requests() >= config.max_requests {
        Some(StopReason::BudgetExhausted)
    } else if state.consecutive_skips >= MAX_CONSECUTIVE_SKIPS {
        Some(StopReason::NoValidPaths)
    } else if state.decision == Decision::Report {
        Some(StopReason::DecisionReport)
    } else {
        None
    };

    match reason {
        Some(reason) => {
            info!(
                "Routing to report: {} (hops={}, requests={})",
                reason.as_str(),
                state.hops,
                state.metrics.requests()
            );
            state.set_stop_reason(reason);
            RouteLabel::Report
        }
        None => RouteLabel::Probe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig {
            max_requests: 10,
            max_hops: 5,
            ..AgentConfig::default()
        }
    }

    #[test]
    fn routes_to_probe_while_nothing_stops() {
        let mut state = RunState::new();
        state.decision = Decision::Probe;
        assert_eq!(route(&mut state, &config()), RouteLabel::Probe);
        assert_eq!(state.stop_reason, None);
    }

    #[test]
    fn max_hops_wins() {
        let mut state = RunState::new();
        state.hops = 5;
        assert_eq!(route(&mut state, &config()), RouteLabel::Report);
        assert_eq!(state.stop_reason, Some(StopReason::MaxHops));
    }

    #[test]
    fn budget_stop_fires_at_the_cap() {
        let mut state = RunState::new();
        state.metrics.try_reserve(10, 10).unwrap();
        state.hops = 1;
        assert_eq!(route(&mut state, &config()), RouteLabel::Report);
        assert_eq!(state.stop_reason, Some(StopReason::BudgetExhausted));
    }

    #[test]
    fn skips_stop_after_three() {
        let mut state = RunState::new();
        state.hops = 1;
        state.consecutive_skips = 3;
        assert_eq!(route(&mut state, &config()), RouteLabel::Report);
        assert_eq!(state.stop_reason, Some(StopReason::NoValidPaths));
    }

    #[test]
    fn cortex_report_decision_routes_to_report() {
        let mut state = RunState::new();
        state.hops = 1;
        state.decision = Decision::Report;
        assert_eq!(route(&mut state, &config()), RouteLabel::Report);
        assert_eq!(state.stop_reason, Some(StopReason::DecisionReport));
    }

    #[test]
    fn earliest_condition_in_order_names_the_reason() {
        // Both max_hops and decision=report hold; max_hops is evaluated first.
        let mut state = RunState::new();
        state.hops = 5;
        state.decision = Decision::Report;
        route(&mut state, &config());
        assert_eq!(state.stop_reason, Some(StopReason::MaxHops));
    }
}
