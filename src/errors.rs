// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Error Types
 * Error taxonomy for the probing engine
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use thiserror::Error;

/// Engine error type covering every failure class the run loop can see.
///
/// Transient errors are recorded in `metrics.errors` and never terminate the
/// loop; termination happens exclusively through router stop conditions.
/// Only reporter I/O and configuration failures are fatal.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Transport-level failure: timeout, DNS, connection refused.
    /// No observation is recorded for these.
    #[error("Transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The budget gate refused to reserve request slots.
    #[error("Request budget exhausted: {used}/{max}")]
    BudgetExceeded { used: u32, max: u32 },

    /// The LLM produced output that failed JSON parsing or schema validation.
    #[error("Schema validation failed: {0}")]
    Schema(String),

    /// The LLM provider call itself failed (HTTP error, malformed envelope).
    #[error("LLM provider error: {0}")]
    Provider(String),

    /// An action named a tool outside the allowlist.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The path frontier could not produce a usable path for this action.
    #[error("No valid path: {0}")]
    PathSelection(String),

    /// Trace write failure. Fatal.
    #[error("Report I/O error: {0}")]
    Report(#[from] std::io::Error),

    /// Invalid configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AgentError {
    /// Transient errors are absorbed by the loop; fatal ones propagate.
    pub fn is_transient(&self) -> bool {
        !matches!(self, AgentError::Report(_) | AgentError::Configuration(_))
    }

    /// Short machine-readable class name, used in `metrics.errors` entries.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Transport { .. } => "transport",
            AgentError::BudgetExceeded { .. } => "budget_exceeded",
            AgentError::Schema(_) => "schema",
            AgentError::Provider(_) => "provider",
            AgentError::UnknownTool(_) => "unknown_tool",
            AgentError::PathSelection(_) => "path_selection",
            AgentError::Report(_) => "report_io",
            AgentError::Configuration(_) => "configuration",
        }
    }
}

/// Result type for engine operations.
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(AgentError::BudgetExceeded { used: 80, max: 80 }.is_transient());
        assert!(AgentError::Schema("bad json".into()).is_transient());
        assert!(AgentError::UnknownTool("nmap".into()).is_transient());
        assert!(!AgentError::Configuration("no target".into()).is_transient());
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert!(!AgentError::Report(io).is_transient());
    }

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(
            AgentError::BudgetExceeded { used: 3, max: 3 }.kind(),
            "budget_exceeded"
        );
        assert_eq!(AgentError::Provider("503".into()).kind(), "provider");
        assert_eq!(AgentError::UnknownTool("x".into()).kind(), "unknown_tool");
    }
}
