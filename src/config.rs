// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Agent Configuration
 * Environment-derived run configuration with validated budgets
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;
use url::Url;
use validator::Validate;

use crate::errors::AgentError;
use crate::state::ToolKind;

/// Tool rotation cadence for diversity enforcement (in hops).
pub const DIVERSITY_INTERVAL: u32 = 5;

/// Tools the diversity policy guarantees coverage for.
pub const REQUIRED_DIVERSITY_TOOLS: [ToolKind; 2] =
    [ToolKind::InspectHeaders, ToolKind::ProvokeError];

/// Upper bound on actions the cortex may stage per decision.
pub const MAX_ACTIONS_PER_DECISION: usize = 5;

/// Default CAPTCHA endpoint for `captcha_fetch`.
pub const DEFAULT_CAPTCHA_PATH: &str = "/rest/captcha";

fn default_target_url() -> String {
    "http://target:3000".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_requests() -> u32 {
    80
}

fn default_max_hops() -> u32 {
    40
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_hits_per_path() -> u32 {
    2
}

fn default_body_snippet_bytes() -> usize {
    2000
}

fn default_wait_interval_ms() -> u64 {
    1000
}

fn default_trace_dir() -> PathBuf {
    PathBuf::from("traces")
}

/// Run configuration. Loaded from the environment; every numeric budget is
/// range-validated before a run starts.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AgentConfig {
    /// Allowlisted origin. Every request must resolve within this origin.
    #[serde(default = "default_target_url")]
    pub target_url: String,

    /// LLM credential. When unset the cortex runs its deterministic stub.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Chat-completions base URL. Overridable so tests can point the cortex
    /// at a mock oracle.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// HTTP request budget for the whole run.
    #[validate(range(min = 1, max = 10000))]
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Reasoning-loop cap.
    #[validate(range(min = 1, max = 1000))]
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,

    /// Per-request timeout in milliseconds.
    #[validate(range(min = 100, max = 600_000))]
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Per-path request cap.
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_max_hits_per_path")]
    pub max_hits_per_path: u32,

    /// Response body truncation length for observations.
    #[validate(range(min = 64, max = 1_048_576))]
    #[serde(default = "default_body_snippet_bytes")]
    pub body_snippet_bytes: usize,

    /// Readiness-wait window before the first hop. 0 disables the wait.
    #[serde(default)]
    pub wait_for_target_ms: u64,

    /// Poll interval within the readiness window.
    #[serde(default = "default_wait_interval_ms")]
    pub wait_interval_ms: u64,

    /// Output directory for trace artifacts.
    #[serde(default = "default_trace_dir")]
    pub trace_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            target_url: default_target_url(),
            api_key: None,
            api_base: default_api_base(),
            model: default_model(),
            max_requests: default_max_requests(),
            max_hops: default_max_hops(),
            request_timeout_ms: default_timeout_ms(),
            max_hits_per_path: default_max_hits_per_path(),
            body_snippet_bytes: default_body_snippet_bytes(),
            wait_for_target_ms: 0,
            wait_interval_ms: default_wait_interval_ms(),
            trace_dir: default_trace_dir(),
        }
    }
}

/// Read a numeric env var, falling back to the default on parse failure.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!("Ignoring unparseable {}={:?}, using default", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

impl AgentConfig {
    /// Build the configuration from the process environment and validate it.
    pub fn from_env() -> Result<Self, AgentError> {
        let config = Self {
            target_url: std::env::var("TARGET_URL").unwrap_or_else(|_| default_target_url()),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            api_base: std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| default_api_base()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| default_model()),
            max_requests: env_parse("MAX_REQ_PER_RUN", default_max_requests()),
            max_hops: env_parse("MAX_HOPS", default_max_hops()),
            request_timeout_ms: env_parse("REQ_TIMEOUT_MS", default_timeout_ms()),
            max_hits_per_path: env_parse("MAX_HITS_PER_PATH", default_max_hits_per_path()),
            body_snippet_bytes: env_parse("BODY_SNIPPET_BYTES", default_body_snippet_bytes()),
            wait_for_target_ms: env_parse("WAIT_FOR_TARGET_MS", 0),
            wait_interval_ms: env_parse("WAIT_FOR_TARGET_INTERVAL_MS", default_wait_interval_ms()),
            trace_dir: std::env::var("TRACE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_trace_dir()),
        };
        config.ensure_valid()?;
        Ok(config)
    }

    /// Validate ranges and the target origin.
    pub fn ensure_valid(&self) -> Result<(), AgentError> {
        self.validate()
            .map_err(|e| AgentError::Configuration(format!("invalid configuration: {}", e)))?;
        let url = self.parsed_target()?;
        if url.host_str().is_none() {
            return Err(AgentError::Configuration(format!(
                "TARGET_URL has no host: {}",
                self.target_url
            )));
        }
        Ok(())
    }

    /// The target as a parsed URL.
    pub fn parsed_target(&self) -> Result<Url, AgentError> {
        Url::parse(&self.target_url)
            .map_err(|e| AgentError::Configuration(format!("invalid TARGET_URL: {}", e)))
    }

    /// Origin string (`scheme://host[:port]`) used for same-origin checks.
    pub fn target_origin(&self) -> Result<String, AgentError> {
        let url = self.parsed_target()?;
        Ok(url.origin().ascii_serialization())
    }

    /// Build a full request URL for a target-relative path.
    pub fn target_url_for(&self, path: &str) -> Result<Url, AgentError> {
        let base = self.parsed_target()?;
        base.join(path)
            .map_err(|e| AgentError::Configuration(format!("cannot join path {:?}: {}", path, e)))
    }

    pub fn has_llm_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AgentConfig::default();
        assert_eq!(config.target_url, "http://target:3000");
        assert_eq!(config.max_requests, 80);
        assert_eq!(config.max_hops, 40);
        assert_eq!(config.request_timeout_ms, 5000);
        assert_eq!(config.max_hits_per_path, 2);
        assert_eq!(config.body_snippet_bytes, 2000);
        assert_eq!(config.wait_for_target_ms, 0);
        assert_eq!(config.wait_interval_ms, 1000);
        assert!(config.ensure_valid().is_ok());
    }

    #[test]
    fn rejects_out_of_range_budget() {
        let config = AgentConfig {
            max_requests: 0,
            ..AgentConfig::default()
        };
        assert!(config.ensure_valid().is_err());
    }

    #[test]
    fn rejects_hostless_target() {
        let config = AgentConfig {
            target_url: "not-a-url".into(),
            ..AgentConfig::default()
        };
        assert!(config.ensure_valid().is_err());
    }

    #[test]
    fn origin_strips_path_and_query() {
        let config = AgentConfig {
            target_url: "http://target:3000/base?x=1".into(),
            ..AgentConfig::default()
        };
        assert_eq!(config.target_origin().unwrap(), "http://target:3000");
    }

    #[test]
    fn joins_paths_against_target() {
        let config = AgentConfig::default();
        let url = config.target_url_for("/rest/captcha").unwrap();
        assert_eq!(url.as_str(), "http://target:3000/rest/captcha");
    }
}
