// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Run State
 * Shared state for one reconnaissance run: observations, reasoning log,
 * path bookkeeping, candidate frontier, and race-guarded request metrics
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::AgentError;

/// UTC timestamp with millisecond precision, as stored in every trace entry.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds since the UNIX epoch.
pub fn epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// The observational tool allowlist. Nothing outside this enum is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    HttpGet,
    HttpPost,
    InspectHeaders,
    ProvokeError,
    MeasureTiming,
    CaptchaFetch,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::HttpGet,
        ToolKind::HttpPost,
        ToolKind::InspectHeaders,
        ToolKind::ProvokeError,
        ToolKind::MeasureTiming,
        ToolKind::CaptchaFetch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::HttpGet => "http_get",
            ToolKind::HttpPost => "http_post",
            ToolKind::InspectHeaders => "inspect_headers",
            ToolKind::ProvokeError => "provoke_error",
            ToolKind::MeasureTiming => "measure_timing",
            ToolKind::CaptchaFetch => "captcha_fetch",
        }
    }

    /// Requests a single dispatch of this tool will issue.
    pub fn request_cost(&self) -> u32 {
        match self {
            ToolKind::MeasureTiming => 2,
            _ => 1,
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http_get" => Ok(ToolKind::HttpGet),
            "http_post" => Ok(ToolKind::HttpPost),
            "inspect_headers" => Ok(ToolKind::InspectHeaders),
            "provoke_error" => Ok(ToolKind::ProvokeError),
            "measure_timing" => Ok(ToolKind::MeasureTiming),
            "captcha_fetch" => Ok(ToolKind::CaptchaFetch),
            other => Err(AgentError::UnknownTool(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Tool arguments as produced by the cortex. Everything is optional; the
/// probe executor and frontier fill in what the cortex left out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// JSON body for `http_post`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Control body for `measure_timing`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<Value>,

    /// Test body for `measure_timing`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<Value>,
}

/// One staged tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub tool: ToolKind,

    #[serde(default)]
    pub args: ActionArgs,

    #[serde(default)]
    pub rationale: String,
}

impl Action {
    pub fn get(path: &str, rationale: &str) -> Self {
        Self {
            tool: ToolKind::HttpGet,
            args: ActionArgs {
                path: Some(path.to_string()),
                ..ActionArgs::default()
            },
            rationale: rationale.to_string(),
        }
    }

    pub fn forced(tool: ToolKind, path: &str, rationale: &str) -> Self {
        Self {
            tool,
            args: ActionArgs {
                path: Some(path.to_string()),
                ..ActionArgs::default()
            },
            rationale: rationale.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Trace entries
// ---------------------------------------------------------------------------

/// Durable record of one HTTP exchange. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: String,
    pub tool: ToolKind,
    pub label: String,
    pub url: String,
    pub method: String,
    pub status: u16,
    /// Lowercased header names.
    pub headers: HashMap<String, String>,
    pub body_snippet: String,
    pub latency_ms: u64,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Fresh observation id: `<tool>-<epoch>-<rand>`.
pub fn new_observation_id(tool: ToolKind) -> String {
    let suffix: u16 = rand::thread_rng().gen();
    format!("{}-{}-{:04x}", tool.as_str(), epoch_ms(), suffix)
}

/// One hypothesis from the cortex. Field names match the trace schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningEntry {
    pub thought: String,
    pub hypothesis: String,
    pub owasp_category: String,
    pub confidence_0_1: f64,
    pub observation_ref: Option<String>,
    pub timestamp: String,
}

/// Per-action summary inside a decision entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionAction {
    pub tool: ToolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// One entry per cortex call: what it decided and what it staged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionEntry {
    pub decision: Decision,
    pub actions: Vec<DecisionAction>,
    pub at: String,
}

/// Per-path statistics maintained by the probe executor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tool: Option<ToolKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_observation_id: Option<String>,
    pub hits: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_at: Option<String>,
}

/// One recorded non-fatal failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
    pub at: String,
}

/// CAPTCHA solution cached from `captcha_fetch`, merged into later POSTs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptchaState {
    pub captcha_id: String,
    pub captcha: String,
    pub answer: String,
    pub fetched_at: String,
}

/// Anti-repeat marker for path selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastAction {
    pub tool: ToolKind,
    pub path: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub total_batches: u32,
    pub total_actions: u32,
}

/// Metadata about the cortex's LLM usage for the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmMeta {
    pub attempts: u32,
    pub used_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Current routing flag: keep probing or hand off to the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Probe,
    Report,
}

/// Why the run terminated. Set exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxHops,
    BudgetExhausted,
    NoValidPaths,
    DecisionReport,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::MaxHops => "max_hops",
            StopReason::BudgetExhausted => "budget_exhausted",
            StopReason::NoValidPaths => "no_valid_paths",
            StopReason::DecisionReport => "decision_report",
        }
    }
}

// ---------------------------------------------------------------------------
// Race-guarded metrics
// ---------------------------------------------------------------------------

/// Request counters shared with concurrent dispatches within a batch.
/// `requests` and `per_tool` race inside a batch, so they live behind an
/// atomic and a mutex respectively; everything else in `RunState` is
/// single-writer between hops.
#[derive(Debug, Default)]
pub struct RunMetrics {
    requests: AtomicU32,
    per_tool: Mutex<HashMap<String, u32>>,
    errors: Mutex<Vec<ErrorEntry>>,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `cost` request slots against `max`. The gate checks
    /// the counter before issuing, so a batch may overshoot by at most one
    /// multi-request dispatch.
    pub fn try_reserve(&self, cost: u32, max: u32) -> Result<(), AgentError> {
        let claimed = self
            .requests
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current >= max {
                    None
                } else {
                    Some(current + cost)
                }
            });
        match claimed {
            Ok(_) => Ok(()),
            Err(current) => Err(AgentError::BudgetExceeded { used: current, max }),
        }
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }

    /// One increment per observation (two for `measure_timing`).
    pub fn record_tool(&self, tool: ToolKind, count: u32) {
        let mut per_tool = self.per_tool.lock().expect("per_tool mutex poisoned");
        *per_tool.entry(tool.as_str().to_string()).or_insert(0) += count;
    }

    pub fn record_error(&self, error: &AgentError, tool: Option<ToolKind>, path: Option<String>) {
        let entry = ErrorEntry {
            kind: error.kind().to_string(),
            tool,
            path,
            message: error.to_string(),
            at: now_rfc3339(),
        };
        self.errors.lock().expect("errors mutex poisoned").push(entry);
    }

    pub fn per_tool_snapshot(&self) -> HashMap<String, u32> {
        self.per_tool.lock().expect("per_tool mutex poisoned").clone()
    }

    pub fn errors_snapshot(&self) -> Vec<ErrorEntry> {
        self.errors.lock().expect("errors mutex poisoned").clone()
    }

    pub fn last_errors(&self, n: usize) -> Vec<ErrorEntry> {
        let errors = self.errors.lock().expect("errors mutex poisoned");
        let start = errors.len().saturating_sub(n);
        errors[start..].to_vec()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().expect("errors mutex poisoned").len()
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// All mutable state for one run. Single-writer: the engine owns it and
/// mutates it between hops; only `metrics` is shared into a batch.
#[derive(Debug)]
pub struct RunState {
    pub run_id: String,
    pub observations: Vec<Observation>,
    pub reasoning_log: Vec<ReasoningEntry>,
    pub decisions: Vec<DecisionEntry>,
    visited: Vec<String>,
    visited_set: HashSet<String>,
    pub path_hits: HashMap<String, u32>,
    pub path_stats: HashMap<String, PathStat>,
    pub candidates: VecDeque<String>,
    pub metrics: Arc<RunMetrics>,
    pub tool_usage: HashMap<String, u32>,
    pub hops: u32,
    pub skipped_hops: u32,
    pub consecutive_skips: u32,
    pub batch_stats: BatchStats,
    pub decision: Decision,
    pub stop_reason: Option<StopReason>,
    pub captcha: Option<CaptchaState>,
    pub last_action: Option<LastAction>,
    pub next_actions: Vec<Action>,
    pub llm_meta: LlmMeta,
}

impl RunState {
    pub fn new() -> Self {
        let suffix: u16 = rand::thread_rng().gen();
        let run_id = format!("{}-{:04x}", Utc::now().format("%Y%m%dT%H%M%S"), suffix);
        Self::with_run_id(run_id)
    }

    pub fn with_run_id(run_id: String) -> Self {
        Self {
            run_id,
            observations: Vec::new(),
            reasoning_log: Vec::new(),
            decisions: Vec::new(),
            visited: Vec::new(),
            visited_set: HashSet::new(),
            path_hits: HashMap::new(),
            path_stats: HashMap::new(),
            candidates: VecDeque::new(),
            metrics: Arc::new(RunMetrics::new()),
            tool_usage: HashMap::new(),
            hops: 0,
            skipped_hops: 0,
            consecutive_skips: 0,
            batch_stats: BatchStats::default(),
            decision: Decision::Probe,
            stop_reason: None,
            captcha: None,
            last_action: None,
            next_actions: Vec::new(),
            llm_meta: LlmMeta::default(),
        }
    }

    /// Insertion-ordered set of paths touched at least once.
    pub fn visited_paths(&self) -> &[String] {
        &self.visited
    }

    pub fn is_visited(&self, path: &str) -> bool {
        self.visited_set.contains(path)
    }

    pub fn mark_visited(&mut self, path: &str) {
        if self.visited_set.insert(path.to_string()) {
            self.visited.push(path.to_string());
        }
    }

    pub fn hits_for(&self, path: &str) -> u32 {
        self.path_hits.get(path).copied().unwrap_or(0)
    }

    pub fn record_hit(&mut self, path: &str) {
        *self.path_hits.entry(path.to_string()).or_insert(0) += 1;
    }

    /// Enqueue discovered paths, dropping anything already queued or visited.
    pub fn add_candidates<I: IntoIterator<Item = String>>(&mut self, paths: I) -> usize {
        let mut added = 0;
        for path in paths {
            if self.visited_set.contains(&path) {
                continue;
            }
            if self.candidates.iter().any(|c| c == &path) {
                continue;
            }
            self.candidates.push_back(path);
            added += 1;
        }
        added
    }

    pub fn record_tool_usage(&mut self, tool: ToolKind) {
        *self
            .tool_usage
            .entry(tool.as_str().to_string())
            .or_insert(0) += 1;
    }

    pub fn tool_usage_for(&self, tool: ToolKind) -> u32 {
        self.tool_usage.get(tool.as_str()).copied().unwrap_or(0)
    }

    pub fn has_observation(&self, id: &str) -> bool {
        self.observations.iter().any(|o| o.id == id)
    }

    /// Set the stop reason exactly once; later calls are ignored.
    pub fn set_stop_reason(&mut self, reason: StopReason) {
        if self.stop_reason.is_none() {
            self.stop_reason = Some(reason);
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
