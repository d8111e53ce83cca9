// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Path Frontier
 * Path classification, candidate discovery, priority scoring, and
 * selection policy for the probe executor
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::{DIVERSITY_INTERVAL, REQUIRED_DIVERSITY_TOOLS};
use crate::state::{RunState, ToolKind};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

const STATIC_EXTENSIONS: [&str; 14] = [
    ".css", ".js", ".ico", ".png", ".jpg", ".jpeg", ".svg", ".gif", ".webp", ".woff", ".woff2",
    ".ttf", ".map", ".eot",
];

const AUTH_MARKERS: [&str; 11] = [
    "login", "auth", "admin", "signin", "account", "user", "profile", "register", "password",
    "token", "session",
];

const SENSITIVE_MARKERS: [&str; 9] = [
    "swagger", "openapi", "config", "debug", "backup", "ftp", ".git", ".env", "docs",
];

static API_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(api|rest|v\d+|graphql)").expect("api prefix regex"));

/// Lowercase a path and drop its query string for classification.
fn normalize_for_class(path: &str) -> String {
    let stripped = path.split('?').next().unwrap_or(path);
    stripped.to_lowercase()
}

/// Static assets: scripts, styles, images, fonts, source maps.
pub fn is_static_path(path: &str) -> bool {
    let p = normalize_for_class(path);
    STATIC_EXTENSIONS.iter().any(|ext| p.ends_with(ext))
}

pub fn is_api_path(path: &str) -> bool {
    API_PREFIX_RE.is_match(&normalize_for_class(path))
}

pub fn is_auth_path(path: &str) -> bool {
    let p = normalize_for_class(path);
    AUTH_MARKERS.iter().any(|m| p.contains(m))
}

pub fn is_sensitive_path(path: &str) -> bool {
    let p = normalize_for_class(path);
    SENSITIVE_MARKERS.iter().any(|m| p.contains(m))
}

/// Union used by the selection policy's preferred-candidate rule.
pub fn is_api_or_auth(path: &str) -> bool {
    is_api_path(path) || is_auth_path(path) || is_sensitive_path(path)
}

// ---------------------------------------------------------------------------
// Candidate discovery
// ---------------------------------------------------------------------------

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:href|action|src)\s*=\s*["']([^"'\s>]+)["']"#).expect("attr regex")
});

/// SPA hash routes: `/#/admin` or `#/admin`, normalized to `/#/...`.
static HASH_ROUTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#/([A-Za-z0-9_][A-Za-z0-9_/-]*)").expect("hash route regex"));

/// Absolute-path string literals in JS source.
static JS_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'](/[A-Za-z0-9_][A-Za-z0-9_/-]*)["']"#).expect("js path regex"));

static FRAMEWORK_PROP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:routerLink|ng-href|:href|to)\s*=\s*["']([^"'\s>]+)["']"#)
        .expect("framework prop regex")
});

static FETCH_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:\bfetch|\baxios\.[a-z]+|\$\.[a-z]+)\s*\(\s*["']([^"']+)["']"#)
        .expect("fetch call regex")
});

/// Documented routes like `GET /api/users/{id}`.
static DOC_ROUTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:GET|POST|PUT|DELETE|PATCH)\s+(/[A-Za-z0-9_{}./-]*)").expect("doc route regex")
});

static PARAM_TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[^}]+\}").expect("param template regex"));

/// Resolve one raw discovered string to a target-relative path.
///
/// Hash routes pass through; absolute paths lose their query; anything else
/// is parsed relative to the response URL and kept only when its origin
/// matches the configured target.
fn resolve_raw(raw: &str, response_url: &Url, target_origin: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("javascript:") || raw.starts_with("mailto:") {
        return None;
    }

    if let Some(rest) = raw.strip_prefix("/#/") {
        return Some(format!("/#/{}", rest));
    }
    if let Some(rest) = raw.strip_prefix("#/") {
        return Some(format!("/#/{}", rest));
    }
    if raw.starts_with('#') {
        return None;
    }

    if raw.starts_with('/') {
        let path = raw.split('?').next().unwrap_or(raw);
        return Some(path.to_string());
    }

    let resolved = if raw.contains("://") {
        Url::parse(raw).ok()?
    } else {
        response_url.join(raw).ok()?
    };
    if resolved.origin().ascii_serialization() != target_origin {
        return None;
    }
    Some(resolved.path().to_string())
}

/// Extract candidate paths from a response body. Six independent passes
/// composed in a fixed order; output is deduplicated and statics dropped.
/// Only `http_get` observations feed this.
pub fn extract_candidates(body: &str, response_url: &Url, target_origin: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut found = Vec::new();

    let mut push = |raw: &str| {
        if let Some(path) = resolve_raw(raw, response_url, target_origin) {
            if !is_static_path(&path) && seen.insert(path.clone()) {
                found.push(path);
            }
        }
    };

    for cap in ATTR_RE.captures_iter(body) {
        push(&cap[1]);
    }
    for cap in HASH_ROUTE_RE.captures_iter(body) {
        push(&format!("/#/{}", &cap[1]));
    }
    for cap in JS_PATH_RE.captures_iter(body) {
        push(&cap[1]);
    }
    for cap in FRAMEWORK_PROP_RE.captures_iter(body) {
        push(&cap[1]);
    }
    for cap in FETCH_CALL_RE.captures_iter(body) {
        push(&cap[1]);
    }
    for cap in DOC_ROUTE_RE.captures_iter(body) {
        let templated = PARAM_TEMPLATE_RE.replace_all(&cap[1], "1");
        push(&templated);
    }

    debug!(
        "Discovered {} candidate paths from {}",
        found.len(),
        response_url
    );
    found
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Priority score for one path, derived purely from (path, state).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PathScore {
    pub path: Option<String>,
    pub score: i32,
    pub hits: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tool: Option<ToolKind>,
}

pub fn score_path(path: Option<&str>, state: &RunState, max_hits_per_path: u32) -> PathScore {
    let path = match path {
        Some(p) => p,
        None => {
            return PathScore {
                path: None,
                score: -10,
                hits: 0,
                last_status: None,
                last_tool: None,
            }
        }
    };

    let hits = state.hits_for(path);
    let stat = state.path_stats.get(path);
    let last_status = stat.and_then(|s| s.last_status);
    let last_tool = stat.and_then(|s| s.last_tool);

    let mut score = 0i32;
    if !state.is_visited(path) {
        score += 2;
    }
    if hits >= max_hits_per_path {
        score -= 3;
    } else {
        score -= hits as i32;
    }
    if is_static_path(path) {
        score -= 2;
    }
    if is_api_path(path) {
        score += 3;
    }
    if is_auth_path(path) {
        score += 3;
    }
    if is_sensitive_path(path) {
        score += 2;
    }
    match last_status {
        Some(s) if s >= 500 => score += 2,
        Some(s) if s >= 400 => score += 1,
        _ => {}
    }

    PathScore {
        path: Some(path.to_string()),
        score,
        hits,
        last_status,
        last_tool,
    }
}

/// Top-scored unexplored candidates, for the cortex context.
pub fn scored_candidates(state: &RunState, limit: usize, max_hits_per_path: u32) -> Vec<PathScore> {
    let mut scored: Vec<PathScore> = state
        .candidates
        .iter()
        .map(|p| score_path(Some(p), state, max_hits_per_path))
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(limit);
    scored
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Whether the frontier will still dispatch to `path` at all.
fn is_eligible(state: &RunState, path: &str, max_hits_per_path: u32) -> bool {
    if state.hits_for(path) >= max_hits_per_path {
        return false;
    }
    // A static asset we've already fetched once has nothing left to show.
    if is_static_path(path) && state.is_visited(path) {
        return false;
    }
    true
}

/// Resolve the effective path for an action.
///
/// Order: the cortex's suggestion if it survives the anti-repeat and budget
/// checks, then the first preferred (API/auth/sensitive, unvisited)
/// candidate, then any eligible candidate in FIFO order. Consumed
/// candidates leave the frontier. `None` signals a skip.
pub fn choose_path(
    state: &mut RunState,
    tool: ToolKind,
    desired: Option<&str>,
    max_hits_per_path: u32,
) -> Option<String> {
    if let Some(d) = desired {
        let repeats_last = state
            .last_action
            .as_ref()
            .map(|la| la.tool == tool && la.path == d)
            .unwrap_or(false);
        if !repeats_last && is_eligible(state, d, max_hits_per_path) {
            return Some(d.to_string());
        }
    }

    let preferred = state.candidates.iter().position(|c| {
        is_api_or_auth(c) && !state.is_visited(c) && is_eligible(state, c, max_hits_per_path)
    });
    if let Some(idx) = preferred {
        return state.candidates.remove(idx);
    }

    let fallback = state
        .candidates
        .iter()
        .position(|c| is_eligible(state, c, max_hits_per_path));
    if let Some(idx) = fallback {
        return state.candidates.remove(idx);
    }

    None
}

// ---------------------------------------------------------------------------
// Diversity enforcement
// ---------------------------------------------------------------------------

/// Periodically force an under-used diagnostic tool so a run never ends
/// without header and error-behavior coverage.
///
/// Active once `hops >= DIVERSITY_INTERVAL`: a never-used required tool is
/// forced immediately; at each interval multiple, the least-used required
/// tool is forced when its count lags `hops / DIVERSITY_INTERVAL`.
pub fn diversity_override(state: &RunState) -> Option<ToolKind> {
    if state.hops < DIVERSITY_INTERVAL {
        return None;
    }

    for tool in REQUIRED_DIVERSITY_TOOLS {
        if state.tool_usage_for(tool) == 0 {
            return Some(tool);
        }
    }

    if state.hops % DIVERSITY_INTERVAL == 0 {
        let least = REQUIRED_DIVERSITY_TOOLS
            .into_iter()
            .min_by_key(|t| state.tool_usage_for(*t))?;
        if state.tool_usage_for(least) < state.hops / DIVERSITY_INTERVAL {
            return Some(least);
        }
    }

    None
}
