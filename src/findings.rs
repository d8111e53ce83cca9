// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Findings Extractor
 * Deterministic derivation of deduplicated OWASP-tagged findings from
 * accumulated observations
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

use crate::state::Observation;

pub const OWASP_A01: &str = "A01:2021-Broken Access Control";
pub const OWASP_A05: &str = "A05:2021-Security Misconfiguration";

/// Evidence strings are clipped so a finding stays readable in the trace.
const EVIDENCE_LIMIT: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}

/// A deterministically-derived, deduplicated security signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(rename = "type")]
    pub finding_type: String,
    pub subtype: String,
    pub severity: Severity,
    pub path: String,
    pub evidence: String,
    pub owasp: String,
    pub observation_id: String,
}

fn clip(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= EVIDENCE_LIMIT {
        return trimmed.to_string();
    }
    let mut end = EVIDENCE_LIMIT;
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

/// Derive findings from the observation log. Pure and idempotent: the same
/// observations always yield the same findings, in first-seen order, with
/// one entry per semantic key.
///
/// An observation whose URL fails to parse contributes nothing; that rule's
/// signal is dropped rather than erroring the run.
pub fn extract_findings(observations: &[Observation]) -> Vec<Finding> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut findings = Vec::new();

    for obs in observations {
        let pathname = match Url::parse(&obs.url) {
            Ok(u) => u.path().to_string(),
            Err(_) => continue,
        };

        let mut emit = |key: String, finding: Finding| {
            if seen.insert(key) {
                findings.push(finding);
            }
        };

        // Stack trace leaking through a 5xx body.
        if obs.status >= 500 && obs.body_snippet.contains("stack") {
            emit(
                format!("stack_trace:{}", pathname),
                Finding {
                    finding_type: "information_disclosure".into(),
                    subtype: "stack_trace".into(),
                    severity: Severity::Medium,
                    path: pathname.clone(),
                    evidence: clip(&obs.body_snippet),
                    owasp: OWASP_A05.into(),
                    observation_id: obs.id.clone(),
                },
            );
        }

        // CORS wildcard.
        if obs
            .headers
            .get("access-control-allow-origin")
            .map(|v| v.trim() == "*")
            .unwrap_or(false)
        {
            emit(
                "cors_wildcard".into(),
                Finding {
                    finding_type: "security_misconfiguration".into(),
                    subtype: "cors_wildcard".into(),
                    severity: Severity::Low,
                    path: pathname.clone(),
                    evidence: "access-control-allow-origin: *".into(),
                    owasp: OWASP_A05.into(),
                    observation_id: obs.id.clone(),
                },
            );
        }

        // Missing security headers.
        if !obs.headers.contains_key("strict-transport-security") {
            emit(
                "missing_hsts".into(),
                Finding {
                    finding_type: "missing_security_header".into(),
                    subtype: "missing_hsts".into(),
                    severity: Severity::Low,
                    path: pathname.clone(),
                    evidence: "no strict-transport-security header in response".into(),
                    owasp: OWASP_A05.into(),
                    observation_id: obs.id.clone(),
                },
            );
        }
        if !obs.headers.contains_key("content-security-policy") {
            emit(
                "missing_csp".into(),
                Finding {
                    finding_type: "missing_security_header".into(),
                    subtype: "missing_csp".into(),
                    severity: Severity::Low,
                    path: pathname.clone(),
                    evidence: "no content-security-policy header in response".into(),
                    owasp: OWASP_A05.into(),
                    observation_id: obs.id.clone(),
                },
            );
        }

        // Verbose auth error bodies.
        if obs.status == 401 && obs.body_snippet.contains("UnauthorizedError") {
            emit(
                format!("auth_disclosure:{}", pathname),
                Finding {
                    finding_type: "information_disclosure".into(),
                    subtype: "auth_error_details".into(),
                    severity: Severity::Low,
                    path: pathname.clone(),
                    evidence: clip(&obs.body_snippet),
                    owasp: OWASP_A01.into(),
                    observation_id: obs.id.clone(),
                },
            );
        }

        // Server banner disclosure.
        let banner = obs
            .headers
            .get("server")
            .map(|v| format!("server: {}", v))
            .or_else(|| {
                obs.headers
                    .get("x-powered-by")
                    .map(|v| format!("x-powered-by: {}", v))
            });
        if let Some(evidence) = banner {
            emit(
                "server_disclosure".into(),
                Finding {
                    finding_type: "information_disclosure".into(),
                    subtype: "server_banner".into(),
                    severity: Severity::Info,
                    path: pathname.clone(),
                    evidence,
                    owasp: OWASP_A05.into(),
                    observation_id: obs.id.clone(),
                },
            );
        }
    }

    findings
}
