// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Probe HTTP Client
 * Cookie-jar-backed HTTP with per-request timeout, body-snippet truncation,
 * and session summary introspection
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

use crate::errors::{AgentError, AgentResult};

/// Cookie names that indicate session material worth surfacing to the cortex.
static SESSION_COOKIE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)token|session|auth|jwt|sid|id").expect("session cookie regex"));

/// Cap on cookie names included in a session summary.
const SESSION_COOKIE_LIMIT: usize = 10;

/// One completed HTTP exchange as seen by the probe executor.
/// Any 1xx-5xx status is a success; only transport failures are errors.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub url: String,
    pub status: u16,
    /// Header names lowercased.
    pub headers: HashMap<String, String>,
    /// Body truncated to the configured snippet length.
    pub body_snippet: String,
    pub latency_ms: u64,
}

/// Pure view over the cookie jar for the target origin.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub cookie_count: usize,
    pub cookie_names: Vec<String>,
}

/// Shared HTTP client for the run. Cloneable; the jar and the underlying
/// connection pool are process-wide for the run and thread-safe, so a batch
/// can fan out requests over one instance.
#[derive(Clone)]
pub struct ProbeClient {
    client: Arc<Client>,
    jar: Arc<Jar>,
    snippet_bytes: usize,
}

impl ProbeClient {
    pub fn new(timeout_ms: u64, snippet_bytes: usize) -> AgentResult<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .cookie_provider(Arc::clone(&jar))
            .user_agent("atlas-agent/0.3")
            .tcp_nodelay(true)
            .build()
            .map_err(|e| AgentError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            jar,
            snippet_bytes,
        })
    }

    /// GET a URL within the target origin.
    pub async fn get(&self, url: Url) -> AgentResult<ProbeResponse> {
        self.send(self.client.get(url.clone()), url).await
    }

    /// POST a JSON value.
    pub async fn post_json(&self, url: Url, body: &Value) -> AgentResult<ProbeResponse> {
        self.send(self.client.post(url.clone()).json(body), url).await
    }

    /// POST a raw body with an explicit content type. The body is transmitted
    /// byte-for-byte; nothing is parsed or re-serialized on the way out.
    pub async fn post_raw(
        &self,
        url: Url,
        body: String,
        content_type: &str,
    ) -> AgentResult<ProbeResponse> {
        self.send(
            self.client
                .post(url.clone())
                .header("Content-Type", content_type.to_string())
                .body(body),
            url,
        )
        .await
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: Url,
    ) -> AgentResult<ProbeResponse> {
        let started = Instant::now();
        let response = request.send().await.map_err(|e| AgentError::Transport {
            url: url.to_string(),
            source: e,
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut headers = HashMap::with_capacity(response.headers().len());
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_lowercase(), v.to_string());
            }
        }

        // Body read errors after a received status line are treated as an
        // empty body, not a transport failure.
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                debug!("Body read failed for {}: {}", final_url, e);
                String::new()
            }
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        Ok(ProbeResponse {
            url: final_url,
            status,
            headers,
            body_snippet: truncate_snippet(&body, self.snippet_bytes),
            latency_ms,
        })
    }

    /// Summarize session cookies held for `origin`. Names only, capped at
    /// ten, filtered to ones that look like session material.
    pub fn session_state(&self, origin: &Url) -> SessionState {
        let header = match self.jar.cookies(origin) {
            Some(h) => h,
            None => return SessionState::default(),
        };
        let raw = match header.to_str() {
            Ok(s) => s.to_string(),
            Err(_) => return SessionState::default(),
        };

        let all_names: Vec<String> = raw
            .split(';')
            .filter_map(|pair| pair.trim().split('=').next())
            .filter(|name| !name.is_empty())
            .map(|name| name.to_string())
            .collect();

        let cookie_count = all_names.len();
        let cookie_names = all_names
            .into_iter()
            .filter(|name| SESSION_COOKIE_RE.is_match(name))
            .take(SESSION_COOKIE_LIMIT)
            .collect();

        SessionState {
            cookie_count,
            cookie_names,
        }
    }
}

/// Truncate to at most `limit` bytes without splitting a UTF-8 character.
fn truncate_snippet(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_string();
    }
    let mut end = limit;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_truncates_on_char_boundary() {
        let body = "ab\u{00e9}cd";
        // The e-acute spans bytes 2..4; a limit inside it must back off.
        assert_eq!(truncate_snippet(body, 3), "ab");
        assert_eq!(truncate_snippet(body, 4), "ab\u{00e9}");
        assert_eq!(truncate_snippet(body, 100), body);
    }

    #[test]
    fn snippet_is_unchanged_below_limit() {
        assert_eq!(truncate_snippet("small", 2000), "small");
        assert_eq!(truncate_snippet("", 2000), "");
    }

    #[test]
    fn session_filter_matches_expected_names() {
        for name in ["token", "SESSIONID", "auth_key", "my-jwt", "connect.sid"] {
            assert!(SESSION_COOKIE_RE.is_match(name), "{} should match", name);
        }
        assert!(!SESSION_COOKIE_RE.is_match("theme"));
        assert!(!SESSION_COOKIE_RE.is_match("lang"));
    }

    #[test]
    fn empty_jar_gives_empty_summary() {
        let client = ProbeClient::new(5000, 2000).unwrap();
        let origin = Url::parse("http://target:3000").unwrap();
        let summary = client.session_state(&origin);
        assert_eq!(summary.cookie_count, 0);
        assert!(summary.cookie_names.is_empty());
    }
}
