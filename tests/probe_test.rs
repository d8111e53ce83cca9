// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Probe Executor Tests
 * Dispatch contract: hit caps, budget gate, bookkeeping, batch semantics
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use atlas_agent::config::AgentConfig;
use atlas_agent::http_client::ProbeClient;
use atlas_agent::probe::{dispatch_tool, execute_batch};
use atlas_agent::state::{Action, RunState, ToolKind};

fn config_for(server: &MockServer) -> AgentConfig {
    AgentConfig {
        target_url: server.uri(),
        ..AgentConfig::default()
    }
}

fn client() -> ProbeClient {
    ProbeClient::new(5000, 2000).unwrap()
}

async fn plain_target() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn dispatch_records_observation_and_bookkeeping() {
    let server = plain_target().await;
    let config = config_for(&server);
    let client = client();
    let mut state = RunState::new();

    let ok = dispatch_tool(&mut state, &client, &config, &Action::get("/api/items", "map")).await;

    assert!(ok);
    assert_eq!(state.observations.len(), 1);
    assert_eq!(state.visited_paths(), &["/api/items".to_string()]);
    assert_eq!(state.hits_for("/api/items"), 1);
    assert_eq!(state.metrics.requests(), 1);
    assert_eq!(state.last_action.as_ref().unwrap().path, "/api/items");

    let stat = state.path_stats.get("/api/items").unwrap();
    assert_eq!(stat.last_status, Some(200));
    assert_eq!(stat.last_tool, Some(ToolKind::HttpGet));
    assert_eq!(stat.hits, 1);
    assert!(stat.last_observation_id.is_some());
}

#[tokio::test]
async fn hit_cap_holds_for_every_dispatched_path() {
    let server = plain_target().await;
    let config = config_for(&server);
    let client = client();
    let mut state = RunState::new();

    // Alternate tools so the anti-repeat rule never kicks in first.
    assert!(dispatch_tool(&mut state, &client, &config, &Action::get("/x", "one")).await);
    assert!(
        dispatch_tool(
            &mut state,
            &client,
            &config,
            &Action::forced(ToolKind::InspectHeaders, "/x", "two")
        )
        .await
    );
    // Third attempt: the path is at its cap and no candidates exist.
    assert!(!dispatch_tool(&mut state, &client, &config, &Action::get("/x", "three")).await);

    assert_eq!(state.hits_for("/x"), 2);
    assert_eq!(state.observations.len(), 2);
    assert_eq!(state.metrics.error_count(), 1);
}

#[tokio::test]
async fn budget_gate_fails_fast_without_issuing() {
    let server = plain_target().await;
    let mut config = config_for(&server);
    config.max_requests = 1;
    let client = client();
    let mut state = RunState::new();

    assert!(dispatch_tool(&mut state, &client, &config, &Action::get("/a", "first")).await);
    assert!(!dispatch_tool(&mut state, &client, &config, &Action::get("/b", "second")).await);

    // The refused dispatch left no observation and no path bookkeeping.
    assert_eq!(state.metrics.requests(), 1);
    assert_eq!(state.observations.len(), 1);
    assert!(!state.is_visited("/b"));
    let errors = state.metrics.errors_snapshot();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, "budget_exceeded");
}

#[tokio::test]
async fn get_responses_grow_the_frontier() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r##"<a href="/api/users">users</a>
                <a href="/login">login</a>
                <a href="/logo.png">logo</a>
                <script>fetch("/rest/products/search")</script>"##,
        ))
        .mount(&server)
        .await;
    let config = config_for(&server);
    let client = client();
    let mut state = RunState::new();

    dispatch_tool(&mut state, &client, &config, &Action::get("/", "recon")).await;

    let candidates: Vec<&String> = state.candidates.iter().collect();
    assert!(candidates.contains(&&"/api/users".to_string()));
    assert!(candidates.contains(&&"/login".to_string()));
    assert!(candidates.contains(&&"/rest/products/search".to_string()));
    // Statics never enter the frontier.
    assert!(!candidates.contains(&&"/logo.png".to_string()));
    // The visited root is not a candidate.
    assert!(!candidates.contains(&&"/".to_string()));
}

#[tokio::test]
async fn batch_with_no_valid_paths_counts_as_a_skip() {
    let server = plain_target().await;
    let config = config_for(&server);
    let client = client();
    let mut state = RunState::new();

    // Exhaust the only path, then stage a batch that cannot select anything.
    dispatch_tool(&mut state, &client, &config, &Action::get("/only", "a")).await;
    dispatch_tool(
        &mut state,
        &client,
        &config,
        &Action::forced(ToolKind::InspectHeaders, "/only", "b"),
    )
    .await;

    let outcome = execute_batch(
        &mut state,
        &client,
        &config,
        &[Action::get("/only", "again")],
    )
    .await;

    assert_eq!(outcome.successes, 0);
    assert_eq!(outcome.failures, 1);
    assert_eq!(state.skipped_hops, 1);
    assert_eq!(state.consecutive_skips, 1);
    assert_eq!(state.hops, 1);

    // A later successful batch resets the consecutive counter only.
    let outcome = execute_batch(&mut state, &client, &config, &[Action::get("/new", "c")]).await;
    assert_eq!(outcome.successes, 1);
    assert_eq!(state.consecutive_skips, 0);
    assert_eq!(state.skipped_hops, 1);
    assert_eq!(state.hops, 2);
}

#[tokio::test]
async fn batch_dispatches_settle_together() {
    let server = plain_target().await;
    let config = config_for(&server);
    let client = client();
    let mut state = RunState::new();

    let actions = vec![
        Action::get("/a", ""),
        Action::get("/b", ""),
        Action::get("/c", ""),
        Action::get("/d", ""),
        Action::get("/e", ""),
    ];
    let outcome = execute_batch(&mut state, &client, &config, &actions).await;

    assert_eq!(outcome.successes, 5);
    assert_eq!(state.observations.len(), 5);
    assert_eq!(state.metrics.requests(), 5);
    assert_eq!(state.batch_stats.total_batches, 1);
    assert_eq!(state.batch_stats.total_actions, 5);
    // Every observation has a matching per-tool increment.
    assert_eq!(state.metrics.per_tool_snapshot()["http_get"], 5);
}

#[tokio::test]
async fn transport_failure_records_error_without_observation() {
    let config = AgentConfig {
        target_url: "http://127.0.0.1:1".into(),
        request_timeout_ms: 500,
        ..AgentConfig::default()
    };
    let client = ProbeClient::new(500, 2000).unwrap();
    let mut state = RunState::new();

    let ok = dispatch_tool(&mut state, &client, &config, &Action::get("/x", "dead")).await;

    assert!(!ok);
    assert!(state.observations.is_empty());
    let errors = state.metrics.errors_snapshot();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, "transport");
    // The failed attempt still consumed its reserved budget slot.
    assert_eq!(state.metrics.requests(), 1);
}
