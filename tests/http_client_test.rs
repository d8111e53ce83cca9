// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - ATLAS Probe Client Tests
 * Cookie jar introspection, snippet truncation, and status semantics
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use atlas_agent::http_client::ProbeClient;

#[tokio::test]
async fn server_errors_are_observations_not_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/boom"))
        .respond_with(ResponseTemplate::new(500).set_body_string("kaput"))
        .mount(&server)
        .await;

    let client = ProbeClient::new(5000, 2000).unwrap();
    let url = Url::parse(&format!("{}/boom", server.uri())).unwrap();
    let response = client.get(url).await.unwrap();

    assert_eq!(response.status, 500);
    assert_eq!(response.body_snippet, "kaput");
}

#[tokio::test]
async fn connection_refused_is_a_transport_error() {
    let client = ProbeClient::new(500, 2000).unwrap();
    let url = Url::parse("http://127.0.0.1:1/").unwrap();
    assert!(client.get(url).await.is_err());
}

#[tokio::test]
async fn header_names_are_lowercased() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Powered-By", "Express")
                .insert_header("Access-Control-Allow-Origin", "*"),
        )
        .mount(&server)
        .await;

    let client = ProbeClient::new(5000, 2000).unwrap();
    let url = Url::parse(&server.uri()).unwrap();
    let response = client.get(url).await.unwrap();

    assert_eq!(response.headers.get("x-powered-by").unwrap(), "Express");
    assert_eq!(
        response.headers.get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn body_is_truncated_to_the_snippet_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(10_000)))
        .mount(&server)
        .await;

    let client = ProbeClient::new(5000, 128).unwrap();
    let url = Url::parse(&server.uri()).unwrap();
    let response = client.get(url).await.unwrap();

    assert_eq!(response.body_snippet.len(), 128);
}

#[tokio::test]
async fn session_state_reflects_set_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "token=abc123; Path=/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/theme"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "theme=dark; Path=/"),
        )
        .mount(&server)
        .await;

    let client = ProbeClient::new(5000, 2000).unwrap();
    let origin = Url::parse(&server.uri()).unwrap();
    client
        .get(Url::parse(&format!("{}/login", server.uri())).unwrap())
        .await
        .unwrap();
    client
        .get(Url::parse(&format!("{}/theme", server.uri())).unwrap())
        .await
        .unwrap();

    let session = client.session_state(&origin);
    assert_eq!(session.cookie_count, 2);
    // Only session-looking names are surfaced.
    assert_eq!(session.cookie_names, vec!["token".to_string()]);
}

#[tokio::test]
async fn latency_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(std::time::Duration::from_millis(30)),
        )
        .mount(&server)
        .await;

    let client = ProbeClient::new(5000, 2000).unwrap();
    let url = Url::parse(&server.uri()).unwrap();
    let response = client.get(url).await.unwrap();

    assert!(response.latency_ms >= 25);
}
