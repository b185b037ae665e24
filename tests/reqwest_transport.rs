//! Behavior-driven tests for the reqwest transport
//!
//! These tests run real HTTP against a local mock server to verify HOW the
//! production transport and the resilient client behave on the wire.

use std::sync::Arc;
use std::time::Duration;

use tickwire_core::{
    ErrorKind, FetchContext, HttpAuth, HttpClient, HttpRequest, ReqwestTransport,
    ResilienceConfig, ResilientClient, RetryConfig, Transport,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn resilient(config: ResilienceConfig) -> ResilientClient {
    ResilientClient::new(Arc::new(ReqwestTransport::default()), &config)
}

// =============================================================================
// Transport: Wire Behavior
// =============================================================================

#[tokio::test]
async fn when_transport_sends_request_system_forwards_query_headers_and_body() {
    // Given: A server expecting an authenticated quote lookup
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quote"))
        .and(query_param("list", "sh600000,sz000001"))
        .and(header("authorization", "Bearer demo-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-upstream", "mock")
                .set_body_json(serde_json::json!({"sh600000": 10.5})),
        )
        .expect(1)
        .mount(&server)
        .await;

    // When: The raw transport sends the request
    let request = HttpRequest::get(format!("{}/quote", server.uri()))
        .with_query("list", "sh600000,sz000001")
        .with_auth(&HttpAuth::BearerToken(String::from("demo-token")));
    let response = ReqwestTransport::default()
        .execute(request)
        .await
        .expect("server answers");

    // Then: Status, headers and body come back intact
    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get("x-upstream").map(String::as_str), Some("mock"));
    let body: serde_json::Value = response.json().expect("json body");
    assert_eq!(body["sh600000"], 10.5);
}

#[tokio::test]
async fn when_server_errors_transport_still_returns_the_response() {
    // Given: A server answering 500
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    // When: The raw transport posts to it
    let response = ReqwestTransport::default()
        .execute(HttpRequest::post(format!("{}/batch", server.uri())).with_body("[]"))
        .await
        .expect("an HTTP response is not a transport error");

    // Then: The status is reported and classification is left to the client
    assert_eq!(response.status, 500);
    assert_eq!(response.text(), "upstream down");
}

// =============================================================================
// Resilient Client: Over Real HTTP
// =============================================================================

#[tokio::test]
async fn when_server_recovers_resilient_client_retries_over_http() {
    // Given: A server that fails once with 503 and then answers
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quote"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
        .mount(&server)
        .await;
    let client = resilient(
        ResilienceConfig::default().with_retry(RetryConfig::fixed(Duration::from_millis(10), 3)),
    );

    // When: One logical request is executed
    let exchange = client
        .execute(&FetchContext::new(), HttpRequest::get(format!("{}/quote", server.uri())))
        .await;

    // Then: It succeeds on the second attempt
    assert!(exchange.is_success());
    assert_eq!(exchange.record.attempts(), 2);
    assert_eq!(exchange.record.response().map(|r| r.status), Some(200));
}

#[tokio::test]
async fn when_server_is_slower_than_timeout_resilient_client_reports_timeout() {
    // Given: A server that delays its answer beyond the attempt timeout
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    let client = resilient(ResilienceConfig::disabled().with_timeout(Duration::from_millis(50)));

    // When: The request is executed
    let exchange = client
        .execute(&FetchContext::new(), HttpRequest::get(format!("{}/slow", server.uri())))
        .await;

    // Then: The failure is classified as a timeout
    let error = exchange.into_result().expect_err("attempt times out");
    assert_eq!(error.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn when_server_requires_auth_resilient_client_fails_without_retrying() {
    // Given: A server rejecting the credentials
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    let client = resilient(
        ResilienceConfig::disabled().with_retry(RetryConfig::fixed(Duration::from_millis(1), 3)),
    );

    // When: The request is executed
    let exchange = client
        .execute(&FetchContext::new(), HttpRequest::get(format!("{}/private", server.uri())))
        .await;

    // Then: One attempt, classified as an auth failure
    let error = exchange.into_result().expect_err("forbidden");
    assert_eq!(error.kind(), ErrorKind::Auth);
    assert_eq!(error.status(), Some(403));
}

#[tokio::test]
async fn when_nothing_listens_resilient_client_reports_network_error() {
    // Given: An address with no server behind it
    let client = resilient(ResilienceConfig::disabled().with_timeout(Duration::from_secs(5)));

    // When: The request is executed
    let exchange = client
        .execute(&FetchContext::new(), HttpRequest::get("http://127.0.0.1:1/quote"))
        .await;

    // Then: The connection failure is a retryable network error
    let error = exchange.into_result().expect_err("connection refused");
    assert_eq!(error.kind(), ErrorKind::Network);
    assert!(error.is_retryable());
}
