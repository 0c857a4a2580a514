//! Integration tests for the REST client against a mock backend

use api_client::rest::{ApiRequest, RestClient, RestClientConfig};
use serde::Deserialize;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pong {
    ok: bool,
}

async fn client_for(server: &MockServer) -> RestClient {
    RestClient::new(RestClientConfig::new(server.uri()))
}

#[tokio::test]
async fn test_get_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let response = client
        .execute::<Pong>(ApiRequest::get("/ping"))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert!(response.is_success());
    assert!(response.data.ok);
}

#[tokio::test]
async fn test_query_params_are_sent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/incidents"))
        .and(query_param("status", "open"))
        .and(query_param("severity", "critical"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let request = ApiRequest::get("/incidents")
        .param("status", "open")
        .param("severity", "critical");

    client
        .execute::<Vec<serde_json::Value>>(request)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/incidents"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({ "title": "db down" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let request = ApiRequest::post("/incidents")
        .json_body(&serde_json::json!({ "title": "db down" }))
        .unwrap();

    let response = client.execute::<Pong>(request).await.unwrap();
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn test_error_body_is_mapped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/incidents/inc_404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": "NotFound",
            "message": "Incident not found"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client
        .execute::<serde_json::Value>(ApiRequest::get("/incidents/inc_404"))
        .await
        .unwrap_err();

    assert_eq!(error.status(), 404);
    assert_eq!(error.code(), "NotFound");
    assert_eq!(error.message(), "Incident not found");
}

#[tokio::test]
async fn test_non_json_error_body_still_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client
        .execute::<serde_json::Value>(ApiRequest::get("/broken"))
        .await
        .unwrap_err();

    assert_eq!(error.status(), 500);
    assert_eq!(error.code(), "Unknown");
    assert!(error.is_network_error());
}

#[tokio::test]
async fn test_installed_bearer_is_attached() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("Authorization", "Bearer tok_abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client.set_bearer(Some("tok_abc"));

    client
        .execute::<Pong>(ApiRequest::get("/auth/me"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_per_request_authorization_wins() {
    let server = MockServer::start().await;

    // The refresh call carries the refresh token even while an access
    // token is installed
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(header("Authorization", "Bearer refresh_tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client.set_bearer(Some("access_tok"));

    let request = ApiRequest::post("/auth/refresh").header("Authorization", "Bearer refresh_tok");
    client.execute::<Pong>(request).await.unwrap();
}

#[tokio::test]
async fn test_cleared_bearer_is_not_sent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client.set_bearer(Some("tok_abc"));
    client.set_bearer(None);
    assert!(!client.has_bearer());

    let response = client
        .execute::<Pong>(ApiRequest::get("/ping"))
        .await
        .unwrap();

    assert!(response.data.ok);
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("Authorization").is_none());
}

#[tokio::test]
async fn test_retry_recovers_from_transient_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let response = client
        .execute_with_retry::<Pong>(ApiRequest::get("/flaky"), 3)
        .await
        .unwrap();

    assert!(response.data.ok);
}

#[tokio::test]
async fn test_retry_gives_up_on_client_error() {
    let server = MockServer::start().await;

    // 400 is not retryable; exactly one request should arrive
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "InvalidRequest",
            "message": "bad params"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client
        .execute_with_retry::<serde_json::Value>(ApiRequest::get("/bad"), 3)
        .await
        .unwrap_err();

    assert_eq!(error.status(), 400);
    assert_eq!(error.code(), "InvalidRequest");
}
