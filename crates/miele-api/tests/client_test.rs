#![allow(clippy::unwrap_used)]
// Integration tests for `MieleClient` using wiremock.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use miele_api::{Error, Method, MieleClient, RequestOptions, TokenProvider};

// ── Helpers ─────────────────────────────────────────────────────────

/// Hands out `token-1`, `token-2`, ... and counts how often it was asked.
#[derive(Default)]
struct CountingToken {
    calls: AtomicUsize,
}

impl TokenProvider for CountingToken {
    fn access_token(&self) -> impl Future<Output = Result<SecretString, Error>> + Send {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move { Ok(SecretString::from(format!("token-{n}"))) }
    }
}

async fn setup() -> (MockServer, MieleClient<CountingToken>, Arc<CountingToken>) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&format!("{}/v1", server.uri())).unwrap();
    let token = Arc::new(CountingToken::default());
    let client = MieleClient::with_client(reqwest::Client::new(), base_url, Arc::clone(&token));
    (server, client, token)
}

// ── request ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_attaches_bearer_and_keeps_base_path() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .and(query_param("language", "de"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client
        .request(Method::GET, "/devices?language=de", RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_caller_headers_kept_but_authorization_replaced() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .and(header("authorization", "Bearer token-1"))
        .and(header("x-trace", "abc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let options = RequestOptions::new()
        .header(AUTHORIZATION, HeaderValue::from_static("Bearer stale"))
        .header(
            HeaderName::from_static("x-trace"),
            HeaderValue::from_static("abc"),
        );
    let resp = client.request(Method::GET, "/devices", options).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_request_returns_error_statuses_verbatim() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let resp = client
        .request(Method::GET, "/devices", RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_token_requested_for_every_call() {
    let (server, client, token) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    for _ in 0..3 {
        client
            .request(Method::GET, "/devices", RequestOptions::new())
            .await
            .unwrap();
    }
    assert_eq!(token.calls.load(Ordering::SeqCst), 3);
}

// ── send_action ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_action_puts_json() {
    let (server, client, _) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/v1/devices/000149867450/actions"))
        .and(header("content-type", "application/json"))
        .and(header("authorization", "Bearer token-1"))
        .and(body_json(json!({ "processAction": 1 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client
        .send_action("000149867450", &json!({ "processAction": 1 }))
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
}

#[tokio::test]
async fn test_send_action_raises_on_failure() {
    let (server, client, _) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/v1/devices/1/actions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("processAction not allowed"))
        .mount(&server)
        .await;

    let result = client.send_action("1", &json!({ "processAction": 9 })).await;
    match result {
        Err(Error::Status { status, message }) => {
            assert_eq!(status, 400);
            assert!(message.contains("not allowed"), "message: {message}");
        }
        other => panic!("expected Status error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_send_action_unauthorized_is_auth_expired() {
    let (server, client, _) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/v1/devices/1/actions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client
        .send_action("1", &json!({ "powerOn": true }))
        .await
        .unwrap_err();
    assert!(err.is_auth_expired(), "expected auth error, got: {err:?}");
}

#[tokio::test]
async fn test_set_target_temperature_rounds() {
    let (server, client, _) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/v1/devices/711934968/actions"))
        .and(body_json(json!({
            "targetTemperature": [{ "zone": 2, "value": -18 }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client
        .set_target_temperature("711934968", -18.4, 2)
        .await
        .unwrap();
}

// ── get_actions ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_actions() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices/711944869/actions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "processAction": [6],
            "targetTemperature": [{ "zone": 1, "min": 1, "max": 9 }],
            "powerOn": false,
            "powerOff": false
        })))
        .mount(&server)
        .await;

    let actions = client.get_actions("711944869").await.unwrap();
    assert_eq!(actions["processAction"], json!([6]));
    assert_eq!(actions["targetTemperature"][0]["max"], 9);
}

#[tokio::test]
async fn test_get_actions_malformed_json() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices/1/actions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"processAction\": ["))
        .mount(&server)
        .await;

    let err = client.get_actions("1").await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert!(body.starts_with("{\"processAction\"")),
        other => panic!("expected Deserialization, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_get_actions_unauthorized() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices/1/actions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.get_actions("1").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
}
