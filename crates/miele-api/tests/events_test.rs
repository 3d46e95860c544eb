#![allow(clippy::unwrap_used)]
// Integration tests for the event stream listener using wiremock.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use miele_api::{
    Callbacks, Error, EventHandler, EventListener, HandlerError, ListenerConfig, ListenerExit,
    ListenerState, MieleClient, TokenProvider,
};

// ── Helpers ─────────────────────────────────────────────────────────

#[derive(Default)]
struct CountingToken {
    calls: AtomicUsize,
    issued_at: Mutex<Vec<Instant>>,
}

impl TokenProvider for CountingToken {
    fn access_token(&self) -> impl Future<Output = Result<SecretString, Error>> + Send {
        self.issued_at.lock().unwrap().push(Instant::now());
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move { Ok(SecretString::from(format!("token-{n}"))) }
    }
}

/// Payloads seen by each callback.
#[derive(Default, Clone)]
struct Recorded {
    devices: Arc<Mutex<Vec<Value>>>,
    actions: Arc<Mutex<Vec<Value>>>,
}

impl Recorded {
    fn devices(&self) -> Vec<Value> {
        self.devices.lock().unwrap().clone()
    }

    fn actions(&self) -> Vec<Value> {
        self.actions.lock().unwrap().clone()
    }
}

fn recording_handler(recorded: &Recorded) -> Arc<impl EventHandler> {
    let devices = Arc::clone(&recorded.devices);
    let actions = Arc::clone(&recorded.actions);
    Arc::new(Callbacks::new(
        move |v: Value| {
            devices.lock().unwrap().push(v);
            std::future::ready(Ok::<(), HandlerError>(()))
        },
        move |v: Value| {
            actions.lock().unwrap().push(v);
            std::future::ready(Ok::<(), HandlerError>(()))
        },
    ))
}

fn fast_config() -> ListenerConfig {
    ListenerConfig {
        reconnect_delay: Duration::from_millis(50),
        connect_timeout: Duration::from_secs(5),
    }
}

async fn setup() -> (MockServer, MieleClient<CountingToken>, Arc<CountingToken>) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&format!("{}/v1", server.uri())).unwrap();
    let token = Arc::new(CountingToken::default());
    let client = MieleClient::with_client(reqwest::Client::new(), base_url, Arc::clone(&token));
    (server, client, token)
}

fn stream(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

async fn run_to_exit(
    client: MieleClient<CountingToken>,
    handler: Arc<impl EventHandler>,
) -> ListenerExit {
    let listener = EventListener::new(client, handler, fast_config());
    tokio::time::timeout(Duration::from_secs(5), listener.run(CancellationToken::new()))
        .await
        .expect("listener did not finish")
}

// ── Dispatch ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_dispatches_frames_and_ends_on_close() {
    let (server, client, token) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices/all/events"))
        .and(header("accept", "text/event-stream"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(stream(concat!(
            "event: devices\n",
            "data: {\"711934968\":{\"state\":{\"status\":{\"value_raw\":5}}}}\n",
            "\n",
            "event: ping\n",
            "\n",
            "\n",
            "event: actions\n",
            "data: {\"711934968\":{\"processAction\":[1,2]}}\n",
            "\n",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let recorded = Recorded::default();
    let exit = run_to_exit(client, recording_handler(&recorded)).await;

    assert_eq!(exit, ListenerExit::StreamClosed);
    assert_eq!(
        recorded.devices(),
        vec![json!({"711934968": {"state": {"status": {"value_raw": 5}}}})]
    );
    assert_eq!(
        recorded.actions(),
        vec![json!({"711934968": {"processAction": [1, 2]}})]
    );
    assert_eq!(token.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_event_type_is_ignored() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices/all/events"))
        .respond_with(stream(concat!(
            "event: firmware\n",
            "data: {\"x\":1}\n",
            "\n",
            "event: devices\n",
            "data: {\"A\":1}\n",
            "\n",
        )))
        .mount(&server)
        .await;

    let recorded = Recorded::default();
    let exit = run_to_exit(client, recording_handler(&recorded)).await;

    assert_eq!(exit, ListenerExit::StreamClosed);
    assert_eq!(recorded.devices(), vec![json!({"A": 1})]);
    assert!(recorded.actions().is_empty());
}

#[tokio::test]
async fn test_failing_callback_does_not_stop_stream() {
    let (server, client, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices/all/events"))
        .respond_with(stream(concat!(
            "event: devices\n",
            "data: {\"A\":1}\n",
            "\n",
            "event: actions\n",
            "data: {\"B\":2}\n",
            "\n",
        )))
        .mount(&server)
        .await;

    let recorded = Recorded::default();
    let actions = Arc::clone(&recorded.actions);
    let handler = Arc::new(Callbacks::new(
        |_: Value| async { Err::<(), HandlerError>("boom".into()) },
        move |v: Value| {
            let actions = Arc::clone(&actions);
            async move {
                actions.lock().unwrap().push(v);
                Ok::<(), HandlerError>(())
            }
        },
    ));

    let listener = EventListener::new(client, handler, fast_config());
    let exit = tokio::time::timeout(Duration::from_secs(5), listener.run(CancellationToken::new()))
        .await
        .unwrap();

    assert_eq!(exit, ListenerExit::StreamClosed);
    assert_eq!(recorded.actions(), vec![json!({"B": 2})]);
}

// ── Reconnect ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_reconnects_after_error_status_with_fresh_token() {
    let (server, client, token) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices/all/events"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/devices/all/events"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(stream("event: devices\ndata: {\"A\":1}\n\n"))
        .with_priority(2)
        .mount(&server)
        .await;

    let recorded = Recorded::default();
    let exit = run_to_exit(client, recording_handler(&recorded)).await;

    assert_eq!(exit, ListenerExit::StreamClosed);
    assert_eq!(recorded.devices(), vec![json!({"A": 1})]);
    assert_eq!(token.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_malformed_payload_triggers_reconnect() {
    let (server, client, token) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices/all/events"))
        .respond_with(stream(concat!(
            "event: devices\n",
            "data: {\"A\": \n",
            "\n",
            "event: devices\n",
            "data: {\"never\":true}\n",
            "\n",
        )))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/devices/all/events"))
        .respond_with(stream("event: devices\ndata: {\"A\":2}\n\n"))
        .with_priority(2)
        .mount(&server)
        .await;

    let recorded = Recorded::default();
    let exit = run_to_exit(client, recording_handler(&recorded)).await;

    assert_eq!(exit, ListenerExit::StreamClosed);
    // The frame after the malformed one is lost with the dropped connection.
    assert_eq!(recorded.devices(), vec![json!({"A": 2})]);
    assert_eq!(token.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_waits_reconnect_delay_before_next_attempt() {
    let (server, client, token) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices/all/events"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/devices/all/events"))
        .respond_with(stream("event: ping\n\n\n"))
        .with_priority(2)
        .mount(&server)
        .await;

    let delay = Duration::from_millis(400);
    let config = ListenerConfig {
        reconnect_delay: delay,
        connect_timeout: Duration::from_secs(5),
    };
    let recorded = Recorded::default();
    let listener = EventListener::new(client, recording_handler(&recorded), config);
    let exit = tokio::time::timeout(Duration::from_secs(5), listener.run(CancellationToken::new()))
        .await
        .unwrap();

    assert_eq!(exit, ListenerExit::StreamClosed);
    let issued_at = token.issued_at.lock().unwrap().clone();
    assert_eq!(issued_at.len(), 2);
    let gap = issued_at[1] - issued_at[0];
    assert!(gap >= delay, "reconnected after {gap:?}, expected at least {delay:?}");
}

/// Read one request head, then write `response` verbatim.
async fn answer(socket: &mut TcpStream, response: &str) {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client hung up before sending a request");
        head.extend_from_slice(&chunk[..n]);
    }
    socket.write_all(response.as_bytes()).await.unwrap();
    socket.flush().await.unwrap();
}

#[tokio::test]
async fn test_transport_error_mid_stream_reconnects() {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // Promise more body than is sent, then drop the connection.
        let (mut first, _) = tcp.accept().await.unwrap();
        answer(
            &mut first,
            concat!(
                "HTTP/1.1 200 OK\r\n",
                "content-type: text/event-stream\r\n",
                "content-length: 1000\r\n",
                "\r\n",
                "event: devices\n",
                "data: {\"A\":1}\n",
                "\n",
            ),
        )
        .await;
        drop(first);

        let body = "event: devices\ndata: {\"A\":2}\n\n";
        let (mut second, _) = tcp.accept().await.unwrap();
        answer(
            &mut second,
            &format!(
                "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            ),
        )
        .await;
    });

    let base_url = Url::parse(&format!("http://{addr}/v1")).unwrap();
    let token = Arc::new(CountingToken::default());
    let client = MieleClient::with_client(reqwest::Client::new(), base_url, Arc::clone(&token));

    let recorded = Recorded::default();
    let exit = run_to_exit(client, recording_handler(&recorded)).await;
    server.await.unwrap();

    assert_eq!(exit, ListenerExit::StreamClosed);
    assert_eq!(recorded.devices(), vec![json!({"A": 1}), json!({"A": 2})]);
    assert_eq!(token.calls.load(Ordering::SeqCst), 2);
}

// ── Cancellation ────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_stops_reconnect_loop() {
    let (server, client, token) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices/all/events"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let recorded = Recorded::default();
    let listener = EventListener::new(client, recording_handler(&recorded), fast_config());
    let mut state = listener.state();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(listener.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();

    let exit = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit, ListenerExit::Cancelled);
    assert_eq!(*state.borrow_and_update(), ListenerState::Cancelled);

    let attempts = token.calls.load(Ordering::SeqCst);
    assert!(attempts >= 2, "expected several attempts, got {attempts}");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(token.calls.load(Ordering::SeqCst), attempts);
    assert!(recorded.devices().is_empty());
}
