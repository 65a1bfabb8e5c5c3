// Integration tests for `StreamClient` over real SSE responses, using wiremock.
#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use explorer_stream::{
    ChangeType, ConnectionState, DisconnectReason, EventKind, Notification, StreamClient,
    StreamConfig, StreamError,
};

// ── Helpers ─────────────────────────────────────────────────────────

const EVENTS_PATH: &str = "/api/explorer/events";

const ACK_AND_CHANGE: &str = "event: connected\n\
data: {\"version\":\"test\"}\n\
\n\
event: file_change\n\
data: {\"path\":\"/docs/readme.md\",\"type\":\"modified\"}\n\
\n";

fn config(server: &MockServer) -> StreamConfig {
    StreamConfig {
        initial_reconnect_delay: Duration::from_millis(50),
        max_reconnect_delay: Duration::from_millis(200),
        max_reconnect_attempts: 5,
        event_debounce: Duration::from_millis(20),
        connect_timeout: Duration::from_secs(2),
        ..StreamConfig::with_base_url(server.uri())
    }
}

async fn mount_stream(server: &MockServer, body: &'static str) {
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(server)
        .await;
}

fn record(client: &StreamClient) -> Arc<Mutex<Vec<Notification>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in [
        EventKind::Connected,
        EventKind::FileChange,
        EventKind::Disconnected,
        EventKind::Error,
    ] {
        let sink = seen.clone();
        client.subscribe(kind, move |n| {
            sink.lock().unwrap().push(n.clone());
            Ok(())
        });
    }
    seen
}

fn count(seen: &Mutex<Vec<Notification>>, kind: EventKind) -> usize {
    seen.lock()
        .unwrap()
        .iter()
        .filter(|n| n.kind() == kind)
        .count()
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

// ── Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_delivers_ack_and_file_change() {
    let server = MockServer::start().await;
    mount_stream(&server, ACK_AND_CHANGE).await;

    let client = StreamClient::new(config(&server));
    let seen = record(&client);

    let info = client.connect().await.unwrap();
    assert_eq!(info, json!({ "version": "test" }));

    wait_until(|| count(&seen, EventKind::FileChange) >= 1).await;
    let first = seen
        .lock()
        .unwrap()
        .iter()
        .find_map(|n| match n {
            Notification::FileChange(change) => Some(change.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(first.path, "/docs/readme.md");
    assert_eq!(first.change, ChangeType::Modified);

    client.disconnect();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnects_after_server_ends_stream() {
    let server = MockServer::start().await;
    mount_stream(&server, ACK_AND_CHANGE).await;

    let client = StreamClient::new(config(&server));
    let seen = record(&client);
    client.connect().await.unwrap();

    // The body is finite: each response ends the stream and forces a retry.
    wait_until(|| count(&seen, EventKind::Connected) >= 2).await;

    let dropped = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|n| {
            matches!(
                n,
                Notification::Disconnected {
                    reason: DisconnectReason::Error
                }
            )
        })
        .count();
    assert!(dropped >= 1);

    client.disconnect();
    // Let a request that was already on the wire land first.
    tokio::time::sleep(Duration::from_millis(30)).await;
    let requests_at_disconnect = server.received_requests().await.unwrap_or_default().len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let requests_after = server.received_requests().await.unwrap_or_default().len();
    assert_eq!(requests_at_disconnect, requests_after, "no retries after disconnect");
}

// ── Error paths ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_http_error_status_rejects_connect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = StreamClient::new(config(&server));
    let err = client.connect().await.unwrap_err();

    assert!(matches!(err, StreamError::HttpStatus { status: 404 }), "{err:?}");
    assert!(!err.is_transient());
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_wrong_content_type_rejects_connect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "not": "sse" })))
        .mount(&server)
        .await;

    let client = StreamClient::new(config(&server));
    let err = client.connect().await.unwrap_err();

    assert!(matches!(err, StreamError::ContentType(_)), "{err:?}");
}

#[tokio::test]
async fn test_unsupported_scheme_fails_before_any_request() {
    let client = StreamClient::new(StreamConfig::with_base_url("ftp://files.example.com"));
    let err = client.connect().await.unwrap_err();

    assert!(matches!(err, StreamError::Open(_)), "{err:?}");
}
