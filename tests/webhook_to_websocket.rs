//! End-to-end: signed webhooks over HTTP, events out over WebSocket.

#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::StreamExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use livekit_events::api::build_router;
use livekit_events::app_state::AppState;
use livekit_events::domain::{Hub, WebhookEvent};
use livekit_events::webhook::{EventVerifier, TokenVerifier, TrustList};
use livekit_events::ws::SessionSupervisor;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const API_KEY: &str = "APIe2ekey";
const API_SECRET: &str = "e2e-secret-used-only-in-tests";

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    exp: i64,
    sha256: String,
}

fn sign(body: &[u8]) -> String {
    let claims = Claims {
        iss: API_KEY,
        exp: chrono::Utc::now().timestamp() + 300,
        sha256: STANDARD.encode(Sha256::digest(body)),
    };
    let Ok(token) = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(API_SECRET.as_bytes()),
    ) else {
        panic!("token encoding failed");
    };
    token
}

struct Server {
    addr: SocketAddr,
    hub: Arc<Hub>,
    sessions: SessionSupervisor,
}

async fn spawn_server(trusted: &[&str]) -> (SocketAddr, Arc<Hub>) {
    let server = spawn_server_with(trusted, 64, Duration::from_secs(5)).await;
    (server.addr, server.hub)
}

async fn spawn_server_with(trusted: &[&str], capacity: usize, write_timeout: Duration) -> Server {
    let hub = Arc::new(Hub::new(capacity, None));
    let sessions = SessionSupervisor::new(write_timeout);
    let state = AppState {
        hub: Arc::clone(&hub),
        verifier: Arc::new(TokenVerifier::new(API_KEY, API_SECRET)) as Arc<dyn EventVerifier>,
        trust_list: Arc::new(TrustList::new(
            trusted.iter().map(|t| (*t).to_string()).collect(),
        )),
        sessions: sessions.clone(),
    };

    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Server {
        addr,
        hub,
        sessions,
    }
}

async fn wait_for_subscribers(hub: &Hub, expected: usize) {
    for _ in 0..200 {
        if hub.registry().len().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {expected} subscribers");
}

async fn subscribe(addr: SocketAddr) -> Client {
    let Ok((client, _)) = connect_async(format!("ws://{addr}/")).await else {
        panic!("websocket connect failed");
    };
    client
}

async fn post_webhook(addr: SocketAddr, body: &[u8], forwarded_for: Option<&str>) -> u16 {
    let mut request = reqwest::Client::new()
        .post(format!("http://{addr}/webhook"))
        .header("Authorization", sign(body))
        .body(body.to_vec());
    if let Some(xff) = forwarded_for {
        request = request.header("X-Forwarded-For", xff);
    }
    let Ok(response) = request.send().await else {
        panic!("webhook request failed");
    };
    response.status().as_u16()
}

async fn next_frame(client: &mut Client) -> Option<String> {
    next_frame_within(client, Duration::from_millis(500)).await
}

async fn next_frame_within(client: &mut Client, limit: Duration) -> Option<String> {
    match tokio::time::timeout(limit, client.next()).await {
        Ok(Some(Ok(msg))) if msg.is_text() => msg.to_text().ok().map(str::to_string),
        _ => None,
    }
}

/// Reads until the server ends the stream. Returns `false` on timeout.
async fn closed_within(client: &mut Client, limit: Duration) -> bool {
    let drained = async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    };
    tokio::time::timeout(limit, drained).await.is_ok()
}

async fn wait_for_sessions(sessions: &SessionSupervisor, expected: usize) {
    for _ in 0..200 {
        if sessions.active() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {expected} sessions, found {}", sessions.active());
}

fn padded_event(seq: u64, padding: &str) -> WebhookEvent {
    let mut event = WebhookEvent::new("track_published");
    event.fields.insert("seq".to_string(), seq.into());
    event
        .fields
        .insert("padding".to_string(), padding.to_string().into());
    event
}

#[tokio::test]
async fn trusted_origin_event_reaches_subscriber() {
    let (addr, hub) = spawn_server(&["10.0.0.5"]).await;
    let mut client = subscribe(addr).await;
    wait_for_subscribers(&hub, 1).await;

    let body = br#"{"event":"room_started"}"#;

    assert_eq!(post_webhook(addr, body, Some("10.0.0.5")).await, 200);
    assert_eq!(
        next_frame(&mut client).await.as_deref(),
        Some(r#"{"event":"room_started"}"#)
    );

    assert_eq!(post_webhook(addr, body, Some("10.0.0.9")).await, 403);
    assert_eq!(next_frame(&mut client).await, None);
    assert_eq!(hub.published_count(), 1);
}

#[tokio::test]
async fn all_subscribers_receive_events_in_order() {
    let (addr, hub) = spawn_server(&[]).await;
    let mut first = subscribe(addr).await;
    let mut second = subscribe(addr).await;
    wait_for_subscribers(&hub, 2).await;

    let kinds = ["room_started", "participant_joined", "room_finished"];
    for kind in kinds {
        let body = format!(r#"{{"event":"{kind}"}}"#);
        assert_eq!(post_webhook(addr, body.as_bytes(), None).await, 200);
    }

    for client in [&mut first, &mut second] {
        for kind in kinds {
            let Some(frame) = next_frame(client).await else {
                panic!("missing frame for {kind}");
            };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&frame) else {
                panic!("frame is not json");
            };
            assert_eq!(value.get("event").and_then(|e| e.as_str()), Some(kind));
        }
    }
}

#[tokio::test]
async fn unsigned_webhook_is_rejected() {
    let (addr, hub) = spawn_server(&[]).await;
    let Ok(response) = reqwest::Client::new()
        .post(format!("http://{addr}/webhook"))
        .body(r#"{"event":"room_started"}"#)
        .send()
        .await
    else {
        panic!("webhook request failed");
    };
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(hub.published_count(), 0);
}

#[tokio::test]
async fn disconnect_deregisters_subscriber() {
    let (addr, hub) = spawn_server(&[]).await;
    let mut leaving = subscribe(addr).await;
    let mut staying = subscribe(addr).await;
    wait_for_subscribers(&hub, 2).await;

    let Ok(()) = leaving.close(None).await else {
        panic!("close failed");
    };
    drop(leaving);
    wait_for_subscribers(&hub, 1).await;

    assert_eq!(
        post_webhook(addr, br#"{"event":"track_published"}"#, None).await,
        200
    );
    assert_eq!(
        next_frame(&mut staying).await.as_deref(),
        Some(r#"{"event":"track_published"}"#)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_subscriber_is_closed_while_healthy_one_keeps_up() {
    let server = spawn_server_with(&[], 2, Duration::from_millis(300)).await;
    // Connects and never reads again.
    let mut stalled = subscribe(server.addr).await;
    let mut healthy = subscribe(server.addr).await;
    wait_for_subscribers(&server.hub, 2).await;
    wait_for_sessions(&server.sessions, 2).await;

    // Enough data to fill the socket buffers behind the stalled peer.
    let padding = "x".repeat(1 << 20);
    for seq in 0..32 {
        server.hub.publish(padded_event(seq, &padding)).await;
        let Some(frame) = next_frame_within(&mut healthy, Duration::from_secs(5)).await else {
            panic!("healthy subscriber missed event {seq}");
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&frame) else {
            panic!("frame is not json");
        };
        assert_eq!(
            value.get("seq").and_then(serde_json::Value::as_u64),
            Some(seq)
        );
    }

    wait_for_subscribers(&server.hub, 1).await;
    wait_for_sessions(&server.sessions, 1).await;
    assert!(
        closed_within(&mut stalled, Duration::from_secs(10)).await,
        "stalled connection was not released"
    );

    server.hub.publish(WebhookEvent::new("room_finished")).await;
    assert_eq!(
        next_frame(&mut healthy).await.as_deref(),
        Some(r#"{"event":"room_finished"}"#)
    );
}

#[tokio::test]
async fn disconnect_with_queued_events_ends_session() {
    let server = spawn_server_with(&[], 8, Duration::from_secs(1)).await;
    let mut client = subscribe(server.addr).await;
    wait_for_subscribers(&server.hub, 1).await;

    for kind in ["room_started", "participant_joined", "track_published"] {
        server.hub.publish(WebhookEvent::new(kind)).await;
    }
    let Ok(()) = client.close(None).await else {
        panic!("close failed");
    };
    drop(client);

    wait_for_subscribers(&server.hub, 0).await;
    wait_for_sessions(&server.sessions, 0).await;
}

#[tokio::test]
async fn shutdown_closes_sessions_and_waits_for_them() {
    let server = spawn_server_with(&[], 8, Duration::from_secs(1)).await;
    let mut first = subscribe(server.addr).await;
    let mut second = subscribe(server.addr).await;
    wait_for_subscribers(&server.hub, 2).await;
    wait_for_sessions(&server.sessions, 2).await;

    assert_eq!(server.hub.shutdown().await, 2);
    assert!(server.sessions.drain(Duration::from_secs(5)).await);
    assert_eq!(server.sessions.active(), 0);

    for client in [&mut first, &mut second] {
        let Ok(Some(Ok(message))) =
            tokio::time::timeout(Duration::from_secs(2), client.next()).await
        else {
            panic!("no close frame after shutdown");
        };
        assert!(matches!(message, Message::Close(_)));
    }
}
