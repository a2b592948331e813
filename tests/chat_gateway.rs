use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use moviemate::chat::{
    ChatGateway, ConnectivityStatus, Role, GENERIC_FAILURE, GREETING, NETWORK_MESSAGE,
    TIMEOUT_MESSAGE,
};
use moviemate::error::RequestFailure;
use moviemate::request::{RequestTarget, Response, Transport, TransportError};
use moviemate::Executor;

async fn chat(Json(body): Json<Value>) -> impl IntoResponse {
    let message = body.get("message").and_then(Value::as_str).unwrap_or("");
    match message {
        "" => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Message is required" })),
        )
            .into_response(),
        "explode" => (StatusCode::INTERNAL_SERVER_ERROR, "upstream crashed").into_response(),
        "quiet" => Json(json!({ "reply": "" })).into_response(),
        "bad" => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": "Model unavailable" })),
        )
            .into_response(),
        text => Json(json!({ "reply": format!("You said: {text}") })).into_response(),
    }
}

async fn start_server(healthy: bool) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let health = if healthy {
        get(|| async { Json(json!({ "status": "ok", "provider": "gemini" })) })
    } else {
        get(|| async { StatusCode::SERVICE_UNAVAILABLE })
    };
    let app = Router::new()
        .route("/health", health)
        .route("/api/chat", post(chat));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

fn gateway(addr: SocketAddr) -> ChatGateway {
    ChatGateway::new(Executor::reqwest().unwrap(), format!("http://{addr}/"))
}

/// Transport that never answers.
struct Silent;

#[async_trait::async_trait]
impl Transport for Silent {
    async fn send(&self, _target: &RequestTarget) -> Result<Response, TransportError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn probe_reports_online_with_provider() {
    let (addr, _handle) = start_server(true).await;
    let mut gateway = gateway(addr);
    assert_eq!(gateway.status(), &ConnectivityStatus::Unknown);

    let status = gateway.probe(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        status,
        ConnectivityStatus::Online {
            provider: Some("gemini".to_string())
        }
    );
    assert!(gateway.status().is_online());
}

#[tokio::test]
async fn probe_reports_offline_on_error_status() {
    let (addr, _handle) = start_server(false).await;
    let mut gateway = gateway(addr);
    let status = gateway.probe(&CancellationToken::new()).await.unwrap();
    assert_eq!(status, ConnectivityStatus::Offline);
}

#[tokio::test]
async fn probe_reports_offline_when_nothing_listens() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut gateway = gateway(addr);
    let status = gateway.probe(&CancellationToken::new()).await.unwrap();
    assert_eq!(status, ConnectivityStatus::Offline);
}

#[tokio::test]
async fn replies_and_errors_land_in_the_transcript() {
    let (addr, _handle) = start_server(true).await;
    let mut gateway = gateway(addr);
    let cancel = CancellationToken::new();

    let reply = gateway.send("something funny", &cancel).await.unwrap();
    assert_eq!(reply, "You said: something funny");
    // Error statuses with a readable body still count as a reply.
    let reply = gateway.send("bad", &cancel).await.unwrap();
    assert_eq!(reply, "Model unavailable");
    let reply = gateway.send("explode", &cancel).await.unwrap();
    assert_eq!(reply, GENERIC_FAILURE);
    let reply = gateway.send("quiet", &cancel).await.unwrap();
    assert_eq!(reply, GENERIC_FAILURE);

    let transcript = gateway.transcript();
    assert_eq!(transcript.len(), 9);
    assert_eq!(transcript[0].role, Role::Assistant);
    assert_eq!(transcript[0].content, GREETING);
    let roles: Vec<Role> = transcript[1..].iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [Role::User, Role::Assistant].repeat(4),
        "user and assistant turns alternate"
    );
    assert_eq!(transcript[3].content, "bad");
}

#[tokio::test]
async fn blank_message_is_not_sent() {
    let (addr, _handle) = start_server(true).await;
    let mut gateway = gateway(addr);
    let err = gateway
        .send("   ", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RequestFailure::InvalidTarget { .. }));
    assert_eq!(gateway.transcript().len(), 1);
}

#[tokio::test]
async fn unreachable_backend_shows_network_message() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut gateway = gateway(addr);
    let err = gateway
        .send("hello", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RequestFailure::NetworkError { .. }));
    let last = gateway.transcript().last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, NETWORK_MESSAGE);
}

#[tokio::test(start_paused = true)]
async fn slow_reply_times_out_after_fifteen_seconds() {
    let mut gateway = ChatGateway::new(Executor::new(Arc::new(Silent)), "http://chat.test");
    let started = tokio::time::Instant::now();
    let err = gateway
        .send("anyone there?", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, RequestFailure::Timeout { deadline_ms: 15_000 });
    let waited = started.elapsed().as_millis();
    assert!((15_000..15_100).contains(&waited), "waited {waited} ms");
    let transcript = gateway.transcript();
    assert_eq!(transcript[1].content, "anyone there?");
    assert_eq!(transcript[2].content, TIMEOUT_MESSAGE);
    assert_ne!(TIMEOUT_MESSAGE, NETWORK_MESSAGE);
}

#[tokio::test(start_paused = true)]
async fn cancelled_send_adds_no_reply() {
    let mut gateway = ChatGateway::new(Executor::new(Arc::new(Silent)), "http://chat.test");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = gateway.send("never mind", &cancel).await.unwrap_err();
    assert_eq!(err, RequestFailure::Cancelled);
    let transcript = gateway.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].role, Role::User);

    let status = gateway.probe(&cancel).await;
    assert_eq!(status, Err(RequestFailure::Cancelled));
    assert_eq!(gateway.status(), &ConnectivityStatus::Unknown);
}
