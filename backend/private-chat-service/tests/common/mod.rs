#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use private_chat_service::{
    config::Config,
    middleware::auth::JwtKeys,
    models::UserId,
    presence::{LocalPresenceRegistry, PresenceRegistry},
    repository::{InMemoryMessageRepository, MessageRepository},
    routes,
    state::AppState,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestApp {
    pub base: String,
    pub ws_base: String,
    jwt: JwtKeys,
}

/// Serve the full router on an ephemeral port with the in-memory store.
pub async fn spawn_app() -> TestApp {
    let config = Arc::new(Config::test_defaults());
    let jwt = JwtKeys::from_secret(&config.jwt_secret);
    let repository: Arc<dyn MessageRepository> = Arc::new(InMemoryMessageRepository::new());
    let presence: Arc<dyn PresenceRegistry> = Arc::new(LocalPresenceRegistry::new());
    let (state, _writer) = AppState::build(config, repository, presence);

    let app = routes::build_router(&state).with_state(state);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let base = format!("http://{}:{}", addr.ip(), addr.port());
    TestApp {
        ws_base: base.replacen("http", "ws", 1),
        base,
        jwt,
    }
}

impl TestApp {
    pub fn token(&self, user: &str) -> String {
        self.jwt.issue(&UserId::parse(user).unwrap(), 3600).unwrap()
    }

    pub async fn connect(&self, user: &str) -> Ws {
        let url = format!("{}/ws?token={}", self.ws_base, self.token(user));
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        // A reply proves the server side has registered the connection.
        send_event(&mut ws, "check-user-online", serde_json::json!({ "userId": user })).await;
        let status = expect_event(&mut ws, "user-online-status").await;
        assert_eq!(status["isOnline"], true);
        ws
    }

    pub fn get(&self, user: &str, path: &str) -> reqwest::RequestBuilder {
        reqwest::Client::new()
            .get(format!("{}{}", self.base, path))
            .bearer_auth(self.token(user))
    }

    pub fn post(&self, user: &str, path: &str) -> reqwest::RequestBuilder {
        reqwest::Client::new()
            .post(format!("{}{}", self.base, path))
            .bearer_auth(self.token(user))
    }

    pub fn put(&self, user: &str, path: &str) -> reqwest::RequestBuilder {
        reqwest::Client::new()
            .put(format!("{}{}", self.base, path))
            .bearer_auth(self.token(user))
    }

    /// `data` of a successful response.
    pub async fn data(&self, request: reqwest::RequestBuilder) -> Value {
        let resp = request.send().await.unwrap();
        assert!(resp.status().is_success(), "status {}", resp.status());
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        body["data"].clone()
    }

    /// Poll room history until it holds `len` messages; writes land
    /// asynchronously after the socket broadcast.
    pub async fn wait_for_history(&self, user: &str, room: &str, len: usize) -> Vec<Value> {
        for _ in 0..50 {
            let data = self
                .data(self.get(user, &format!("/messages/room/{room}")))
                .await;
            let messages = data.as_array().cloned().unwrap_or_default();
            if messages.len() >= len {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("history of {room} never reached {len} messages");
    }
}

pub async fn send_event(ws: &mut Ws, event: &str, data: Value) {
    let frame = serde_json::json!({ "event": event, "data": data }).to_string();
    ws.send(WsMessage::Text(frame)).await.unwrap();
}

/// Next text frame as JSON, skipping pings.
pub async fn next_event(ws: &mut Ws) -> Value {
    let wait = async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => return serde_json::from_str::<Value>(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("socket closed: {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for an event")
}

/// Skip frames until one named `name` arrives.
pub async fn expect_event(ws: &mut Ws, name: &str) -> Value {
    loop {
        let event = next_event(ws).await;
        if event["event"] == name {
            return event["data"].clone();
        }
    }
}

/// Assert nothing but pings arrives within `window`.
pub async fn assert_silent(ws: &mut Ws, window: Duration) {
    let wait = async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("socket closed: {other:?}"),
            }
        }
    };
    if let Ok(text) = tokio::time::timeout(window, wait).await {
        panic!("unexpected event {text}");
    }
}
