//! Shared harness for the integration tests: a real server on a random port
//! backed by a temporary data directory.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chatdesk_server::chat::retention::RetentionSweeper;
use chatdesk_server::config::{ChatConfig, RetentionConfig};
use chatdesk_server::db::models::{Identity, Role};
use chatdesk_server::db::DbPool;
use chatdesk_server::ws::ConnectionRegistry;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    pub jwt_secret: Vec<u8>,
    pub db: DbPool,
    pub connections: Arc<ConnectionRegistry>,
    _data_dir: tempfile::TempDir,
}

/// Start the server on a random port with default chat settings.
pub async fn start_test_server() -> TestServer {
    start_test_server_with(ChatConfig::default()).await
}

pub async fn start_test_server_with(chat: ChatConfig) -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = chatdesk_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = chatdesk_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");
    let connections = Arc::new(ConnectionRegistry::new());

    let state = chatdesk_server::state::AppState {
        db: db.clone(),
        jwt_secret: jwt_secret.clone(),
        connections: connections.clone(),
        chat: Arc::new(chat),
        sweeper: Arc::new(RetentionSweeper::new(db.clone(), &RetentionConfig::default())),
    };

    let app = chatdesk_server::routes::build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        addr,
        jwt_secret,
        db,
        connections,
        _data_dir: tmp_dir,
    }
}

pub fn identity(id: &str, role: Role) -> Identity {
    Identity {
        id: id.to_string(),
        role,
        name: format!("{} name", id),
        email: format!("{}@example.com", id),
    }
}

impl TestServer {
    pub fn token(&self, who: &Identity) -> String {
        chatdesk_server::auth::jwt::issue_access_token(&self.jwt_secret, who).unwrap()
    }

    /// Record an identity as if it had already connected once.
    pub fn seed(&self, who: &Identity) {
        chatdesk_server::chat::store::upsert_identity(&self.db, who).unwrap();
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Open an authenticated socket and wait until the server registered it.
    pub async fn connect(&self, who: &Identity) -> (SplitSink<WsStream, Message>, SplitStream<WsStream>) {
        let ws_url = format!("ws://{}/ws?token={}", self.addr, self.token(who));
        let (stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .expect("Failed to connect to WebSocket");
        self.wait_registered(who).await;
        stream.split()
    }

    async fn wait_registered(&self, who: &Identity) {
        for _ in 0..100 {
            let registered = match who.role {
                Role::User => self.connections.lookup_user(&who.id).is_some(),
                Role::Admin => self
                    .connections
                    .all_admins()
                    .iter()
                    .any(|h| h.identity_id == who.id),
            };
            if registered {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("connection for {} was never registered", who.id);
    }
}

pub async fn send_event(write: &mut SplitSink<WsStream, Message>, event: Value) {
    write
        .send(Message::text(event.to_string()))
        .await
        .expect("Failed to send frame");
}

/// Next JSON event on the socket, skipping control frames.
pub async fn next_event(read: &mut SplitStream<WsStream>) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(3), read.next())
            .await
            .expect("Timed out waiting for an event")
            .expect("Stream ended")
            .expect("WebSocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("Event is not JSON");
        }
    }
}

/// Assert nothing arrives within a short window.
pub async fn assert_silent(read: &mut SplitStream<WsStream>) {
    let result = tokio::time::timeout(Duration::from_millis(300), read.next()).await;
    assert!(result.is_err(), "Expected no event, got {:?}", result);
}
