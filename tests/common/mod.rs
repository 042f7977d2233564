//! Shared harness for end-to-end tests: builds an [`AppState`] over an
//! in-memory database and drives frames through [`dispatch::dispatch`]
//! exactly as `network::session::run` does, without a real socket.

#![allow(dead_code)]

use roleplay_hub::config::Config;
use roleplay_hub::db::Database;
use roleplay_hub::dispatch::{self, DispatchCounters};
use roleplay_hub::frame::{InboundFrame, OutboundFrame};
use roleplay_hub::handlers::Context;
use roleplay_hub::state::AppState;
use std::sync::Arc;
use uuid::Uuid;

pub async fn state() -> Arc<AppState> {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    let config = Config {
        database_url: "sqlite::memory:".into(),
        listen_port: 3000,
        token_secret: "integration-test-secret".into(),
    };
    Arc::new(AppState::new(db, config))
}

/// One simulated client: its own session id, a dedicated dispatch
/// counter, and an mpsc receiver standing in for its WebSocket.
pub struct Client {
    pub ctx: Context,
    pub inbox: tokio::sync::mpsc::UnboundedReceiver<OutboundFrame>,
    counters: DispatchCounters,
}

impl Client {
    pub fn new(app: Arc<AppState>) -> Self {
        let session = Uuid::new_v4();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        app.outbound.insert(session, tx);
        app.presence.attach(session);
        Self { ctx: Context::new(app, session), inbox: rx, counters: DispatchCounters::default() }
    }

    pub async fn send(&self, frame: InboundFrame) -> OutboundFrame {
        dispatch::dispatch(&self.ctx, &self.counters, frame).await
    }

    /// Drain one pushed frame without blocking forever if none arrives.
    pub async fn try_recv_push(&mut self) -> Option<OutboundFrame> {
        tokio::time::timeout(std::time::Duration::from_millis(50), self.inbox.recv()).await.ok().flatten()
    }
}

/// Register, authenticate, and bring one character online — the setup
/// every scenario needs before it can exercise direct/group/redpacket
/// behavior.
pub async fn online_client(app: &Arc<AppState>, username: &str, account: &str, nickname: &str) -> Client {
    let client = Client::new(app.clone());

    let reg = client
        .send(InboundFrame::Register { username: username.to_string(), email: None, password: "password1".to_string() })
        .await;
    let token = match reg {
        OutboundFrame::RegisterSuccess { token, .. } => token,
        other => panic!("expected RegisterSuccess, got {other:?}"),
    };

    let auth = client.send(InboundFrame::Auth { token }).await;
    assert!(matches!(auth, OutboundFrame::AuthSuccess { .. }), "auth failed: {auth:?}");

    let online = client
        .send(InboundFrame::GoOnline {
            account: account.to_string(),
            nickname: nickname.to_string(),
            avatar: None,
            bio: None,
        })
        .await;
    assert!(matches!(online, OutboundFrame::CharacterOnline { .. }), "go_online failed: {online:?}");

    client
}
