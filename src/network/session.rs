//! Per-session event loop (§4.4): a `tokio::select!` over the socket
//! read half, the outbound mpsc channel, the 30s heartbeat tick, and the
//! shutdown broadcast — the same shape as the teacher's
//! `network/connection/event_loop.rs`, minus IRC-specific flood control.

use crate::dispatch::{self, DispatchCounters};
use crate::frame::{InboundFrame, OutboundFrame};
use crate::handlers::Context;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

fn extract_type(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str().map(str::to_string)))
        .unwrap_or_else(|| "<unparseable>".to_string())
}

pub async fn run(socket: WebSocket, app: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let session = Uuid::new_v4();
    app.presence.attach(session);
    app.connection_opened();
    info!(session = %session, "session accepted");

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
    app.outbound.insert(session, tx);

    let ctx = Context::new(app.clone(), session);
    let counters = DispatchCounters::default();

    let (mut sink, mut stream) = socket.split();
    let mut liveness = true;
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        liveness = true;
                        match serde_json::from_str::<InboundFrame>(&text) {
                            Ok(frame) => {
                                let response = dispatch::dispatch(&ctx, &counters, frame).await;
                                if send(&mut sink, &response).await.is_err() {
                                    break;
                                }
                            }
                            Err(_) => {
                                let raw_type = extract_type(&text);
                                let response = dispatch::unknown_frame_error(&raw_type);
                                if send(&mut sink, &response).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        liveness = true;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(session = %session, error = %e, "transport read error");
                        break;
                    }
                    _ => {}
                }
            }
            outgoing = rx.recv() => {
                match outgoing {
                    Some(frame) => {
                        if send(&mut sink, &frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = heartbeat.tick() => {
                if !liveness {
                    info!(session = %session, "heartbeat timeout, closing session");
                    break;
                }
                liveness = false;
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            _ = shutdown.recv() => {
                break;
            }
        }
    }

    cleanup(&app, session).await;
}

async fn send(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: &OutboundFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).expect("outbound frames always serialize");
    sink.send(Message::Text(text)).await
}

async fn cleanup(app: &Arc<AppState>, session: Uuid) {
    app.outbound.remove(&session);
    let accounts = app.presence.detach(session);
    let now = chrono::Utc::now().timestamp_millis();
    for account in accounts {
        if let Err(e) = app.db.characters().bring_offline(&account, now).await {
            warn!(session = %session, account = %account, error = %e, "failed to persist offline state on disconnect");
        }
        app.push_to_account(&account, OutboundFrame::CharacterOffline { account });
    }
    app.connection_closed();
    info!(session = %session, "session closed");
}
