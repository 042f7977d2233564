//! Shared application state handed to every handler (§2 data flow:
//! Dispatcher → feature handler → Storage Gateway + Presence Registry).

use crate::config::Config;
use crate::db::Database;
use crate::identity::IdentityService;
use crate::presence::PresenceRegistry;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::frame::OutboundFrame;

/// Per-message lock table for the redpacket claim protocol (§4.7,
/// §9 "serialize claims per messageId via an in-process lock table").
/// Deliberately `dashmap` (sharded, no single-writer requirement) —
/// unrelated to the Presence Registry's single-mutex discipline.
pub type RedpacketLocks = DashMap<Uuid, Arc<AsyncMutex<()>>>;

pub struct AppState {
    pub db: Database,
    pub identity: IdentityService,
    pub presence: PresenceRegistry,
    pub config: Config,
    pub redpacket_locks: RedpacketLocks,
    pub outbound: DashMap<Uuid, UnboundedSender<OutboundFrame>>,
    connections: AtomicUsize,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        let identity = IdentityService::new(db.clone(), config.token_secret.clone());
        Self {
            db,
            identity,
            presence: PresenceRegistry::new(),
            config,
            redpacket_locks: DashMap::new(),
            outbound: DashMap::new(),
            connections: AtomicUsize::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Lock guarding read-modify-write of a single redpacket message's
    /// content blob. Callers must hold the guard across the reload →
    /// mutate → persist sequence, never across unrelated I/O.
    pub fn redpacket_lock(&self, message_id: Uuid) -> Arc<AsyncMutex<()>> {
        self.redpacket_locks.entry(message_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Push a frame to a session if it currently has a live outbound
    /// channel. Silently drops otherwise (§4.5, §4.6: broadcasts and
    /// direct pushes are both best-effort).
    pub fn push(&self, session: Uuid, frame: OutboundFrame) {
        if let Some(tx) = self.outbound.get(&session) {
            let _ = tx.send(frame);
        }
    }

    pub fn push_to_account(&self, account: &str, frame: OutboundFrame) {
        if let Some(session) = self.presence.session_for(account) {
            self.push(session, frame);
        }
    }
}
