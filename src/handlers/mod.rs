//! Feature handlers invoked by the dispatcher (§4.4-§4.7). Each handler
//! receives a [`Context`] bound to one session and the already-typed
//! payload extracted from the matching [`crate::frame::InboundFrame`]
//! variant, and returns the single ack frame due back to the caller.
//! Any additional pushes to other sessions happen inline via
//! `ctx.state.push`/`push_to_account`.

pub mod connection;
pub mod direct;
pub mod group;
pub mod redpacket;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use std::sync::Arc;
use uuid::Uuid;

pub struct Context {
    pub state: Arc<AppState>,
    pub session: Uuid,
}

impl Context {
    pub fn new(state: Arc<AppState>, session: Uuid) -> Self {
        Self { state, session }
    }

    /// Enforce that this session currently owns `account` in the
    /// Presence Registry (§4.3) — the ownership check required before
    /// most direct-message and group operations.
    pub fn require_owner(&self, account: &str) -> AppResult<()> {
        if self.state.presence.is_owner(self.session, account) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("session does not own {account}")))
        }
    }

    pub fn require_authenticated(&self) -> AppResult<String> {
        self.state
            .presence
            .user_of(self.session)
            .ok_or(AppError::AuthRequired)
    }

    pub fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
