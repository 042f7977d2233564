//! Presence Registry (§4.3): the sole authority on "is this account
//! reachable now?". Two maps, one mutex — the handoff case (new session
//! claims an account already online under the same user) must remove the
//! old binding and install the new one in the same critical section.
//!
//! The database's `is_online` column is a persisted last-known snapshot
//! and must never be consulted for routing while a session holds the
//! account here.

use std::collections::{HashMap, HashSet};
use parking_lot::Mutex;
use uuid::Uuid;

pub type SessionId = Uuid;

#[derive(Debug, Default, Clone)]
struct SessionEntry {
    user_id: Option<String>,
    owned: HashSet<String>,
}

#[derive(Debug, Default)]
struct State {
    by_session: HashMap<SessionId, SessionEntry>,
    by_account: HashMap<String, SessionId>,
}

/// Outcome of [`PresenceRegistry::bring_online`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringOnlineOutcome {
    /// No prior session held this account.
    Fresh,
    /// `account` was taken over from another live session of the same
    /// user; the caller should treat this as an implicit handoff.
    HandoffFrom(SessionId),
}

/// An account is owned by a different user than the caller's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forbidden;

pub struct PresenceRegistry {
    state: Mutex<State>,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }

    /// Idempotent: calling twice for the same session is a no-op.
    pub fn attach(&self, session: SessionId) {
        self.state.lock().by_session.entry(session).or_default();
    }

    pub fn bind_user(&self, session: SessionId, user_id: &str) {
        let mut state = self.state.lock();
        state.by_session.entry(session).or_default().user_id = Some(user_id.to_string());
    }

    /// Registers `account` as owned by `session`. Takes over from any
    /// other live session owned by the *same* user; rejects with
    /// `Forbidden` if another user currently owns the account's session
    /// binding under a different `user_id`.
    pub fn bring_online(
        &self,
        session: SessionId,
        account: &str,
        user_id: &str,
    ) -> Result<BringOnlineOutcome, Forbidden> {
        let mut state = self.state.lock();

        let outcome = if let Some(&existing_session) = state.by_account.get(account) {
            if existing_session == session {
                BringOnlineOutcome::Fresh
            } else {
                let existing_user = state
                    .by_session
                    .get(&existing_session)
                    .and_then(|e| e.user_id.as_deref());
                if existing_user != Some(user_id) {
                    return Err(Forbidden);
                }
                if let Some(entry) = state.by_session.get_mut(&existing_session) {
                    entry.owned.remove(account);
                }
                BringOnlineOutcome::HandoffFrom(existing_session)
            }
        } else {
            BringOnlineOutcome::Fresh
        };

        state.by_account.insert(account.to_string(), session);
        let entry = state.by_session.entry(session).or_default();
        entry.user_id = Some(user_id.to_string());
        entry.owned.insert(account.to_string());

        Ok(outcome)
    }

    pub fn bring_offline(&self, session: SessionId, account: &str) {
        let mut state = self.state.lock();
        if state.by_account.get(account) == Some(&session) {
            state.by_account.remove(account);
        }
        if let Some(entry) = state.by_session.get_mut(&session) {
            entry.owned.remove(account);
        }
    }

    /// Re-establish `byAccount` bindings for `session` over a set of
    /// accounts the caller has already confirmed are `is_online = 1` in
    /// storage. Used on `auth` reconnect (§4.2/§4.3).
    pub fn restore(&self, session: SessionId, user_id: &str, accounts: &[String]) {
        let mut state = self.state.lock();
        for account in accounts {
            if let Some(&existing_session) = state.by_account.get(account) {
                if existing_session != session {
                    if let Some(entry) = state.by_session.get_mut(&existing_session) {
                        entry.owned.remove(account);
                    }
                }
            }
        }

        let entry = state.by_session.entry(session).or_default();
        entry.user_id = Some(user_id.to_string());
        for account in accounts {
            entry.owned.insert(account.clone());
        }
        for account in accounts {
            state.by_account.insert(account.clone(), session);
        }
    }

    /// Removes every binding owned by `session`, returning the accounts
    /// that were online so the caller can persist `is_online = 0` for
    /// each.
    pub fn detach(&self, session: SessionId) -> Vec<String> {
        let mut state = self.state.lock();
        let Some(entry) = state.by_session.remove(&session) else {
            return Vec::new();
        };
        for account in &entry.owned {
            if state.by_account.get(account) == Some(&session) {
                state.by_account.remove(account);
            }
        }
        entry.owned.into_iter().collect()
    }

    /// The session currently routing for `account`, if any.
    pub fn session_for(&self, account: &str) -> Option<SessionId> {
        self.state.lock().by_account.get(account).copied()
    }

    pub fn is_owner(&self, session: SessionId, account: &str) -> bool {
        self.state
            .lock()
            .by_session
            .get(&session)
            .map(|e| e.owned.contains(account))
            .unwrap_or(false)
    }

    pub fn user_of(&self, session: SessionId) -> Option<String> {
        self.state.lock().by_session.get(&session).and_then(|e| e.user_id.clone())
    }
}
