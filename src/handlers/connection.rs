//! Connection lifecycle and identity/presence handlers (§4.2, §4.3):
//! register, login, auth, logout, go_online/go_offline, character
//! registration and lookup, and the liveness `ping`/`pong` pair.

use super::Context;
use crate::db::DbError;
use crate::error::{AppError, AppResult};
use crate::frame::{CharacterSummary, OutboundFrame};
use crate::presence::BringOnlineOutcome;
use tracing::info;
use uuid::Uuid;

pub async fn register(
    ctx: &Context,
    username: &str,
    email: Option<&str>,
    password: &str,
) -> AppResult<OutboundFrame> {
    let user = ctx.state.identity.register(username, email, password).await?;
    Ok(OutboundFrame::RegisterSuccess {
        user_id: user.user_id,
        username: user.username,
        token: user.token,
    })
}

pub async fn login(ctx: &Context, username: &str, password: &str) -> AppResult<OutboundFrame> {
    let user = ctx.state.identity.login(username, password).await?;
    Ok(OutboundFrame::LoginSuccess {
        user_id: user.user_id,
        username: user.username,
        token: user.token,
    })
}

/// Verifies the token, binds the session to the user, and restores any
/// characters left online at last disconnect (§4.2, §4.3).
pub async fn auth(ctx: &Context, token: &str) -> AppResult<OutboundFrame> {
    let user = match ctx.state.identity.authenticate(token).await {
        Ok(u) => u,
        Err(e) => return Ok(OutboundFrame::AuthFailed { message: e.to_string() }),
    };

    ctx.state.presence.bind_user(ctx.session, &user.id);

    let online = ctx.state.db.characters().find_online_for_user(&user.id).await?;
    let accounts: Vec<String> = online.iter().map(|c| c.account.clone()).collect();
    ctx.state.presence.restore(ctx.session, &user.id, &accounts);

    info!(session = %ctx.session, user_id = %user.id, restored = accounts.len(), "session authenticated");

    Ok(OutboundFrame::AuthSuccess {
        user_id: user.id,
        username: user.username,
        restored_characters: accounts,
    })
}

pub async fn logout(ctx: &Context) -> AppResult<OutboundFrame> {
    let now = ctx.now_millis();
    for account in ctx.state.presence.detach(ctx.session) {
        ctx.state.db.characters().bring_offline(&account, now).await?;
        ctx.state.push_to_account(&account, OutboundFrame::CharacterOffline { account });
    }
    Ok(OutboundFrame::Ack)
}

pub async fn register_character(
    ctx: &Context,
    account: &str,
    nickname: &str,
    avatar: Option<&str>,
    bio: Option<&str>,
) -> AppResult<OutboundFrame> {
    let user_id = ctx.require_authenticated()?;
    let now = ctx.now_millis();
    let character = ctx
        .state
        .db
        .characters()
        .create(&Uuid::new_v4().to_string(), &user_id, account, nickname, avatar, bio, now)
        .await
        .map_err(|e| match e {
            DbError::AccountTaken(a) => AppError::Conflict(format!("account {a} already in use")),
            other => other.into(),
        })?;

    Ok(OutboundFrame::SearchResult {
        result: Some(CharacterSummary {
            account: character.account,
            nickname: character.nickname,
            avatar: character.avatar,
            is_online: false,
        }),
    })
}

/// Bring-online per §4.3: upserts the Character row and binds the
/// account in the Presence Registry, honoring the handoff and
/// cross-user-ownership rules.
pub async fn go_online(
    ctx: &Context,
    account: &str,
    nickname: &str,
    avatar: Option<&str>,
    bio: Option<&str>,
) -> AppResult<OutboundFrame> {
    let user_id = ctx.require_authenticated()?;
    let now = ctx.now_millis();

    let existing = ctx.state.db.characters().find_by_account(account).await?;
    match &existing {
        Some(c) if c.user_id != user_id => {
            return Err(AppError::Forbidden(format!("account {account} is owned by another user")));
        }
        Some(_) => {
            ctx.state.db.characters().bring_online(account, nickname, avatar, bio, now).await?;
        }
        None => {
            ctx.state
                .db
                .characters()
                .create(&Uuid::new_v4().to_string(), &user_id, account, nickname, avatar, bio, now)
                .await?;
            ctx.state.db.characters().bring_online(account, nickname, avatar, bio, now).await?;
        }
    }

    let outcome = ctx
        .state
        .presence
        .bring_online(ctx.session, account, &user_id)
        .map_err(|_| AppError::Forbidden(format!("account {account} is owned by another user")))?;

    if let BringOnlineOutcome::HandoffFrom(_old_session) = outcome {
        info!(account = %account, "account handed off to a new session");
    }

    deliver_pending(ctx, account).await?;

    ctx.state.push_to_account(
        account,
        OutboundFrame::CharacterOnline { account: account.to_string(), nickname: nickname.to_string(), avatar: avatar.map(str::to_string) },
    );

    Ok(OutboundFrame::CharacterOnline {
        account: account.to_string(),
        nickname: nickname.to_string(),
        avatar: avatar.map(str::to_string),
    })
}

pub async fn go_offline(ctx: &Context, account: &str) -> AppResult<OutboundFrame> {
    ctx.require_owner(account)?;
    let now = ctx.now_millis();
    ctx.state.presence.bring_offline(ctx.session, account);
    ctx.state.db.characters().bring_offline(account, now).await?;
    Ok(OutboundFrame::CharacterOffline { account: account.to_string() })
}

pub async fn get_online_characters(ctx: &Context) -> AppResult<OutboundFrame> {
    let user_id = ctx.require_authenticated()?;
    let characters = ctx.state.db.characters().find_for_user(&user_id).await?;
    let characters = characters
        .into_iter()
        .map(|c| CharacterSummary {
            is_online: ctx.state.presence.session_for(&c.account).is_some(),
            account: c.account,
            nickname: c.nickname,
            avatar: c.avatar,
        })
        .collect();
    Ok(OutboundFrame::OnlineCharacters { characters })
}

pub async fn ping(_ctx: &Context) -> AppResult<OutboundFrame> {
    Ok(OutboundFrame::Pong)
}

/// Push every undelivered offline message, then mark the batch
/// delivered. Also pushes any pending friend requests. Idempotent per
/// §4.5: a failure between push and mark just means the next
/// bring-online re-delivers, and receivers tolerate duplicates.
async fn deliver_pending(ctx: &Context, account: &str) -> AppResult<()> {
    let pending = ctx.state.db.offline().undelivered_for(account).await?;
    if !pending.is_empty() {
        let mut ids = Vec::with_capacity(pending.len());
        for m in &pending {
            ctx.state.push_to_account(
                account,
                OutboundFrame::Message {
                    message_id: m.id.clone(),
                    from_account: m.from_account.clone(),
                    to_account: m.to_account.clone(),
                    content: m.content.clone(),
                    created_at: m.created_at,
                },
            );
            ids.push(m.id.clone());
        }
        ctx.state.db.offline().mark_delivered(&ids).await?;
    }

    let friend_requests = ctx.state.db.friends().pending_for_account(account).await?;
    if !friend_requests.is_empty() {
        let requests = friend_requests
            .into_iter()
            .map(|r| crate::frame::FriendRequestView {
                request_id: r.id,
                from_account: r.from_account,
                to_account: r.to_account,
                message: r.message,
                created_at: r.created_at,
            })
            .collect();
        ctx.state.push_to_account(account, OutboundFrame::PendingFriendRequests { requests });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::state::AppState;
    use std::sync::Arc;

    async fn test_state() -> Arc<AppState> {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let config = Config {
            database_url: "sqlite::memory:".into(),
            listen_port: 3000,
            token_secret: "secret".into(),
        };
        Arc::new(AppState::new(db, config))
    }

    #[tokio::test]
    async fn register_then_auth_binds_session() {
        let state = test_state().await;
        let session = Uuid::new_v4();
        let ctx = Context::new(state.clone(), session);
        let reg = register(&ctx, "alice", None, "password1").await.unwrap();
        let token = match reg {
            OutboundFrame::RegisterSuccess { token, .. } => token,
            _ => panic!("wrong frame"),
        };

        auth(&ctx, &token).await.unwrap();
        assert!(ctx.require_authenticated().is_ok());
    }

    #[tokio::test]
    async fn go_online_by_different_user_is_forbidden() {
        let state = test_state().await;
        let s1 = Uuid::new_v4();
        let ctx1 = Context::new(state.clone(), s1);
        let reg1 = register(&ctx1, "alice", None, "password1").await.unwrap();
        let token1 = match reg1 {
            OutboundFrame::RegisterSuccess { token, .. } => token,
            _ => unreachable!(),
        };
        auth(&ctx1, &token1).await.unwrap();
        go_online(&ctx1, "a_wx", "Alice", None, None).await.unwrap();

        let s2 = Uuid::new_v4();
        let ctx2 = Context::new(state.clone(), s2);
        let reg2 = register(&ctx2, "bob", None, "password1").await.unwrap();
        let token2 = match reg2 {
            OutboundFrame::RegisterSuccess { token, .. } => token,
            _ => unreachable!(),
        };
        auth(&ctx2, &token2).await.unwrap();
        let err = go_online(&ctx2, "a_wx", "Bob", None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
