//! Redpacket claim handler (§4.7): wraps [`crate::redpacket::RedpacketContent`]
//! with membership checks, the per-message lock table, and the
//! broadcast of the claim outcome.

use super::Context;
use crate::error::{AppError, AppResult};
use crate::frame::OutboundFrame;
use crate::redpacket::RedpacketContent;
use uuid::Uuid;

pub async fn claim_group_redpacket(
    ctx: &Context,
    group_id: &str,
    message_id: &str,
    account: &str,
) -> AppResult<OutboundFrame> {
    ctx.require_owner(account)?;
    if !ctx.state.db.groups().is_member(group_id, account).await? {
        return Err(AppError::Forbidden("not a group member".into()));
    }

    let lock_key = Uuid::parse_str(message_id).map_err(|_| AppError::Invalid("malformed message id".into()))?;
    let lock = ctx.state.redpacket_lock(lock_key);
    let _guard = lock.lock().await;

    // Reload-mutate-persist happens entirely under the per-message lock
    // (§4.7 concurrency requirement) — no other claim on this message can
    // interleave between reload and persist.
    let row = ctx
        .state
        .db
        .groups()
        .find_message(group_id, message_id)
        .await?
        .ok_or_else(|| AppError::NotFound("redpacket message not found".into()))?;

    let mut redpacket = RedpacketContent::parse(&row.content)?;
    let amount = redpacket.claim(account)?;
    ctx.state.db.groups().update_message_content(group_id, message_id, &redpacket.to_json()).await?;

    let claimed_count = redpacket.claimed.len() as i64;
    let remaining = redpacket.count - claimed_count;

    let system_note = format!("{account} claimed ¥{amount:.2}");
    let system_id = Uuid::new_v4().to_string();
    let now = ctx.now_millis();
    ctx.state
        .db
        .groups()
        .insert_message(&system_id, group_id, "system", "system", "system", None, &system_note, "system", now)
        .await?;

    let members = ctx.state.db.groups().members(group_id).await?;
    let state_update = OutboundFrame::RedpacketClaimed {
        group_id: group_id.to_string(),
        message_id: message_id.to_string(),
        account: account.to_string(),
        amount: format!("{amount:.2}"),
        claimed_count,
        count: redpacket.count,
    };
    for m in &members {
        ctx.state.push_to_account(&m.account, state_update.clone());
        ctx.state.push_to_account(
            &m.account,
            OutboundFrame::GroupMessage {
                message: crate::frame::GroupMessageView {
                    message_id: system_id.clone(),
                    group_id: group_id.to_string(),
                    sender_type: "system".to_string(),
                    sender_account: "system".to_string(),
                    sender_name: "system".to_string(),
                    sender_avatar: None,
                    character_name: None,
                    content: system_note.clone(),
                    msg_type: "system".to_string(),
                    created_at: now,
                },
            },
        );
    }

    let _ = remaining;
    Ok(state_update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::handlers::{connection, group};
    use crate::redpacket::RedpacketType;
    use crate::state::AppState;
    use std::sync::Arc;

    async fn state() -> Arc<AppState> {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let config = Config { database_url: "sqlite::memory:".into(), listen_port: 3000, token_secret: "s".into() };
        Arc::new(AppState::new(db, config))
    }

    async fn online(state: &Arc<AppState>, username: &str, account: &str, nickname: &str) -> Context {
        let session = Uuid::new_v4();
        let ctx = Context::new(state.clone(), session);
        let reg = connection::register(&ctx, username, None, "password1").await.unwrap();
        let token = match reg { OutboundFrame::RegisterSuccess { token, .. } => token, _ => unreachable!() };
        connection::auth(&ctx, &token).await.unwrap();
        connection::go_online(&ctx, account, nickname, None, None).await.unwrap();
        ctx
    }

    #[tokio::test]
    async fn lucky_redpacket_claimed_by_three_conserves_and_exhausts() {
        let state = state().await;
        let alice = online(&state, "alice", "a_wx", "Alice").await;
        let bob = online(&state, "bob", "b_wx", "Bob").await;
        let carol = online(&state, "carol", "c_wx", "Carol").await;

        group::create_online_group(&alice, "a_wx", "Tavern", None, "Knight", None, None, &[]).await.unwrap();
        let group_id = state.db.groups().groups_for_account("a_wx").await.unwrap()[0].id.clone();
        group::join_online_group(&bob, &group_id, "b_wx", "Mage", None, None).await.unwrap();
        group::join_online_group(&carol, &group_id, "c_wx", "Rogue", None, None).await.unwrap();

        let rp = RedpacketContent::new(1.0, 3, RedpacketType::Lucky);
        let message_id = uuid::Uuid::new_v4().to_string();
        state
            .db
            .groups()
            .insert_message(&message_id, &group_id, "system", "system", "system", None, &rp.to_json(), "redpacket", 0)
            .await
            .unwrap();

        let mut total = 0.0;
        for (ctx, account) in [(&alice, "a_wx"), (&bob, "b_wx"), (&carol, "c_wx")] {
            let frame = claim_group_redpacket(ctx, &group_id, &message_id, account).await.unwrap();
            match frame {
                OutboundFrame::RedpacketClaimed { amount, .. } => total += amount.parse::<f64>().unwrap(),
                _ => unreachable!(),
            }
        }
        assert!(total <= 1.0 + 1e-9);
        assert!(total >= 0.97);

        let dave = online(&state, "dave", "d_wx", "Dave").await;
        group::join_online_group(&dave, &group_id, "d_wx", "Bard", None, None).await.unwrap();
        let err = claim_group_redpacket(&dave, &group_id, &message_id, "d_wx").await.unwrap_err();
        assert!(matches!(err, AppError::Exhausted));
    }

    #[tokio::test]
    async fn double_claim_by_same_account_fails() {
        let state = state().await;
        let alice = online(&state, "alice", "a_wx", "Alice").await;
        group::create_online_group(&alice, "a_wx", "Tavern", None, "Knight", None, None, &[]).await.unwrap();
        let group_id = state.db.groups().groups_for_account("a_wx").await.unwrap()[0].id.clone();

        let rp = RedpacketContent::new(10.0, 5, RedpacketType::Average);
        let message_id = uuid::Uuid::new_v4().to_string();
        state
            .db
            .groups()
            .insert_message(&message_id, &group_id, "system", "system", "system", None, &rp.to_json(), "redpacket", 0)
            .await
            .unwrap();

        claim_group_redpacket(&alice, &group_id, &message_id, "a_wx").await.unwrap();
        let err = claim_group_redpacket(&alice, &group_id, &message_id, "a_wx").await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyClaimed));
    }
}
