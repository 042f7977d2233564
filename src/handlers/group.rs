//! Group chat: lifecycle, membership personas, broadcast, typing
//! indicators, and history retrieval (§4.6).

use super::Context;
use crate::error::{AppError, AppResult};
use crate::frame::{GroupMemberView, GroupMessageView, GroupSummary, HistoryMode, OutboundFrame};
use uuid::Uuid;

fn member_view(m: crate::db::GroupMemberRecord) -> GroupMemberView {
    GroupMemberView {
        account: m.account,
        character_name: m.character_name,
        character_avatar: m.character_avatar,
        character_desc: m.character_desc,
        joined_at: m.joined_at,
    }
}

fn group_view(g: crate::db::GroupRecord) -> GroupSummary {
    GroupSummary { group_id: g.id, name: g.name, avatar: g.avatar, creator_account: g.creator_account, created_at: g.created_at }
}

async fn message_view(ctx: &Context, m: crate::db::GroupMessageRecord) -> AppResult<GroupMessageView> {
    let (sender_avatar, character_name) = if m.sender_type == "character" {
        let member = ctx.state.db.groups().member(&m.group_id, &m.sender_account).await?;
        (member.and_then(|mem| mem.character_avatar), m.character_name.clone())
    } else {
        let character = ctx.state.db.characters().find_by_account(&m.sender_account).await?;
        (character.and_then(|c| c.avatar), m.character_name.clone())
    };

    Ok(GroupMessageView {
        message_id: m.id,
        group_id: m.group_id,
        sender_type: m.sender_type,
        sender_account: m.sender_account,
        sender_name: m.sender_name,
        sender_avatar,
        character_name,
        content: m.content,
        msg_type: m.msg_type,
        created_at: m.created_at,
    })
}

pub async fn create_online_group(
    ctx: &Context,
    creator_account: &str,
    name: &str,
    avatar: Option<&str>,
    persona_name: &str,
    persona_avatar: Option<&str>,
    persona_desc: Option<&str>,
    invite_accounts: &[String],
) -> AppResult<OutboundFrame> {
    ctx.require_owner(creator_account)?;

    let now = ctx.now_millis();
    let group_id = Uuid::new_v4().to_string();
    let group = ctx
        .state
        .db
        .groups()
        .create_online_group(&group_id, name, avatar, creator_account, persona_name, persona_avatar, persona_desc, now)
        .await?;

    for invitee in invite_accounts {
        ctx.state.push_to_account(
            invitee,
            OutboundFrame::GroupInvite {
                group_id: group.id.clone(),
                name: group.name.clone(),
                inviter_account: creator_account.to_string(),
            },
        );
    }

    let members = ctx.state.db.groups().members(&group.id).await?.into_iter().map(member_view).collect();
    Ok(OutboundFrame::OnlineGroupCreated { group: group_view(group), members })
}

pub async fn invite_to_group(
    ctx: &Context,
    group_id: &str,
    inviter_account: &str,
    invitee_account: &str,
) -> AppResult<OutboundFrame> {
    ctx.require_owner(inviter_account)?;
    if !ctx.state.db.groups().is_member(group_id, inviter_account).await? {
        return Err(AppError::Forbidden("not a group member".into()));
    }
    let group = ctx
        .state
        .db
        .groups()
        .find_group(group_id)
        .await?
        .ok_or_else(|| AppError::NotFound("group not found".into()))?;

    ctx.state.push_to_account(
        invitee_account,
        OutboundFrame::GroupInvite { group_id: group.id.clone(), name: group.name.clone(), inviter_account: inviter_account.to_string() },
    );

    Ok(OutboundFrame::Ack)
}

pub async fn join_online_group(
    ctx: &Context,
    group_id: &str,
    account: &str,
    persona_name: &str,
    persona_avatar: Option<&str>,
    persona_desc: Option<&str>,
) -> AppResult<OutboundFrame> {
    ctx.require_owner(account)?;
    let group = ctx
        .state
        .db
        .groups()
        .find_group(group_id)
        .await?
        .ok_or_else(|| AppError::NotFound("group not found".into()))?;

    let now = ctx.now_millis();
    ctx.state.db.groups().upsert_member(group_id, account, persona_name, persona_avatar, persona_desc, now).await?;

    let members = ctx.state.db.groups().members(group_id).await?;
    let joined_view = GroupMemberView {
        account: account.to_string(),
        character_name: Some(persona_name.to_string()),
        character_avatar: persona_avatar.map(str::to_string),
        character_desc: persona_desc.map(str::to_string),
        joined_at: now,
    };
    for member in &members {
        if member.account != account {
            ctx.state.push_to_account(&member.account, OutboundFrame::GroupMemberJoined { group_id: group_id.to_string(), member: joined_view.clone() });
        }
    }

    Ok(OutboundFrame::OnlineGroupJoined {
        group: group_view(group),
        members: members.into_iter().map(member_view).collect(),
    })
}

pub async fn get_online_groups(ctx: &Context, account: &str) -> AppResult<OutboundFrame> {
    ctx.require_owner(account)?;
    let groups = ctx.state.db.groups().groups_for_account(account).await?.into_iter().map(group_view).collect();
    Ok(OutboundFrame::OnlineGroupsList { groups })
}

pub async fn get_group_members(ctx: &Context, group_id: &str, account: &str) -> AppResult<OutboundFrame> {
    ctx.require_owner(account)?;
    if !ctx.state.db.groups().is_member(group_id, account).await? {
        return Err(AppError::Forbidden("not a group member".into()));
    }
    let members = ctx.state.db.groups().members(group_id).await?.into_iter().map(member_view).collect();
    Ok(OutboundFrame::GroupMembers { group_id: group_id.to_string(), members })
}

pub async fn get_group_messages(
    ctx: &Context,
    group_id: &str,
    account: &str,
    mode: &HistoryMode,
    since: Option<i64>,
    limit: Option<i64>,
) -> AppResult<OutboundFrame> {
    ctx.require_owner(account)?;
    if !ctx.state.db.groups().is_member(group_id, account).await? {
        return Err(AppError::Forbidden("not a group member".into()));
    }

    let rows = match mode {
        HistoryMode::Since => {
            let since = since.ok_or_else(|| AppError::Invalid("since is required for since mode".into()))?;
            ctx.state.db.groups().messages_since(group_id, since).await?
        }
        HistoryMode::Recent => {
            let limit = limit.unwrap_or(50);
            ctx.state.db.groups().messages_recent(group_id, limit).await?
        }
        HistoryMode::All => ctx.state.db.groups().messages_all(group_id).await?,
    };

    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        messages.push(message_view(ctx, row).await?);
    }

    Ok(OutboundFrame::GroupMessages { group_id: group_id.to_string(), messages })
}

pub async fn send_group_message(
    ctx: &Context,
    group_id: &str,
    account: &str,
    sender_type: &str,
    character_name: Option<&str>,
    content: &str,
    msg_type: &str,
) -> AppResult<OutboundFrame> {
    ctx.require_owner(account)?;
    let member = ctx
        .state
        .db
        .groups()
        .member(group_id, account)
        .await?
        .ok_or_else(|| AppError::Forbidden("not a group member".into()))?;

    // Impersonation guard (§4.6, §8 property 6): a `character` sender's
    // claimed persona name must match their current per-group persona.
    if sender_type == "character" && character_name != member.character_name.as_deref() {
        return Err(AppError::Forbidden("character_name does not match current persona".into()));
    }

    let character = ctx.state.db.characters().find_by_account(account).await?;
    let sender_name = match sender_type {
        "character" => member.character_name.clone().unwrap_or_else(|| account.to_string()),
        _ => character.map(|c| c.nickname).unwrap_or_else(|| account.to_string()),
    };

    let now = ctx.now_millis();
    let message_id = Uuid::new_v4().to_string();
    ctx.state
        .db
        .groups()
        .insert_message(&message_id, group_id, sender_type, account, &sender_name, character_name, content, msg_type, now)
        .await?;

    let view = GroupMessageView {
        message_id: message_id.clone(),
        group_id: group_id.to_string(),
        sender_type: sender_type.to_string(),
        sender_account: account.to_string(),
        sender_name: sender_name.clone(),
        sender_avatar: member.character_avatar.clone(),
        character_name: character_name.map(str::to_string),
        content: content.to_string(),
        msg_type: msg_type.to_string(),
        created_at: now,
    };

    let members = ctx.state.db.groups().members(group_id).await?;
    for m in &members {
        ctx.state.push_to_account(&m.account, OutboundFrame::GroupMessage { message: view.clone() });
    }

    Ok(OutboundFrame::GroupMessage { message: view })
}

pub async fn update_group_character(
    ctx: &Context,
    group_id: &str,
    account: &str,
    persona_name: &str,
    persona_avatar: Option<&str>,
    persona_desc: Option<&str>,
) -> AppResult<OutboundFrame> {
    ctx.require_owner(account)?;
    if !ctx.state.db.groups().is_member(group_id, account).await? {
        return Err(AppError::Forbidden("not a group member".into()));
    }
    let now = ctx.now_millis();
    ctx.state.db.groups().upsert_member(group_id, account, persona_name, persona_avatar, persona_desc, now).await?;

    Ok(OutboundFrame::GroupCharacterUpdated {
        group_id: group_id.to_string(),
        persona: crate::frame::PersonaInput {
            character_name: persona_name.to_string(),
            character_avatar: persona_avatar.map(str::to_string),
            character_desc: persona_desc.map(str::to_string),
        },
    })
}

pub async fn group_typing_start(ctx: &Context, group_id: &str, account: &str) -> AppResult<OutboundFrame> {
    broadcast_typing(ctx, group_id, account, true).await
}

pub async fn group_typing_stop(ctx: &Context, group_id: &str, account: &str) -> AppResult<OutboundFrame> {
    broadcast_typing(ctx, group_id, account, false).await
}

async fn broadcast_typing(ctx: &Context, group_id: &str, account: &str, starting: bool) -> AppResult<OutboundFrame> {
    ctx.require_owner(account)?;
    if !ctx.state.db.groups().is_member(group_id, account).await? {
        return Err(AppError::Forbidden("not a group member".into()));
    }
    let members = ctx.state.db.groups().members(group_id).await?;
    for m in &members {
        if m.account == account {
            continue;
        }
        let frame = if starting {
            OutboundFrame::GroupTypingStart { group_id: group_id.to_string(), account: account.to_string() }
        } else {
            OutboundFrame::GroupTypingStop { group_id: group_id.to_string(), account: account.to_string() }
        };
        ctx.state.push_to_account(&m.account, frame);
    }
    Ok(OutboundFrame::Ack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::handlers::connection;
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
    async fn persona_mismatch_blocks_send_and_nothing_is_stored() {
        let state = state().await;
        let alice = online(&state, "alice", "a_wx", "Alice").await;

        create_online_group(&alice, "a_wx", "Tavern", None, "Knight", None, None, &[]).await.unwrap();
        let groups = state.db.groups().groups_for_account("a_wx").await.unwrap();
        let group_id = groups[0].id.clone();

        update_group_character(&alice, &group_id, "a_wx", "Rogue", None, None).await.unwrap();

        let err = send_group_message(&alice, &group_id, "a_wx", "character", Some("Knight"), "hello", "text")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let messages = state.db.groups().messages_all(&group_id).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn non_member_cannot_send() {
        let state = state().await;
        let alice = online(&state, "alice", "a_wx", "Alice").await;
        let bob = online(&state, "bob", "b_wx", "Bob").await;

        create_online_group(&alice, "a_wx", "Tavern", None, "Knight", None, None, &[]).await.unwrap();
        let group_id = state.db.groups().groups_for_account("a_wx").await.unwrap()[0].id.clone();

        let err = send_group_message(&bob, &group_id, "b_wx", "user", None, "hi", "text").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
