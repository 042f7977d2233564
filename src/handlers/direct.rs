//! Direct messaging: friend search, friend-request lifecycle, and 1:1
//! message delivery with offline queueing (§4.5).

use super::Context;
use crate::error::{AppError, AppResult};
use crate::frame::{CharacterSummary, FriendRequestView, OutboundFrame};
use uuid::Uuid;

pub async fn search_user(ctx: &Context, wx_account: &str) -> AppResult<OutboundFrame> {
    let character = ctx.state.db.characters().find_by_account(wx_account).await?;
    let result = character.map(|c| CharacterSummary {
        is_online: ctx.state.presence.session_for(&c.account).is_some(),
        account: c.account,
        nickname: c.nickname,
        avatar: c.avatar,
    });
    Ok(OutboundFrame::SearchResult { result })
}

pub async fn friend_request(
    ctx: &Context,
    from_account: &str,
    to_wx_account: &str,
    message: Option<&str>,
) -> AppResult<OutboundFrame> {
    ctx.require_owner(from_account)?;

    let target = ctx
        .state
        .db
        .characters()
        .find_by_account(to_wx_account)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("account {to_wx_account} not found")))?;

    if ctx.state.db.friends().are_friends(from_account, &target.account).await? {
        return Err(AppError::Conflict("already friends".into()));
    }

    let now = ctx.now_millis();
    let request = ctx
        .state
        .db
        .friends()
        .create_request(&Uuid::new_v4().to_string(), from_account, &target.account, message, now)
        .await?;

    let view = FriendRequestView {
        request_id: request.id,
        from_account: request.from_account,
        to_account: request.to_account.clone(),
        message: request.message,
        created_at: request.created_at,
    };

    ctx.state.push_to_account(&target.account, OutboundFrame::FriendRequest { request: view.clone() });

    Ok(OutboundFrame::FriendRequest { request: view })
}

pub async fn accept_friend_request(ctx: &Context, request_id: &str) -> AppResult<OutboundFrame> {
    let request = ctx
        .state
        .db
        .friends()
        .find_request(request_id)
        .await?
        .ok_or_else(|| AppError::NotFound("friend request not found".into()))?;
    ctx.require_owner(&request.to_account)?;

    let now = ctx.now_millis();
    let transitioned = ctx
        .state
        .db
        .friends()
        .resolve_request(request_id, crate::db::FriendRequestStatus::Accepted, now)
        .await?;
    if !transitioned {
        return Err(AppError::NotFound("friend request already resolved".into()));
    }

    ctx.state.db.friends().add_friendship(&request.from_account, &request.to_account, now).await?;

    let to_character = ctx.state.db.characters().find_by_account(&request.to_account).await?;
    let from_character = ctx.state.db.characters().find_by_account(&request.from_account).await?;

    if let Some(c) = &to_character {
        ctx.state.push_to_account(
            &request.from_account,
            OutboundFrame::FriendRequestAccepted {
                account: c.account.clone(),
                nickname: c.nickname.clone(),
                avatar: c.avatar.clone(),
            },
        );
    }

    let ack = from_character
        .map(|c| OutboundFrame::FriendRequestAccepted {
            account: c.account,
            nickname: c.nickname,
            avatar: c.avatar,
        })
        .unwrap_or(OutboundFrame::Ack);

    Ok(ack)
}

pub async fn reject_friend_request(ctx: &Context, request_id: &str) -> AppResult<OutboundFrame> {
    let request = ctx
        .state
        .db
        .friends()
        .find_request(request_id)
        .await?
        .ok_or_else(|| AppError::NotFound("friend request not found".into()))?;
    ctx.require_owner(&request.to_account)?;

    let now = ctx.now_millis();
    let transitioned = ctx
        .state
        .db
        .friends()
        .resolve_request(request_id, crate::db::FriendRequestStatus::Rejected, now)
        .await?;
    if !transitioned {
        return Err(AppError::NotFound("friend request already resolved".into()));
    }

    Ok(OutboundFrame::Ack)
}

pub async fn get_pending_requests(ctx: &Context, account: &str) -> AppResult<OutboundFrame> {
    ctx.require_owner(account)?;
    let rows = ctx.state.db.friends().pending_for_account(account).await?;
    let requests = rows
        .into_iter()
        .map(|r| FriendRequestView {
            request_id: r.id,
            from_account: r.from_account,
            to_account: r.to_account,
            message: r.message,
            created_at: r.created_at,
        })
        .collect();
    Ok(OutboundFrame::PendingFriendRequests { requests })
}

/// Push if the recipient is reachable now; otherwise persist an
/// OfflineMessage for delivery on next bring-online (§4.5).
pub async fn send_message(
    ctx: &Context,
    from_account: &str,
    to_wx_account: &str,
    content: &str,
) -> AppResult<OutboundFrame> {
    ctx.require_owner(from_account)?;

    let target = ctx
        .state
        .db
        .characters()
        .find_by_account(to_wx_account)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("account {to_wx_account} not found")))?;

    if !ctx.state.db.friends().are_friends(from_account, &target.account).await? {
        return Err(AppError::Forbidden("not friends".into()));
    }

    let now = ctx.now_millis();
    let message_id = Uuid::new_v4().to_string();

    if let Some(session) = ctx.state.presence.session_for(&target.account) {
        ctx.state.push(
            session,
            OutboundFrame::Message {
                message_id: message_id.clone(),
                from_account: from_account.to_string(),
                to_account: target.account.clone(),
                content: content.to_string(),
                created_at: now,
            },
        );
    } else {
        ctx.state
            .db
            .offline()
            .enqueue(&message_id, from_account, &target.account, content, now)
            .await?;
    }

    Ok(OutboundFrame::Message {
        message_id,
        from_account: from_account.to_string(),
        to_account: target.account,
        content: content.to_string(),
        created_at: now,
    })
}
