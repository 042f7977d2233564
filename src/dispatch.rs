//! Message Dispatcher (§4.4): a single multiplexer keyed by inbound
//! frame `type`. Parallels the teacher's `Registry::dispatch` — per-type
//! counters plus a tracing span wrapping each call — but routes over the
//! closed [`InboundFrame`] enum serde already hands us, rather than a
//! `HashMap<&str, Box<dyn Handler>>` over untyped text commands.

use crate::error::AppError;
use crate::frame::InboundFrame;
use crate::handlers::{Context, connection, direct, group, redpacket};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Instrument, Level, span, warn};

use crate::frame::OutboundFrame;

#[derive(Default)]
pub struct DispatchCounters {
    counts: DashMap<&'static str, AtomicU64>,
}

impl DispatchCounters {
    fn record(&self, frame_type: &'static str) {
        self.counts.entry(frame_type).or_insert_with(|| AtomicU64::new(0)).fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_for(&self, frame_type: &str) -> u64 {
        self.counts.get(frame_type).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }
}

pub fn frame_type_name(frame: &InboundFrame) -> &'static str {
    match frame {
        InboundFrame::Register { .. } => "register",
        InboundFrame::Login { .. } => "login",
        InboundFrame::Auth { .. } => "auth",
        InboundFrame::Logout => "logout",
        InboundFrame::GoOnline { .. } => "go_online",
        InboundFrame::GoOffline { .. } => "go_offline",
        InboundFrame::GetOnlineCharacters => "get_online_characters",
        InboundFrame::RegisterCharacter { .. } => "register_character",
        InboundFrame::SearchUser { .. } => "search_user",
        InboundFrame::FriendRequest { .. } => "friend_request",
        InboundFrame::AcceptFriendRequest { .. } => "accept_friend_request",
        InboundFrame::RejectFriendRequest { .. } => "reject_friend_request",
        InboundFrame::Message { .. } => "message",
        InboundFrame::GetPendingRequests { .. } => "get_pending_requests",
        InboundFrame::CreateOnlineGroup { .. } => "create_online_group",
        InboundFrame::InviteToGroup { .. } => "invite_to_group",
        InboundFrame::JoinOnlineGroup { .. } => "join_online_group",
        InboundFrame::GetOnlineGroups { .. } => "get_online_groups",
        InboundFrame::GetGroupMessages { .. } => "get_group_messages",
        InboundFrame::SendGroupMessage { .. } => "send_group_message",
        InboundFrame::GetGroupMembers { .. } => "get_group_members",
        InboundFrame::UpdateGroupCharacter { .. } => "update_group_character",
        InboundFrame::GroupTypingStart { .. } => "group_typing_start",
        InboundFrame::GroupTypingStop { .. } => "group_typing_stop",
        InboundFrame::ClaimGroupRedpacket { .. } => "claim_group_redpacket",
        InboundFrame::Ping => "ping",
    }
}

/// Dispatch one inbound frame to its handler, converting any error into
/// the single outbound `error` frame (§4.4 propagation policy — handler
/// failures never drop the connection).
pub async fn dispatch(ctx: &Context, counters: &DispatchCounters, frame: InboundFrame) -> OutboundFrame {
    let frame_type = frame_type_name(&frame);
    counters.record(frame_type);

    let call_span = span!(Level::DEBUG, "dispatch", frame_type, session = %ctx.session);

    let result = async {
        match frame {
            InboundFrame::Register { username, email, password } => {
                connection::register(ctx, &username, email.as_deref(), &password).await
            }
            InboundFrame::Login { username, password } => connection::login(ctx, &username, &password).await,
            InboundFrame::Auth { token } => connection::auth(ctx, &token).await,
            InboundFrame::Logout => connection::logout(ctx).await,
            InboundFrame::GoOnline { account, nickname, avatar, bio } => {
                connection::go_online(ctx, &account, &nickname, avatar.as_deref(), bio.as_deref()).await
            }
            InboundFrame::GoOffline { account } => connection::go_offline(ctx, &account).await,
            InboundFrame::GetOnlineCharacters => connection::get_online_characters(ctx).await,
            InboundFrame::RegisterCharacter { account, nickname, avatar, bio } => {
                connection::register_character(ctx, &account, &nickname, avatar.as_deref(), bio.as_deref()).await
            }
            InboundFrame::SearchUser { wx_account } => direct::search_user(ctx, &wx_account).await,
            InboundFrame::FriendRequest { from_account, to_wx_account, message } => {
                direct::friend_request(ctx, &from_account, &to_wx_account, message.as_deref()).await
            }
            InboundFrame::AcceptFriendRequest { request_id } => {
                direct::accept_friend_request(ctx, &request_id).await
            }
            InboundFrame::RejectFriendRequest { request_id } => {
                direct::reject_friend_request(ctx, &request_id).await
            }
            InboundFrame::Message { from_account, to_wx_account, content } => {
                direct::send_message(ctx, &from_account, &to_wx_account, &content).await
            }
            InboundFrame::GetPendingRequests { account } => direct::get_pending_requests(ctx, &account).await,
            InboundFrame::CreateOnlineGroup { creator_account, name, avatar, persona, invite_accounts } => {
                group::create_online_group(
                    ctx,
                    &creator_account,
                    &name,
                    avatar.as_deref(),
                    &persona.character_name,
                    persona.character_avatar.as_deref(),
                    persona.character_desc.as_deref(),
                    &invite_accounts,
                )
                .await
            }
            InboundFrame::InviteToGroup { group_id, inviter_account, invitee_account } => {
                group::invite_to_group(ctx, &group_id, &inviter_account, &invitee_account).await
            }
            InboundFrame::JoinOnlineGroup { group_id, account, persona } => {
                group::join_online_group(
                    ctx,
                    &group_id,
                    &account,
                    &persona.character_name,
                    persona.character_avatar.as_deref(),
                    persona.character_desc.as_deref(),
                )
                .await
            }
            InboundFrame::GetOnlineGroups { account } => group::get_online_groups(ctx, &account).await,
            InboundFrame::GetGroupMessages { group_id, account, mode, since, limit } => {
                group::get_group_messages(ctx, &group_id, &account, &mode, since, limit).await
            }
            InboundFrame::SendGroupMessage { group_id, account, sender_type, character_name, content, msg_type } => {
                group::send_group_message(
                    ctx,
                    &group_id,
                    &account,
                    &sender_type,
                    character_name.as_deref(),
                    &content,
                    &msg_type,
                )
                .await
            }
            InboundFrame::GetGroupMembers { group_id, account } => {
                group::get_group_members(ctx, &group_id, &account).await
            }
            InboundFrame::UpdateGroupCharacter { group_id, account, persona } => {
                group::update_group_character(
                    ctx,
                    &group_id,
                    &account,
                    &persona.character_name,
                    persona.character_avatar.as_deref(),
                    persona.character_desc.as_deref(),
                )
                .await
            }
            InboundFrame::GroupTypingStart { group_id, account } => {
                group::group_typing_start(ctx, &group_id, &account).await
            }
            InboundFrame::GroupTypingStop { group_id, account } => {
                group::group_typing_stop(ctx, &group_id, &account).await
            }
            InboundFrame::ClaimGroupRedpacket { group_id, message_id, account } => {
                redpacket::claim_group_redpacket(ctx, &group_id, &message_id, &account).await
            }
            InboundFrame::Ping => connection::ping(ctx).await,
        }
    }
    .instrument(call_span)
    .await;

    result.unwrap_or_else(|e: AppError| {
        warn!(frame_type, error = %e, error_code = e.error_code(), "handler returned error");
        e.to_frame()
    })
}

/// Called when the dispatcher receives a JSON object whose `type` tag
/// doesn't match any known inbound frame — per §4.4, this produces an
/// error frame, not a disconnect.
pub fn unknown_frame_error(raw_type: &str) -> OutboundFrame {
    OutboundFrame::Error { message: format!("unknown frame type: {raw_type}") }
}
