//! Wire frames: JSON objects with a `type` discriminator (§6 External
//! Interfaces). [`InboundFrame`] is what the dispatcher matches on;
//! [`OutboundFrame`] is what handlers and pushes produce.

use serde::{Deserialize, Serialize};

/// A redpacket-persona-free character summary used in search results,
/// online lists, and friend pushes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSummary {
    pub account: String,
    pub nickname: String,
    pub avatar: Option<String>,
    pub is_online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestView {
    pub request_id: String,
    pub from_account: String,
    pub to_account: String,
    pub message: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaInput {
    pub character_name: String,
    pub character_avatar: Option<String>,
    pub character_desc: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMemberView {
    pub account: String,
    pub character_name: Option<String>,
    pub character_avatar: Option<String>,
    pub character_desc: Option<String>,
    pub joined_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub creator_account: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessageView {
    pub message_id: String,
    pub group_id: String,
    pub sender_type: String,
    pub sender_account: String,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub character_name: Option<String>,
    pub content: String,
    pub msg_type: String,
    pub created_at: i64,
}

/// How `get_group_messages` selects the window of history to return.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMode {
    Since,
    Recent,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Register {
        username: String,
        email: Option<String>,
        password: String,
    },
    Login {
        username: String,
        password: String,
    },
    Auth {
        token: String,
    },
    Logout,
    GoOnline {
        account: String,
        nickname: String,
        avatar: Option<String>,
        bio: Option<String>,
    },
    GoOffline {
        account: String,
    },
    GetOnlineCharacters,
    RegisterCharacter {
        account: String,
        nickname: String,
        avatar: Option<String>,
        bio: Option<String>,
    },
    SearchUser {
        wx_account: String,
    },
    FriendRequest {
        from_account: String,
        to_wx_account: String,
        message: Option<String>,
    },
    AcceptFriendRequest {
        request_id: String,
    },
    RejectFriendRequest {
        request_id: String,
    },
    Message {
        from_account: String,
        to_wx_account: String,
        content: String,
    },
    GetPendingRequests {
        account: String,
    },
    CreateOnlineGroup {
        creator_account: String,
        name: String,
        avatar: Option<String>,
        #[serde(flatten)]
        persona: PersonaInput,
        invite_accounts: Vec<String>,
    },
    InviteToGroup {
        group_id: String,
        inviter_account: String,
        invitee_account: String,
    },
    JoinOnlineGroup {
        group_id: String,
        account: String,
        #[serde(flatten)]
        persona: PersonaInput,
    },
    GetOnlineGroups {
        account: String,
    },
    GetGroupMessages {
        group_id: String,
        account: String,
        mode: HistoryMode,
        since: Option<i64>,
        limit: Option<i64>,
    },
    SendGroupMessage {
        group_id: String,
        account: String,
        sender_type: String,
        character_name: Option<String>,
        content: String,
        msg_type: String,
    },
    GetGroupMembers {
        group_id: String,
        account: String,
    },
    UpdateGroupCharacter {
        group_id: String,
        account: String,
        #[serde(flatten)]
        persona: PersonaInput,
    },
    GroupTypingStart {
        group_id: String,
        account: String,
    },
    GroupTypingStop {
        group_id: String,
        account: String,
    },
    ClaimGroupRedpacket {
        group_id: String,
        message_id: String,
        account: String,
    },
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    RegisterSuccess {
        user_id: String,
        username: String,
        token: String,
    },
    LoginSuccess {
        user_id: String,
        username: String,
        token: String,
    },
    AuthSuccess {
        user_id: String,
        username: String,
        restored_characters: Vec<String>,
    },
    AuthFailed {
        message: String,
    },
    CharacterOnline {
        account: String,
        nickname: String,
        avatar: Option<String>,
    },
    CharacterOffline {
        account: String,
    },
    OnlineCharacters {
        characters: Vec<CharacterSummary>,
    },
    SearchResult {
        result: Option<CharacterSummary>,
    },
    FriendRequest {
        request: FriendRequestView,
    },
    FriendRequestAccepted {
        account: String,
        nickname: String,
        avatar: Option<String>,
    },
    PendingFriendRequests {
        requests: Vec<FriendRequestView>,
    },
    Message {
        message_id: String,
        from_account: String,
        to_account: String,
        content: String,
        created_at: i64,
    },
    OnlineGroupCreated {
        group: GroupSummary,
        members: Vec<GroupMemberView>,
    },
    GroupInvite {
        group_id: String,
        name: String,
        inviter_account: String,
    },
    GroupMemberJoined {
        group_id: String,
        member: GroupMemberView,
    },
    OnlineGroupJoined {
        group: GroupSummary,
        members: Vec<GroupMemberView>,
    },
    OnlineGroupsList {
        groups: Vec<GroupSummary>,
    },
    GroupMessages {
        group_id: String,
        messages: Vec<GroupMessageView>,
    },
    GroupMessage {
        message: GroupMessageView,
    },
    GroupMembers {
        group_id: String,
        members: Vec<GroupMemberView>,
    },
    GroupCharacterUpdated {
        group_id: String,
        #[serde(flatten)]
        persona: PersonaInput,
    },
    GroupTypingStart {
        group_id: String,
        account: String,
    },
    GroupTypingStop {
        group_id: String,
        account: String,
    },
    RedpacketClaimed {
        group_id: String,
        message_id: String,
        account: String,
        amount: String,
        claimed_count: i64,
        count: i64,
    },
    Error {
        message: String,
    },
    /// Generic success acknowledgement for operations with nothing else
    /// to report back (logout, reject, invite, typing).
    Ack,
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_ping_round_trips() {
        let raw = r#"{"type":"ping"}"#;
        let frame: InboundFrame = serde_json::from_str(raw).unwrap();
        assert!(matches!(frame, InboundFrame::Ping));
    }

    #[test]
    fn inbound_go_online_parses_optional_fields() {
        let raw = r#"{"type":"go_online","account":"a_wx","nickname":"Alice"}"#;
        let frame: InboundFrame = serde_json::from_str(raw).unwrap();
        match frame {
            InboundFrame::GoOnline { account, nickname, avatar, bio } => {
                assert_eq!(account, "a_wx");
                assert_eq!(nickname, "Alice");
                assert!(avatar.is_none());
                assert!(bio.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn outbound_error_serializes_with_type_tag() {
        let frame = OutboundFrame::Error { message: "nope".into() };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "nope");
    }
}
