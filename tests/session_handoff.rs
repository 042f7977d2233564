//! End-to-end: a second session for the same account takes over via
//! `go_online` handoff, and subsequent direct messages route only to
//! the new session (§4.3 handoff, §4.5 routing).

mod common;

use common::{online_client, state, Client};
use roleplay_hub::frame::{InboundFrame, OutboundFrame};

#[tokio::test]
async fn handoff_moves_routing_to_the_new_session() {
    let app = state().await;

    let mut alice_s1 = online_client(&app, "alice", "a_wx", "Alice").await;
    let bob = online_client(&app, "bob", "b_wx", "Bob").await;

    bob.send(InboundFrame::FriendRequest {
        from_account: "b_wx".to_string(),
        to_wx_account: "a_wx".to_string(),
        message: None,
    })
    .await;
    let pushed = alice_s1.try_recv_push().await.expect("expected a friend-request push to s1");
    let request_id = match pushed {
        OutboundFrame::FriendRequest { request } => request.request_id,
        other => panic!("expected FriendRequest, got {other:?}"),
    };
    let accept = alice_s1.send(InboundFrame::AcceptFriendRequest { request_id }).await;
    assert!(matches!(accept, OutboundFrame::FriendRequestAccepted { .. }), "accept failed: {accept:?}");

    // A second session for the same underlying user takes over "a_wx".
    let mut alice_s2 = Client::new(app.clone());
    let login = alice_s2.send(InboundFrame::Login { username: "alice".to_string(), password: "password1".to_string() }).await;
    let token = match login {
        OutboundFrame::LoginSuccess { token, .. } => token,
        other => panic!("expected LoginSuccess, got {other:?}"),
    };
    alice_s2.send(InboundFrame::Auth { token }).await;
    let online = alice_s2
        .send(InboundFrame::GoOnline { account: "a_wx".to_string(), nickname: "Alice".to_string(), avatar: None, bio: None })
        .await;
    assert!(matches!(online, OutboundFrame::CharacterOnline { .. }), "handoff go_online failed: {online:?}");

    // go_online's own CharacterOnline broadcast now routes to s2, the new
    // owner of "a_wx" — drain it before checking routing of the next message.
    let broadcast = alice_s2.try_recv_push().await.expect("expected the go_online broadcast on s2");
    assert!(matches!(broadcast, OutboundFrame::CharacterOnline { .. }));
    assert!(alice_s1.try_recv_push().await.is_none(), "old session should not see the post-handoff broadcast");

    bob.send(InboundFrame::Message {
        from_account: "b_wx".to_string(),
        to_wx_account: "a_wx".to_string(),
        content: "still there?".to_string(),
    })
    .await;

    let routed_to_s2 = alice_s2.try_recv_push().await.expect("message should route to the handoff session");
    match routed_to_s2 {
        OutboundFrame::Message { content, .. } => assert_eq!(content, "still there?"),
        other => panic!("expected Message, got {other:?}"),
    }

    let nothing_on_s1 = alice_s1.try_recv_push().await;
    assert!(nothing_on_s1.is_none(), "old session should no longer receive routed messages, got {nothing_on_s1:?}");
}
