//! End-to-end: a friend request sent while the recipient is offline is
//! queued and pushed once the recipient's next `go_online` runs
//! `deliver_pending` (§4.5).

mod common;

use common::{online_client, state, Client};
use roleplay_hub::frame::{InboundFrame, OutboundFrame};

#[tokio::test]
async fn offline_friend_request_is_pushed_on_next_go_online() {
    let app = state().await;

    // Bob creates the "b_wx" character once, then drops offline.
    {
        let bob = online_client(&app, "bob", "b_wx", "Bob").await;
        bob.send(InboundFrame::GoOffline { account: "b_wx".to_string() }).await;
    }

    let alice = online_client(&app, "alice", "a_wx", "Alice").await;
    let req = alice
        .send(InboundFrame::FriendRequest {
            from_account: "a_wx".to_string(),
            to_wx_account: "b_wx".to_string(),
            message: Some("let's be friends".to_string()),
        })
        .await;
    let request_id = match req {
        OutboundFrame::FriendRequest { request } => {
            assert_eq!(request.from_account, "a_wx");
            assert_eq!(request.to_account, "b_wx");
            request.request_id
        }
        other => panic!("expected FriendRequest, got {other:?}"),
    };

    // Bob reconnects under a fresh session (new socket, same account).
    let mut bob = Client::new(app.clone());
    let reg = bob.send(InboundFrame::Login { username: "bob".to_string(), password: "password1".to_string() }).await;
    let token = match reg {
        OutboundFrame::LoginSuccess { token, .. } => token,
        other => panic!("expected LoginSuccess, got {other:?}"),
    };
    bob.send(InboundFrame::Auth { token }).await;
    bob.send(InboundFrame::GoOnline { account: "b_wx".to_string(), nickname: "Bob".to_string(), avatar: None, bio: None }).await;

    let pushed = bob.try_recv_push().await.expect("expected a pending-requests push");
    match pushed {
        OutboundFrame::PendingFriendRequests { requests } => {
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].request_id, request_id);
        }
        other => panic!("expected PendingFriendRequests, got {other:?}"),
    }

    let accept = bob.send(InboundFrame::AcceptFriendRequest { request_id: request_id.clone() }).await;
    assert!(matches!(accept, OutboundFrame::FriendRequestAccepted { .. }), "accept failed: {accept:?}");

    let second = bob.send(InboundFrame::AcceptFriendRequest { request_id }).await;
    assert!(matches!(second, OutboundFrame::Error { .. }), "re-accepting should fail, got {second:?}");
}
