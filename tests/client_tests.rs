#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Integration tests for the client, dispatcher and room sessions.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use common::*;
use showdown_client::auth::LoginRequest;
use showdown_client::{
    Authenticator, Choice, Command, Credentials, DecisionPolicy, SessionState, ShowdownClient,
    ShowdownConfig, ShowdownError, ShowdownEvent,
};

const ROOM: &str = "battle-gen8randombattle-1234";

/// Authenticator returning a fixed assertion and recording what it was sent.
#[derive(Default)]
struct RecordingAuthenticator {
    requests: StdMutex<Vec<LoginRequest>>,
    fail: bool,
}

#[async_trait]
impl Authenticator for RecordingAuthenticator {
    async fn authenticate(&self, request: &LoginRequest) -> showdown_client::Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            Err(ShowdownError::Auth("login rejected".into()))
        } else {
            Ok("signed-assertion".into())
        }
    }
}

/// Picks the first legal option and records every option set it saw.
#[derive(Default)]
struct FirstPolicy {
    seen: StdMutex<Vec<Vec<Choice>>>,
}

impl DecisionPolicy for FirstPolicy {
    fn choose(&self, options: &[Choice]) -> showdown_client::Result<Choice> {
        self.seen.lock().unwrap().push(options.to_vec());
        options.first().cloned().ok_or(ShowdownError::InvalidChoice)
    }
}

fn start(
    transport: impl showdown_client::Transport,
) -> (
    ShowdownClient,
    tokio::sync::mpsc::Receiver<ShowdownEvent>,
) {
    ShowdownClient::start(transport, ShowdownConfig::new())
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn login_waits_for_challstr_then_confirms() {
    let (transport, server) = channel_transport();
    let (mut client, mut events) = start(transport);
    let auth = Arc::new(RecordingAuthenticator::default());

    let pushed = {
        let server_frame = challstr_frame();
        let tx = &server;
        async move {
            settle().await;
            tx.push(server_frame);
        }
    };
    let creds = Credentials::new("bot", "hunter2");
    let login = client.login_with(&creds, auth.as_ref());
    let (result, ()) = tokio::join!(login, pushed);
    result.unwrap();

    assert!(client.is_logged_in());
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::LoggedIn { .. })).await;

    let requests = auth.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].act, "login");
    assert_eq!(requests[0].name, "bot");
    assert_eq!(requests[0].pass, "hunter2");
    assert_eq!(requests[0].challstr, "4|0123456789abcdef");

    settle().await;
    assert_eq!(server.sent(), vec!["|/trn bot,0,signed-assertion"]);
    client.close().await;
}

#[tokio::test]
async fn rejected_login_leaves_connection_unusable() {
    let (transport, sent, closed) = MockTransport::new(vec![scripted(challstr_frame())]);
    let (mut client, mut events) = start(transport);
    let auth = RecordingAuthenticator {
        fail: true,
        ..Default::default()
    };

    let err = client
        .login_with(&Credentials::new("bot", "wrong"), &auth)
        .await
        .unwrap_err();

    assert!(matches!(err, ShowdownError::Auth(_)));
    assert!(!client.is_connected());
    assert!(!client.is_logged_in());
    assert!(closed.load(Ordering::Acquire));
    assert!(sent.lock().unwrap().is_empty());
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::Disconnected { .. })).await;
    assert!(matches!(
        client.send(&Command::Join("lobby".into()), ""),
        Err(ShowdownError::NotConnected)
    ));
}

// ── Battles ─────────────────────────────────────────────────────────

#[tokio::test]
async fn full_battle_through_dispatcher() {
    let (transport, server) = channel_transport();
    let policy = Arc::new(FirstPolicy::default());
    let (mut client, mut events) =
        ShowdownClient::start_with_policy(transport, ShowdownConfig::new(), policy.clone());

    server.push(init_frame(ROOM));
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomOpened { .. })).await;
    settle().await;
    assert_eq!(client.active_rooms().await, vec![ROOM.to_string()]);
    assert_eq!(client.room_state(ROOM).await, Some(SessionState::Active));

    server.push(request_frame(ROOM, r#"{"wait":true}"#));
    server.push(request_frame(
        ROOM,
        &move_request_json(1, &[("tackle", false), ("protect", true), ("surf", false)]),
    ));
    settle().await;
    server.push(request_frame(ROOM, &force_switch_json(2, 2)));
    settle().await;
    server.push(win_frame(ROOM, "bot"));

    let closed = expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomClosed { .. })).await;
    assert_eq!(closed, ShowdownEvent::RoomClosed { room: ROOM.into() });
    assert!(client.active_rooms().await.is_empty());
    assert_eq!(client.room_state(ROOM).await, None);

    settle().await;
    assert_eq!(
        server.sent(),
        vec![
            format!("|/join {ROOM}"),
            format!("{ROOM}|/choose move 1|1"),
            format!("{ROOM}|/choose switch 2|2"),
            format!("{ROOM}|/leave"),
        ]
    );

    let seen = policy.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[0],
        vec![
            Choice::Move {
                slot: 1,
                id: "tackle".into()
            },
            Choice::Move {
                slot: 3,
                id: "surf".into()
            },
        ]
    );
    assert_eq!(seen[1].len(), 2);
    client.close().await;
}

#[tokio::test]
async fn tie_also_ends_the_battle() {
    let (transport, server) = channel_transport();
    let (mut client, mut events) = start(transport);

    server.push(init_frame(ROOM));
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomOpened { .. })).await;
    server.push(tie_frame(ROOM));
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomClosed { .. })).await;

    settle().await;
    assert_eq!(server.sent().last().unwrap(), &format!("{ROOM}|/leave"));
    client.close().await;
}

#[tokio::test]
async fn room_prefixed_frames_drive_a_battle() {
    let (transport, server) = channel_transport();
    let (mut client, mut events) = start(transport);

    server.push("battle-1|init|battle");
    let opened = expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomOpened { .. })).await;
    assert_eq!(opened, ShowdownEvent::RoomOpened { room: "battle-1".into() });
    settle().await;
    assert_eq!(client.active_rooms().await, vec!["battle-1".to_string()]);
    assert_eq!(server.sent(), vec!["|/join battle-1".to_string()]);

    server.push("battle-1|win|bot");
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomClosed { .. })).await;
    settle().await;
    assert_eq!(server.sent().last().unwrap(), "battle-1|/leave");
    client.close().await;
}

#[tokio::test]
async fn chat_mentioning_win_does_not_end_the_battle() {
    let (transport, server) = channel_transport();
    let (mut client, mut events) = start(transport);

    server.push(init_frame(ROOM));
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomOpened { .. })).await;
    server.push(format!(">{ROOM}\n|c|rival|win"));
    settle().await;

    assert_eq!(client.active_rooms().await, vec![ROOM.to_string()]);
    assert_eq!(server.sent(), vec![format!("|/join {ROOM}")]);
    client.close().await;
}

#[tokio::test]
async fn rooms_are_independent() {
    let (transport, server) = channel_transport();
    let (mut client, mut events) = start(transport);
    let other = "battle-gen8ou-99";

    server.push(init_frame(ROOM));
    server.push(init_frame(other));
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomOpened { .. })).await;
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomOpened { .. })).await;

    server.push(win_frame(other, "rival"));
    let closed = expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomClosed { .. })).await;
    assert_eq!(closed, ShowdownEvent::RoomClosed { room: other.into() });
    assert_eq!(client.active_rooms().await, vec![ROOM.to_string()]);

    client.close().await;
    let sent = server.sent();
    assert!(sent.contains(&format!("{other}|/leave")));
    assert_eq!(sent.last().unwrap(), &format!("{ROOM}|/forfeit"));
    assert!(!sent.contains(&format!("{other}|/forfeit")));
}

#[tokio::test]
async fn close_forfeits_every_open_room() {
    let (transport, server) = channel_transport();
    let (mut client, mut events) = start(transport);

    server.push(init_frame("battle-a-1"));
    server.push(init_frame("battle-b-2"));
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomOpened { .. })).await;
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomOpened { .. })).await;
    settle().await;

    client.close().await;

    assert!(server.closed.load(Ordering::Acquire));
    assert!(client.active_rooms().await.is_empty());
    let sent = server.sent();
    assert!(sent.contains(&"battle-a-1|/forfeit".to_string()));
    assert!(sent.contains(&"battle-b-2|/forfeit".to_string()));
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::Disconnected { .. })).await;
}

// ── Challenges ──────────────────────────────────────────────────────

#[tokio::test]
async fn challenges_are_accepted_or_declined() {
    let (transport, server) = channel_transport();
    let config = ShowdownConfig::new().with_decline_message("not today");
    let (mut client, mut events) = ShowdownClient::start(transport, config);
    client
        .roster()
        .write()
        .await
        .load_human("gen8ou", "Pikachu @ Light Ball\nAbility: Static\n- Thunderbolt")
        .unwrap();

    server.push(challenges_frame(&[("alice", "gen8ou")]));
    let answered =
        expect_event(&mut events, |e| matches!(e, ShowdownEvent::ChallengeAnswered { .. })).await;
    assert_eq!(
        answered,
        ShowdownEvent::ChallengeAnswered {
            challenger: "alice".into(),
            format: "gen8ou".into(),
            accepted: true,
        }
    );
    settle().await;
    assert_eq!(
        server.sent(),
        vec![
            "|/utm Pikachu||lightball|static|thunderbolt||,,,,,||,,,,,|||".to_string(),
            "|/accept alice".to_string(),
        ]
    );

    server.push(challenges_frame(&[("bob", "gen4uu")]));
    expect_event(&mut events, |e| {
        matches!(e, ShowdownEvent::ChallengeAnswered { accepted: false, .. })
    })
    .await;
    settle().await;
    assert_eq!(
        server.sent()[2..],
        ["|/pm bob, not today".to_string(), "|/reject bob".to_string()]
    );
    client.close().await;
}

// ── Errors and disconnects ──────────────────────────────────────────

#[tokio::test]
async fn server_errors_do_not_stop_the_dispatcher() {
    let (transport, server) = channel_transport();
    let (mut client, mut events) = start(transport);

    server.push(format!(">{ROOM}\n|error|[Invalid choice] There's nothing to choose"));
    let error =
        expect_event(&mut events, |e| matches!(e, ShowdownEvent::ServerError { .. })).await;
    assert_eq!(
        error,
        ShowdownEvent::ServerError {
            room: ROOM.into(),
            message: "[Invalid choice] There's nothing to choose".into(),
        }
    );

    server.push(init_frame(ROOM));
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomOpened { .. })).await;
    assert!(client.is_connected());
    client.close().await;
}

#[tokio::test]
async fn server_hang_up_ends_sessions() {
    let (transport, server) = channel_transport();
    let (mut client, mut events) = start(transport);

    server.push(init_frame(ROOM));
    expect_event(&mut events, |e| matches!(e, ShowdownEvent::RoomOpened { .. })).await;
    server.hang_up();

    let event = expect_event(&mut events, |e| matches!(e, ShowdownEvent::Disconnected { .. })).await;
    assert_eq!(event, ShowdownEvent::Disconnected { reason: None });
    assert!(!client.is_connected());
    assert!(client.active_rooms().await.is_empty());
    assert!(matches!(
        client.send(&Command::Forfeit, ROOM),
        Err(ShowdownError::NotConnected)
    ));
    client.close().await;
}

#[tokio::test]
async fn transport_error_reports_reason() {
    let (transport, _sent, _closed) = MockTransport::new(vec![Some(Err(
        ShowdownError::TransportReceive("connection reset".into()),
    ))]);
    let (mut client, mut events) = start(transport);

    match expect_event(&mut events, |e| matches!(e, ShowdownEvent::Disconnected { .. })).await {
        ShowdownEvent::Disconnected { reason: Some(reason) } => {
            assert!(reason.contains("connection reset"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    client.close().await;
}
