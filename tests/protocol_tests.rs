#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire decoding and command encoding tests against frames captured from a
//! live server.

use showdown_client::protocol::{
    decode_frame, encode_frame, BattleRequest, ChallengeUpdate, RequestAction,
};
use showdown_client::{Choice, Command, Message, MessageKind};

#[test]
fn well_formed_line_splits_into_room_type_content() {
    let msg = Message::decode("r|t|c1|c2");
    assert_eq!(msg.room, "r");
    assert_eq!(msg.kind, MessageKind::Other("t".into()));
    assert_eq!(msg.content, vec!["c1".to_string(), "c2".to_string()]);
}

#[test]
fn payload_keeps_embedded_delimiters() {
    let msg = Message::decode("|error|[Invalid choice] Can't move: |move 5| is not valid");
    assert_eq!(msg.kind, MessageKind::Error);
    assert_eq!(
        msg.payload(),
        "[Invalid choice] Can't move: |move 5| is not valid"
    );
}

#[test]
fn login_frame_is_global_challstr() {
    let msgs = decode_frame("|challstr|4|e0b1f3c5d7a9");
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].is_global());
    assert_eq!(msgs[0].kind, MessageKind::Challstr);
    assert_eq!(msgs[0].content, vec!["4".to_string(), "e0b1f3c5d7a9".to_string()]);
}

#[test]
fn battle_batch_scopes_every_line_to_its_room() {
    let raw = ">battle-gen8randombattle-1234\n\
               |init|battle\n\
               |title|bot vs. rival\n\
               |j|☆bot\n\
               |gametype|singles\n\
               |player|p1|bot|1|\n\
               |teamsize|p1|6\n\
               |start";
    let msgs = decode_frame(raw);
    assert_eq!(msgs.len(), 7);
    assert!(msgs.iter().all(|m| m.room == "battle-gen8randombattle-1234"));
    assert_eq!(msgs[0].kind, MessageKind::Init);
    assert_eq!(msgs[6].kind, MessageKind::Other("start".into()));
}

#[test]
fn plain_text_lines_are_skipped() {
    let msgs = decode_frame(">lobby\nWelcome to the lobby!\n|c|~|hi");
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].room, "lobby");
}

#[test]
fn end_of_battle_is_detected_only_from_protocol_lines() {
    let msgs = decode_frame(">battle-x\n|\n|win|bot");
    assert!(msgs.iter().any(Message::ends_match));

    let chat = decode_frame(">battle-x\n|c|rival|gg, you win");
    assert!(!chat.iter().any(Message::ends_match));
}

#[test]
fn real_request_offers_enabled_moves() {
    let payload = r#"{"active":[{"moves":[{"move":"Aqua Jet","id":"aquajet","pp":32,"maxpp":32,"target":"normal","disabled":false},{"move":"Close Combat","id":"closecombat","pp":8,"maxpp":8,"target":"normal","disabled":"Taunt"},{"move":"Liquidation","id":"liquidation","pp":16,"maxpp":16,"target":"normal","disabled":false}]}],"side":{"name":"bot","id":"p1","pokemon":[{"ident":"p1: Barraskewda","details":"Barraskewda, L82, M","condition":"259/259","active":true,"stats":{"atk":235}},{"ident":"p1: Blissey","details":"Blissey, L84, F","condition":"0 fnt","active":false}]},"rqid":4}"#;
    let msg = decode_frame(&format!(">battle-x\n|request|{payload}")).pop().unwrap();
    assert_eq!(msg.kind, MessageKind::Request);

    let request = BattleRequest::parse(&msg.payload()).unwrap();
    assert_eq!(request.action(), RequestAction::Move);
    assert_eq!(request.rqid, Some(4));
    assert_eq!(
        request.legal_moves(),
        vec![
            Choice::Move {
                slot: 1,
                id: "aquajet".into()
            },
            Choice::Move {
                slot: 3,
                id: "liquidation".into()
            },
        ]
    );
    assert!(request.legal_switches().is_empty());
}

#[test]
fn challenge_update_lists_challengers() {
    let msg = decode_frame(
        r#"|updatechallenges|{"challengesFrom":{"rival":"gen8randombattle"},"challengeTo":null,"games":null}"#,
    )
    .pop()
    .unwrap();
    assert_eq!(msg.kind, MessageKind::UpdateChallenges);
    let update = ChallengeUpdate::parse(&msg.payload()).unwrap();
    assert_eq!(update.challenges_from["rival"], "gen8randombattle");
}

#[test]
fn outbound_frames() {
    assert_eq!(
        encode_frame("", &Command::Join("battle-x".into())),
        "|/join battle-x"
    );
    assert_eq!(encode_frame("battle-x", &Command::Forfeit), "battle-x|/forfeit");
    assert_eq!(
        encode_frame(
            "battle-x",
            &Command::Choose {
                choice: Choice::Switch {
                    slot: 3,
                    ident: "p1: Cinderace".into()
                },
                rqid: Some(9),
            }
        ),
        "battle-x|/choose switch 3|9"
    );
    assert_eq!(
        encode_frame(
            "",
            &Command::PrivateMessage {
                to: "rival".into(),
                text: "maybe later".into()
            }
        ),
        "|/pm rival, maybe later"
    );
    assert_eq!(encode_frame("", &Command::UseTeam("null".into())), "|/utm null");
}
