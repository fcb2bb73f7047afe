//! Wire types for the Showdown text protocol.
//!
//! Inbound frames are `<room>|<type>|<content...>` lines, optionally batched
//! behind a `>room` header line. Outbound frames are `<room>|<command>`,
//! where a command starting with `/` is a server command and anything else is
//! room chat. JSON payloads carried by `request` and `updatechallenges`
//! messages are modelled with `serde`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::policy::Choice;

/// Separator between fields of a frame.
pub const FIELD_DELIMITER: char = '|';

// ── Inbound messages ────────────────────────────────────────────────

/// The exact-match tag of an inbound message type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `challstr`: the login challenge, always global.
    Challstr,
    /// `updatechallenges`: the pending challenge table, always global.
    UpdateChallenges,
    /// `init`: a room (battle) was opened for us.
    Init,
    /// `request`: the server wants a decision in a battle.
    Request,
    /// `error`: the server rejected something we sent.
    Error,
    /// `win`: the battle ended with a winner.
    Win,
    /// `tie`: the battle ended in a draw.
    Tie,
    /// Any other type token, kept verbatim.
    Other(String),
}

impl MessageKind {
    /// Tag a raw type token.
    pub fn from_token(token: &str) -> Self {
        match token {
            "challstr" => Self::Challstr,
            "updatechallenges" => Self::UpdateChallenges,
            "init" => Self::Init,
            "request" => Self::Request,
            "error" => Self::Error,
            "win" => Self::Win,
            "tie" => Self::Tie,
            other => Self::Other(other.to_owned()),
        }
    }

    /// The wire token this tag was built from.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Challstr => "challstr",
            Self::UpdateChallenges => "updatechallenges",
            Self::Init => "init",
            Self::Request => "request",
            Self::Error => "error",
            Self::Win => "win",
            Self::Tie => "tie",
            Self::Other(token) => token,
        }
    }
}

/// One decoded protocol line.
///
/// A message with an empty `room` is global-scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Room id, empty for global messages.
    pub room: String,
    /// Type tag.
    pub kind: MessageKind,
    /// Remaining `|`-separated fields, in order.
    pub content: Vec<String>,
}

impl Message {
    /// Decode a single raw line.
    ///
    /// The first field is the room with any leading `>` and trailing
    /// whitespace removed; the second is the type; every following field is
    /// content. Rejoining `content` with `|` (see [`payload`](Self::payload))
    /// gives back the rest of the line byte-for-byte.
    pub fn decode(raw: &str) -> Self {
        let mut fields = raw.split(FIELD_DELIMITER);
        let room = fields.next().unwrap_or_default();
        let room = room.strip_prefix('>').unwrap_or(room).trim_end();
        let kind = MessageKind::from_token(fields.next().unwrap_or_default().trim());
        Self {
            room: room.to_owned(),
            kind,
            content: fields.map(str::to_owned).collect(),
        }
    }

    /// Returns `true` for global-scope messages.
    pub fn is_global(&self) -> bool {
        self.room.is_empty()
    }

    /// The content fields joined back with `|`.
    pub fn payload(&self) -> String {
        self.content.join("|")
    }

    /// Returns `true` if this message announces the end of a battle.
    ///
    /// Either the type itself is `win`/`tie`, or the type is blank (a
    /// `|\n|win|...` spacer decoded as one line) and the content leads with
    /// the indicator.
    pub fn ends_match(&self) -> bool {
        match &self.kind {
            MessageKind::Win | MessageKind::Tie => true,
            MessageKind::Other(token) if token.is_empty() => self
                .content
                .iter()
                .map(|field| field.trim())
                .find(|field| !field.is_empty())
                .is_some_and(|field| field == "win" || field == "tie"),
            _ => false,
        }
    }
}

/// Split one transport frame into protocol lines.
///
/// A frame whose first line is `>ROOM` scopes every following line to that
/// room, and lines in it that do not begin with `|` are plain room text and
/// are dropped. Without that header each line is decoded on its own, so both
/// `|type|...` (global) and `ROOM|type|...` lines are accepted; only lines
/// holding no `|` at all are dropped.
pub fn decode_frame(raw: &str) -> Vec<Message> {
    let Some(rest) = raw.strip_prefix('>') else {
        return raw
            .lines()
            .filter(|line| line.contains(FIELD_DELIMITER))
            .map(Message::decode)
            .collect();
    };
    let (room, body) = match rest.split_once('\n') {
        Some((room, body)) => (room.trim_end(), body),
        None => (rest.trim_end(), ""),
    };

    body.lines()
        .filter(|line| line.starts_with(FIELD_DELIMITER))
        .map(|line| Message {
            room: room.to_owned(),
            ..Message::decode(line)
        })
        .collect()
}

// ── Outbound commands ───────────────────────────────────────────────

/// A command the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/trn NAME,0,ASSERTION`: confirm a login.
    Trn { username: String, assertion: String },
    /// `/join ROOM`
    Join(String),
    /// `/leave`
    Leave,
    /// `/forfeit`
    Forfeit,
    /// `/choose move N` or `/choose switch N`, with an optional request id.
    Choose { choice: Choice, rqid: Option<u64> },
    /// `/choose default`: let the server pick.
    ChooseDefault { rqid: Option<u64> },
    /// `/utm TEAM`: declare the team for the next accepted battle.
    UseTeam(String),
    /// `/accept USER`
    Accept(String),
    /// `/reject USER`
    Reject(String),
    /// `/pm USER, TEXT`
    PrivateMessage { to: String, text: String },
    /// Plain chat text.
    Chat(String),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trn {
                username,
                assertion,
            } => write!(f, "/trn {username},0,{assertion}"),
            Self::Join(room) => write!(f, "/join {room}"),
            Self::Leave => f.write_str("/leave"),
            Self::Forfeit => f.write_str("/forfeit"),
            Self::Choose { choice, rqid } => {
                write!(f, "/choose {choice}")?;
                write_rqid(f, *rqid)
            }
            Self::ChooseDefault { rqid } => {
                f.write_str("/choose default")?;
                write_rqid(f, *rqid)
            }
            Self::UseTeam(team) => write!(f, "/utm {team}"),
            Self::Accept(user) => write!(f, "/accept {user}"),
            Self::Reject(user) => write!(f, "/reject {user}"),
            Self::PrivateMessage { to, text } => write!(f, "/pm {to}, {text}"),
            Self::Chat(text) => f.write_str(text),
        }
    }
}

fn write_rqid(f: &mut fmt::Formatter<'_>, rqid: Option<u64>) -> fmt::Result {
    match rqid {
        Some(id) => write!(f, "|{id}"),
        None => Ok(()),
    }
}

/// Render an outbound frame for `room` (empty for global commands).
pub fn encode_frame(room: &str, command: &Command) -> String {
    format!("{room}{FIELD_DELIMITER}{command}")
}

// ── Challenge payloads ──────────────────────────────────────────────

/// Payload of a global `updatechallenges` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeUpdate {
    /// Pending inbound challenges: challenger name to requested format.
    #[serde(default)]
    pub challenges_from: BTreeMap<String, String>,
}

impl ChallengeUpdate {
    /// Decode the JSON payload of an `updatechallenges` message.
    ///
    /// # Errors
    ///
    /// Returns [`ShowdownError::Serialization`](crate::ShowdownError::Serialization)
    /// if the payload is not valid JSON of this shape.
    pub fn parse(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

// ── Battle requests ─────────────────────────────────────────────────

/// Payload of a battle `request` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleRequest {
    /// The opponent is deciding; no action is expected.
    #[serde(default)]
    pub wait: bool,
    /// One flag per active slot that must switch out.
    #[serde(default)]
    pub force_switch: Vec<bool>,
    /// The battle is at team preview.
    #[serde(default)]
    pub team_preview: bool,
    /// Active slots and their moves.
    #[serde(default)]
    pub active: Vec<ActiveSlot>,
    /// Our side of the field.
    #[serde(default)]
    pub side: Option<SideInfo>,
    /// Request id echoed back with the decision.
    #[serde(default)]
    pub rqid: Option<u64>,
}

/// The decision a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    Wait,
    TeamPreview,
    ForceSwitch,
    Move,
}

impl BattleRequest {
    /// Decode the JSON payload of a `request` message.
    ///
    /// # Errors
    ///
    /// Returns [`ShowdownError::Serialization`](crate::ShowdownError::Serialization)
    /// if the payload is not a request object.
    pub fn parse(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Classify what the server expects from us.
    pub fn action(&self) -> RequestAction {
        if self.wait {
            RequestAction::Wait
        } else if self.team_preview {
            RequestAction::TeamPreview
        } else if self.force_switch.iter().any(|forced| *forced) {
            RequestAction::ForceSwitch
        } else {
            RequestAction::Move
        }
    }

    /// Party members that are neither active nor fainted, in party order.
    pub fn legal_switches(&self) -> Vec<Choice> {
        self.side
            .iter()
            .flat_map(|side| side.pokemon.iter().enumerate())
            .filter(|(_, mon)| !mon.active && !mon.is_fainted())
            .map(|(index, mon)| Choice::Switch {
                slot: index + 1,
                ident: mon.ident.clone(),
            })
            .collect()
    }

    /// Moves of the first active slot that are not disabled.
    pub fn legal_moves(&self) -> Vec<Choice> {
        self.active
            .first()
            .map(|slot| {
                slot.moves
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| !m.disabled.is_set())
                    .map(|(index, m)| Choice::Move {
                        slot: index + 1,
                        id: m.id.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One active battle slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSlot {
    #[serde(default)]
    pub moves: Vec<MoveSlot>,
}

/// A move offered for an active slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveSlot {
    #[serde(rename = "move", default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub disabled: Disabled,
}

/// The `disabled` field of a move: a flag, or a reason string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Disabled {
    Flag(bool),
    Reason(String),
}

impl Default for Disabled {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl Disabled {
    pub fn is_set(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Reason(reason) => !reason.is_empty(),
        }
    }
}

/// Our side of the field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub pokemon: Vec<SidePokemon>,
}

/// A party member as reported in a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidePokemon {
    pub ident: String,
    #[serde(default)]
    pub active: bool,
    /// `"HP/MAXHP"` optionally followed by a status, e.g. `"0 fnt"`.
    #[serde(default)]
    pub condition: String,
}

impl SidePokemon {
    pub fn is_fainted(&self) -> bool {
        self.condition
            .split_whitespace()
            .nth(1)
            .is_some_and(|status| status == "fnt")
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn decode_splits_room_type_and_content() {
        let msg = Message::decode("r|t|c1|c2");
        assert_eq!(msg.room, "r");
        assert_eq!(msg.kind, MessageKind::Other("t".into()));
        assert_eq!(msg.content, vec!["c1", "c2"]);
    }

    #[test]
    fn decode_strips_room_marker_and_trailing_whitespace() {
        let msg = Message::decode(">battle-gen8ou-7\n|init|battle");
        assert_eq!(msg.room, "battle-gen8ou-7");
        assert_eq!(msg.kind, MessageKind::Init);
        assert_eq!(msg.content, vec!["battle"]);
    }

    #[test]
    fn decode_global_message_has_empty_room() {
        let msg = Message::decode("|challstr|4|abc");
        assert!(msg.is_global());
        assert_eq!(msg.kind, MessageKind::Challstr);
        assert_eq!(msg.payload(), "4|abc");
    }

    #[test]
    fn decode_handles_missing_fields() {
        let msg = Message::decode("");
        assert!(msg.is_global());
        assert_eq!(msg.kind, MessageKind::Other(String::new()));
        assert!(msg.content.is_empty());
    }

    #[test]
    fn payload_preserves_embedded_delimiters() {
        let line = r#"|request|{"rqid":3,"note":"a|b"}"#;
        let msg = Message::decode(line);
        assert_eq!(msg.payload(), r#"{"rqid":3,"note":"a|b"}"#);
    }

    #[test]
    fn decode_frame_scopes_batch_to_room() {
        let frame = ">battle-gen8ou-1\n|init|battle\n|title|a vs. b\nplain text\n\n|win|a";
        let messages = decode_frame(frame);
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.room == "battle-gen8ou-1"));
        assert_eq!(messages[0].kind, MessageKind::Init);
        assert_eq!(messages[1].content, vec!["a vs. b"]);
        assert!(messages[2].ends_match());
    }

    #[test]
    fn decode_frame_without_header_is_global() {
        let messages = decode_frame("|updateuser| Guest 1|0|1");
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_global());
    }

    #[test]
    fn decode_frame_accepts_room_prefixed_lines() {
        let messages = decode_frame("battle-1|init|battle\nbattle-2 |request|{}\nno delimiter here");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].room, "battle-1");
        assert_eq!(messages[0].kind, MessageKind::Init);
        assert_eq!(messages[1].room, "battle-2");
        assert_eq!(messages[1].kind, MessageKind::Request);
        assert_eq!(messages[1].payload(), "{}");
    }

    #[test]
    fn ends_match_detects_indicator_in_content() {
        assert!(Message::decode(">battle-x\n|\n|win|alice").ends_match());
        assert!(Message::decode("battle-x|tie").ends_match());
        assert!(!Message::decode("battle-x|c|bob|win").ends_match());
        assert!(!Message::decode("battle-x|turn|3").ends_match());
    }

    #[test]
    fn command_rendering() {
        let choose = Command::Choose {
            choice: Choice::Move {
                slot: 2,
                id: "tackle".into(),
            },
            rqid: Some(7),
        };
        assert_eq!(encode_frame("battle-x", &choose), "battle-x|/choose move 2|7");
        assert_eq!(
            encode_frame("", &Command::Join("battle-x".into())),
            "|/join battle-x"
        );
        assert_eq!(
            Command::Trn {
                username: "uname".into(),
                assertion: "assertion".into()
            }
            .to_string(),
            "/trn uname,0,assertion"
        );
        assert_eq!(
            Command::PrivateMessage {
                to: "bob".into(),
                text: "no thanks".into()
            }
            .to_string(),
            "/pm bob, no thanks"
        );
        assert_eq!(Command::ChooseDefault { rqid: None }.to_string(), "/choose default");
    }

    #[test]
    fn request_classification() {
        let wait = BattleRequest::parse(r#"{"wait":true,"side":{"pokemon":[]}}"#).unwrap();
        assert_eq!(wait.action(), RequestAction::Wait);

        let forced = BattleRequest::parse(r#"{"forceSwitch":[true],"rqid":4}"#).unwrap();
        assert_eq!(forced.action(), RequestAction::ForceSwitch);
        assert_eq!(forced.rqid, Some(4));

        let preview = BattleRequest::parse(r#"{"teamPreview":true}"#).unwrap();
        assert_eq!(preview.action(), RequestAction::TeamPreview);

        let mv = BattleRequest::parse(r#"{"forceSwitch":[false],"active":[]}"#).unwrap();
        assert_eq!(mv.action(), RequestAction::Move);
    }

    #[test]
    fn legal_switches_skip_active_and_fainted() {
        let request = BattleRequest::parse(
            r#"{"forceSwitch":[true],"side":{"name":"me","id":"p1","pokemon":[
                {"ident":"p1: A","active":true,"condition":"0 fnt"},
                {"ident":"p1: B","active":false,"condition":"120/300"},
                {"ident":"p1: C","active":false,"condition":"0 fnt"},
                {"ident":"p1: D","active":false,"condition":"55/200 par"}
            ]}}"#,
        )
        .unwrap();
        let switches = request.legal_switches();
        assert_eq!(
            switches,
            vec![
                Choice::Switch {
                    slot: 2,
                    ident: "p1: B".into()
                },
                Choice::Switch {
                    slot: 4,
                    ident: "p1: D".into()
                },
            ]
        );
    }

    #[test]
    fn legal_moves_skip_disabled() {
        let request = BattleRequest::parse(
            r#"{"active":[{"moves":[
                {"move":"Tackle","id":"tackle","disabled":false},
                {"move":"Protect","id":"protect","disabled":true},
                {"move":"Taunt","id":"taunt","disabled":"hidden"},
                {"move":"Growl","id":"growl"}
            ]}],"rqid":9}"#,
        )
        .unwrap();
        let moves = request.legal_moves();
        assert_eq!(
            moves,
            vec![
                Choice::Move {
                    slot: 1,
                    id: "tackle".into()
                },
                Choice::Move {
                    slot: 4,
                    id: "growl".into()
                },
            ]
        );
    }

    #[test]
    fn challenge_update_parses_challengers() {
        let update = ChallengeUpdate::parse(
            r#"{"challengesFrom":{"alice":"gen8ou","bob":"gen8randombattle"},"challengeTo":null}"#,
        )
        .unwrap();
        assert_eq!(update.challenges_from.len(), 2);
        assert_eq!(update.challenges_from["alice"], "gen8ou");
    }
}
