//! Per-battle room sessions.
//!
//! Every battle room gets its own [`RoomSession`] task with a private
//! mailbox. The dispatcher is the only writer to the mailbox and the only
//! owner of the room table; a session reports its end on a channel and the
//! dispatcher removes it.
//!
//! Sessions hold no roster: the team is declared with `/utm` when the
//! challenge is accepted, before the battle room exists.
//!
//! ```text
//! Joining ──join sent──▶ Active ──win/tie──▶ Ending ──leave sent──▶ Closed
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::client::Outbox;
use crate::error::{Result, ShowdownError};
use crate::policy::DecisionPolicy;
use crate::protocol::{BattleRequest, Command, Message, MessageKind, RequestAction};

/// Lifecycle state of a room session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Joining,
    Active,
    Ending,
    Closed,
}

/// The dispatcher's handle to a running session.
#[derive(Debug)]
pub(crate) struct RoomHandle {
    pub(crate) mailbox: mpsc::UnboundedSender<Message>,
    pub(crate) state: watch::Receiver<SessionState>,
    pub(crate) task: tokio::task::JoinHandle<()>,
}

/// Start a session task for `room`.
pub(crate) fn spawn(
    room: String,
    outbox: Outbox,
    policy: Arc<dyn DecisionPolicy>,
    ended_tx: mpsc::UnboundedSender<String>,
) -> RoomHandle {
    let (mailbox, inbox) = mpsc::unbounded_channel();
    let session = RoomSession::new(room, inbox, outbox, policy, ended_tx);
    let state = session.subscribe();
    let task = tokio::spawn(session.run());
    RoomHandle {
        mailbox,
        state,
        task,
    }
}

/// State machine driving one battle room.
pub struct RoomSession {
    room: String,
    state: watch::Sender<SessionState>,
    inbox: mpsc::UnboundedReceiver<Message>,
    outbox: Outbox,
    policy: Arc<dyn DecisionPolicy>,
    ended_tx: mpsc::UnboundedSender<String>,
}

impl RoomSession {
    pub(crate) fn new(
        room: String,
        inbox: mpsc::UnboundedReceiver<Message>,
        outbox: Outbox,
        policy: Arc<dyn DecisionPolicy>,
        ended_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Joining);
        Self {
            room,
            state,
            inbox,
            outbox,
            policy,
            ended_tx,
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Join, then consume the mailbox until the battle ends or the
    /// dispatcher goes away.
    pub async fn run(mut self) {
        if let Err(e) = self.join() {
            warn!(room = %self.room, "could not join room: {e}");
            self.transition(SessionState::Closed);
            return;
        }

        while let Some(msg) = self.inbox.recv().await {
            match self.handle(msg) {
                Ok(()) => {}
                Err(ShowdownError::NotConnected) => break,
                Err(e) => warn!(room = %self.room, "failed to handle message: {e}"),
            }
            if self.state() == SessionState::Closed {
                return;
            }
        }

        debug!(room = %self.room, "mailbox closed");
        self.transition(SessionState::Closed);
    }

    /// Send the join command and become active.
    ///
    /// # Errors
    ///
    /// [`ShowdownError::NotConnected`] if the connection is gone.
    pub fn join(&mut self) -> Result<()> {
        self.outbox.send("", &Command::Join(self.room.clone()))?;
        self.transition(SessionState::Active);
        Ok(())
    }

    /// Process one message from the mailbox.
    ///
    /// Messages are ignored outside [`SessionState::Active`].
    ///
    /// # Errors
    ///
    /// Send failures, and [`ShowdownError::InvalidChoice`] from a policy that
    /// breaks its contract.
    pub fn handle(&mut self, msg: Message) -> Result<()> {
        if self.state() != SessionState::Active {
            return Ok(());
        }
        if msg.ends_match() {
            return self.end();
        }
        if msg.kind == MessageKind::Request {
            let payload = msg.payload();
            if !payload.trim().is_empty() {
                return self.respond(&payload);
            }
        }
        Ok(())
    }

    fn respond(&mut self, payload: &str) -> Result<()> {
        let request = match BattleRequest::parse(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(room = %self.room, "ignoring undecodable request: {e}");
                return Ok(());
            }
        };
        let rqid = request.rqid;

        let legal = match request.action() {
            RequestAction::Wait => {
                debug!(room = %self.room, "waiting on opponent");
                return Ok(());
            }
            RequestAction::TeamPreview => return self.send(Command::ChooseDefault { rqid }),
            RequestAction::ForceSwitch => request.legal_switches(),
            RequestAction::Move => request.legal_moves(),
        };

        if legal.is_empty() {
            warn!(room = %self.room, action = ?request.action(), "no legal choice, deferring to server default");
            return self.send(Command::ChooseDefault { rqid });
        }

        let choice = self.policy.choose(&legal)?;
        debug!(room = %self.room, %choice, options = legal.len(), "decision made");
        self.send(Command::Choose { choice, rqid })
    }

    fn end(&mut self) -> Result<()> {
        self.transition(SessionState::Ending);
        let left = self.send(Command::Leave);
        if self.ended_tx.send(self.room.clone()).is_err() {
            debug!(room = %self.room, "dispatcher gone before room end was reported");
        }
        self.transition(SessionState::Closed);
        info!(room = %self.room, "battle finished");
        left
    }

    fn send(&self, command: Command) -> Result<()> {
        self.outbox.send(&self.room, &command)
    }

    fn transition(&mut self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(room = %self.room, ?previous, ?next, "session state change");
        }
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
    use crate::policy::{Choice, RandomPolicy};
    use crate::protocol::decode_frame;
    use std::sync::atomic::AtomicBool;

    struct Harness {
        session: RoomSession,
        mailbox: mpsc::UnboundedSender<Message>,
        frames: mpsc::UnboundedReceiver<String>,
        ended: mpsc::UnboundedReceiver<String>,
    }

    fn harness(policy: Arc<dyn DecisionPolicy>) -> Harness {
        let (frame_tx, frames) = mpsc::unbounded_channel();
        let (ended_tx, ended) = mpsc::unbounded_channel();
        let (mailbox, inbox) = mpsc::unbounded_channel();
        let outbox = Outbox::new(frame_tx, Arc::new(AtomicBool::new(true)));
        Harness {
            session: RoomSession::new("battle-gen8ou-1".into(), inbox, outbox, policy, ended_tx),
            mailbox,
            frames,
            ended,
        }
    }

    fn drain(frames: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = frames.try_recv() {
            out.push(frame);
        }
        out
    }

    fn request(json: &str) -> Message {
        decode_frame(&format!(">battle-gen8ou-1\n|request|{json}"))
            .pop()
            .unwrap()
    }

    fn win() -> Message {
        decode_frame(">battle-gen8ou-1\n|\n|win|alice").pop().unwrap()
    }

    const FORCE_SWITCH: &str = r#"{"forceSwitch":[true],"rqid":5,"side":{"pokemon":[
        {"ident":"p1: A","active":true,"condition":"0 fnt"},
        {"ident":"p1: B","active":false,"condition":"100/100"},
        {"ident":"p1: C","active":false,"condition":"50/100"}
    ]}}"#;

    /// Always picks the last option.
    struct LastPolicy;

    impl DecisionPolicy for LastPolicy {
        fn choose(&self, options: &[Choice]) -> Result<Choice> {
            options.last().cloned().ok_or(ShowdownError::InvalidChoice)
        }
    }

    #[test]
    fn join_sends_join_and_activates() {
        let mut h = harness(Arc::new(RandomPolicy));
        assert_eq!(h.session.state(), SessionState::Joining);
        h.session.join().unwrap();
        assert_eq!(h.session.state(), SessionState::Active);
        assert_eq!(drain(&mut h.frames), vec!["|/join battle-gen8ou-1"]);
    }

    #[test]
    fn wait_switch_end_sequence() {
        let mut h = harness(Arc::new(RandomPolicy));
        h.session.join().unwrap();
        drain(&mut h.frames);

        h.session.handle(request(r#"{"wait":true}"#)).unwrap();
        assert_eq!(h.session.state(), SessionState::Active);
        assert!(drain(&mut h.frames).is_empty());

        h.session.handle(request(FORCE_SWITCH)).unwrap();
        assert_eq!(h.session.state(), SessionState::Active);
        let frames = drain(&mut h.frames);
        assert_eq!(frames.len(), 1);
        assert!(
            frames[0] == "battle-gen8ou-1|/choose switch 2|5"
                || frames[0] == "battle-gen8ou-1|/choose switch 3|5",
            "unexpected switch frame {frames:?}"
        );

        h.session.handle(win()).unwrap();
        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(drain(&mut h.frames), vec!["battle-gen8ou-1|/leave"]);
        assert_eq!(h.ended.try_recv().unwrap(), "battle-gen8ou-1");
    }

    #[test]
    fn move_request_uses_policy_over_enabled_moves() {
        let mut h = harness(Arc::new(LastPolicy));
        h.session.join().unwrap();
        drain(&mut h.frames);

        h.session
            .handle(request(
                r#"{"active":[{"moves":[
                    {"move":"Tackle","id":"tackle","disabled":false},
                    {"move":"Surf","id":"surf","disabled":false},
                    {"move":"Protect","id":"protect","disabled":true}
                ]}],"rqid":2}"#,
            ))
            .unwrap();
        assert_eq!(
            drain(&mut h.frames),
            vec!["battle-gen8ou-1|/choose move 2|2"]
        );
    }

    #[test]
    fn empty_legal_set_falls_back_to_default() {
        let mut h = harness(Arc::new(RandomPolicy));
        h.session.join().unwrap();
        drain(&mut h.frames);

        h.session
            .handle(request(
                r#"{"active":[{"moves":[{"move":"Tackle","id":"tackle","disabled":true}]}]}"#,
            ))
            .unwrap();
        assert_eq!(
            drain(&mut h.frames),
            vec!["battle-gen8ou-1|/choose default"]
        );
    }

    #[test]
    fn team_preview_chooses_default() {
        let mut h = harness(Arc::new(RandomPolicy));
        h.session.join().unwrap();
        drain(&mut h.frames);

        h.session
            .handle(request(r#"{"teamPreview":true,"rqid":1}"#))
            .unwrap();
        assert_eq!(
            drain(&mut h.frames),
            vec!["battle-gen8ou-1|/choose default|1"]
        );
    }

    #[test]
    fn empty_or_malformed_requests_are_ignored() {
        let mut h = harness(Arc::new(RandomPolicy));
        h.session.join().unwrap();
        drain(&mut h.frames);

        h.session
            .handle(Message::decode("battle-gen8ou-1|request|"))
            .unwrap();
        h.session.handle(request("{not json")).unwrap();
        assert_eq!(h.session.state(), SessionState::Active);
        assert!(drain(&mut h.frames).is_empty());
    }

    #[test]
    fn messages_after_close_are_ignored() {
        let mut h = harness(Arc::new(RandomPolicy));
        h.session.join().unwrap();
        h.session.handle(win()).unwrap();
        drain(&mut h.frames);

        h.session.handle(request(FORCE_SWITCH)).unwrap();
        assert!(drain(&mut h.frames).is_empty());
    }

    #[tokio::test]
    async fn run_consumes_mailbox_until_end() {
        let h = harness(Arc::new(RandomPolicy));
        let Harness {
            session,
            mailbox,
            mut frames,
            mut ended,
        } = h;
        let state = session.subscribe();

        mailbox.send(request(r#"{"wait":true}"#)).unwrap();
        mailbox.send(request(FORCE_SWITCH)).unwrap();
        mailbox.send(win()).unwrap();
        session.run().await;

        assert_eq!(*state.borrow(), SessionState::Closed);
        let sent = drain(&mut frames);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], "|/join battle-gen8ou-1");
        assert!(sent[1].starts_with("battle-gen8ou-1|/choose switch "));
        assert_eq!(sent[2], "battle-gen8ou-1|/leave");
        assert_eq!(ended.recv().await.unwrap(), "battle-gen8ou-1");
    }

    #[tokio::test]
    async fn run_closes_quietly_when_mailbox_drops() {
        let Harness {
            session,
            mailbox,
            mut frames,
            mut ended,
            ..
        } = harness(Arc::new(RandomPolicy));
        let state = session.subscribe();
        drop(mailbox);
        session.run().await;

        assert_eq!(*state.borrow(), SessionState::Closed);
        assert_eq!(drain(&mut frames), vec!["|/join battle-gen8ou-1"]);
        assert!(ended.try_recv().is_err());
    }

    #[test]
    fn disconnected_outbox_fails_join() {
        let (frame_tx, _frames) = mpsc::unbounded_channel();
        let (ended_tx, _ended) = mpsc::unbounded_channel();
        let (_mailbox, inbox) = mpsc::unbounded_channel();
        let outbox = Outbox::new(frame_tx, Arc::new(AtomicBool::new(false)));
        let mut session =
            RoomSession::new("battle-x".into(), inbox, outbox, Arc::new(RandomPolicy), ended_tx);
        assert!(matches!(session.join(), Err(ShowdownError::NotConnected)));
        assert_eq!(session.state(), SessionState::Joining);
    }
}
