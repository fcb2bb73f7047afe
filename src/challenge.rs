//! Answers incoming battle challenges from the roster.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::client::Outbox;
use crate::error::Result;
use crate::event::{self, ShowdownEvent};
use crate::protocol::{ChallengeUpdate, Command};
use crate::roster::Roster;

/// Accepts challenges for formats the roster covers and declines the rest.
///
/// Cheap to clone; the dispatcher hands a clone to a fresh task for every
/// `updatechallenges` notification.
#[derive(Debug, Clone)]
pub struct ChallengeManager {
    roster: Arc<RwLock<Roster>>,
    outbox: Outbox,
    event_tx: mpsc::Sender<ShowdownEvent>,
    decline_message: Arc<str>,
}

impl ChallengeManager {
    pub(crate) fn new(
        roster: Arc<RwLock<Roster>>,
        outbox: Outbox,
        event_tx: mpsc::Sender<ShowdownEvent>,
        decline_message: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            roster,
            outbox,
            event_tx,
            decline_message: decline_message.into(),
        }
    }

    /// Answer every challenge in an `updatechallenges` payload.
    ///
    /// Undecodable payloads are logged and dropped.
    pub async fn handle(&self, payload: &str) {
        let update = match ChallengeUpdate::parse(payload) {
            Ok(update) => update,
            Err(e) => {
                warn!("ignoring undecodable challenge update: {e} (raw: {payload})");
                return;
            }
        };
        if update.challenges_from.is_empty() {
            debug!("no pending challenges");
            return;
        }

        for (challenger, format) in update.challenges_from {
            match self.answer(&challenger, &format).await {
                Ok(accepted) => event::emit(
                    &self.event_tx,
                    ShowdownEvent::ChallengeAnswered {
                        challenger,
                        format,
                        accepted,
                    },
                ),
                Err(e) => warn!(%challenger, %format, "could not answer challenge: {e}"),
            }
        }
    }

    /// Send the two commands answering one challenge. Returns whether it was
    /// accepted.
    ///
    /// # Errors
    ///
    /// [`ShowdownError::NotConnected`](crate::ShowdownError::NotConnected) if
    /// the connection is gone.
    pub async fn answer(&self, challenger: &str, format: &str) -> Result<bool> {
        let team = self
            .roster
            .read()
            .await
            .team_for(format)
            .map(|slot| slot.wire_value().to_owned());

        match team {
            Some(team) => {
                info!(%challenger, %format, "accepting challenge");
                self.outbox.send("", &Command::UseTeam(team))?;
                self.outbox.send("", &Command::Accept(challenger.to_owned()))?;
                Ok(true)
            }
            None => {
                info!(%challenger, %format, "declining challenge, no team for format");
                self.outbox.send(
                    "",
                    &Command::PrivateMessage {
                        to: challenger.to_owned(),
                        text: self.decline_message.to_string(),
                    },
                )?;
                self.outbox.send("", &Command::Reject(challenger.to_owned()))?;
                Ok(false)
            }
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
    use crate::error::ShowdownError;
    use std::sync::atomic::AtomicBool;

    const PACKED: &str = "Pikachu||lightball|static|thunderbolt||,,,,,||,,,,,|||";

    struct Harness {
        manager: ChallengeManager,
        frames: mpsc::UnboundedReceiver<String>,
        events: mpsc::Receiver<ShowdownEvent>,
    }

    fn harness(roster: Roster, connected: bool) -> Harness {
        let (frame_tx, frames) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::channel(16);
        let outbox = Outbox::new(frame_tx, Arc::new(AtomicBool::new(connected)));
        Harness {
            manager: ChallengeManager::new(
                Arc::new(RwLock::new(roster)),
                outbox,
                event_tx,
                "no team, sorry",
            ),
            frames,
            events,
        }
    }

    fn drain(frames: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = frames.try_recv() {
            out.push(frame);
        }
        out
    }

    #[tokio::test]
    async fn registered_team_is_declared_then_accepted() {
        let mut roster = Roster::new();
        roster.load_packed("gen8ou", PACKED).unwrap();
        let mut h = harness(roster, true);

        h.manager
            .handle(r#"{"challengesFrom":{"alice":"gen8ou"},"challengeTo":null}"#)
            .await;

        assert_eq!(
            drain(&mut h.frames),
            vec![format!("|/utm {PACKED}"), "|/accept alice".to_string()]
        );
        assert_eq!(
            h.events.try_recv().unwrap(),
            ShowdownEvent::ChallengeAnswered {
                challenger: "alice".into(),
                format: "gen8ou".into(),
                accepted: true,
            }
        );
    }

    #[tokio::test]
    async fn sentinel_format_declares_null_team() {
        let mut h = harness(Roster::with_no_team_formats(["gen8randombattle"]), true);
        h.manager
            .handle(r#"{"challengesFrom":{"bob":"gen8randombattle"}}"#)
            .await;
        assert_eq!(
            drain(&mut h.frames),
            vec!["|/utm null", "|/accept bob"]
        );
    }

    #[tokio::test]
    async fn unknown_format_is_declined_then_rejected() {
        let mut h = harness(Roster::new(), true);
        h.manager
            .handle(r#"{"challengesFrom":{"carol":"gen1ou"}}"#)
            .await;
        assert_eq!(
            drain(&mut h.frames),
            vec!["|/pm carol, no team, sorry", "|/reject carol"]
        );
        assert_eq!(
            h.events.try_recv().unwrap(),
            ShowdownEvent::ChallengeAnswered {
                challenger: "carol".into(),
                format: "gen1ou".into(),
                accepted: false,
            }
        );
    }

    #[tokio::test]
    async fn each_challenger_gets_its_own_pair() {
        let mut h = harness(Roster::with_no_team_formats(["gen9randombattle"]), true);
        h.manager
            .handle(r#"{"challengesFrom":{"alice":"gen9randombattle","bob":"gen2ou"}}"#)
            .await;
        let frames = drain(&mut h.frames);
        assert_eq!(frames.len(), 4);
        let alice = frames.iter().position(|f| f == "|/utm null").unwrap();
        assert_eq!(frames[alice + 1], "|/accept alice");
        let bob = frames.iter().position(|f| f.starts_with("|/pm bob,")).unwrap();
        assert_eq!(frames[bob + 1], "|/reject bob");
    }

    #[tokio::test]
    async fn malformed_or_empty_updates_send_nothing() {
        let mut h = harness(Roster::new(), true);
        h.manager.handle("{oops").await;
        h.manager.handle(r#"{"challengesFrom":{}}"#).await;
        h.manager.handle("{}").await;
        assert!(drain(&mut h.frames).is_empty());
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn answer_fails_when_disconnected() {
        let h = harness(Roster::new(), false);
        let err = h.manager.answer("dave", "gen8ou").await.unwrap_err();
        assert!(matches!(err, ShowdownError::NotConnected));
    }
}
