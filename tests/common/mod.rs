#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Showdown client integration tests.
//!
//! Provides two mock transports and builders for common server frames:
//!
//! - [`MockTransport`] replays a fixed script, then hangs.
//! - [`ServerHandle`]/[`ChannelTransport`] lets a test push frames while the
//!   client is running.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use showdown_client::{ShowdownError, ShowdownEvent, Transport};
use tokio::sync::mpsc;

pub type Sent = Arc<StdMutex<Vec<String>>>;

// ── MockTransport ───────────────────────────────────────────────────

/// Scripted transport. Frames are consumed in order by `recv()`; every frame
/// the client writes is recorded in `sent`.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, ShowdownError>>>,
    pub sent: Sent,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(
        incoming: Vec<Option<Result<String, ShowdownError>>>,
    ) -> (Self, Sent, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), ShowdownError> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ShowdownError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // Script exhausted: stay open until the client closes.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), ShowdownError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── ChannelTransport ────────────────────────────────────────────────

/// Transport fed from a [`ServerHandle`].
pub struct ChannelTransport {
    incoming: mpsc::UnboundedReceiver<Option<String>>,
    sent: Sent,
    closed: Arc<AtomicBool>,
}

/// Test side of a [`ChannelTransport`].
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<Option<String>>,
    pub sent: Sent,
    pub closed: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Deliver one raw frame to the client.
    pub fn push(&self, frame: impl Into<String>) {
        self.tx.send(Some(frame.into())).unwrap();
    }

    /// Close the connection from the server side.
    pub fn hang_up(&self) {
        self.tx.send(None).unwrap();
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

pub fn channel_transport() -> (ChannelTransport, ServerHandle) {
    let (tx, incoming) = mpsc::unbounded_channel();
    let sent = Arc::new(StdMutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    (
        ChannelTransport {
            incoming,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        },
        ServerHandle { tx, sent, closed },
    )
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, frame: String) -> Result<(), ShowdownError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ShowdownError::TransportClosed);
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ShowdownError>> {
        match self.incoming.recv().await {
            Some(Some(frame)) => Some(Ok(frame)),
            // Hang-up or every handle dropped.
            Some(None) | None => None,
        }
    }

    async fn close(&mut self) -> Result<(), ShowdownError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ── Frame builders ──────────────────────────────────────────────────

pub fn scripted(frame: impl Into<String>) -> Option<Result<String, ShowdownError>> {
    Some(Ok(frame.into()))
}

pub fn challstr_frame() -> String {
    "|challstr|4|0123456789abcdef".to_owned()
}

pub fn init_frame(room: &str) -> String {
    format!(">{room}\n|init|battle\n|title|bot vs. rival\n|j|☆bot")
}

pub fn request_frame(room: &str, json: &str) -> String {
    format!(">{room}\n|request|{json}")
}

pub fn win_frame(room: &str, winner: &str) -> String {
    format!(">{room}\n|\n|win|{winner}")
}

pub fn tie_frame(room: &str) -> String {
    format!(">{room}\n|\n|tie")
}

pub fn challenges_frame(from: &[(&str, &str)]) -> String {
    let map: serde_json::Map<String, serde_json::Value> = from
        .iter()
        .map(|(user, format)| ((*user).to_owned(), serde_json::Value::from(*format)))
        .collect();
    let payload = serde_json::json!({ "challengesFrom": map, "challengeTo": null });
    format!("|updatechallenges|{payload}")
}

/// A forced-switch request with one fainted active member and `bench`
/// healthy party members.
pub fn force_switch_json(rqid: u64, bench: usize) -> String {
    let mut pokemon = vec![serde_json::json!({
        "ident": "p1: Lead",
        "active": true,
        "condition": "0 fnt",
    })];
    for i in 0..bench {
        pokemon.push(serde_json::json!({
            "ident": format!("p1: Bench{i}"),
            "active": false,
            "condition": "100/100",
        }));
    }
    serde_json::json!({
        "forceSwitch": [true],
        "rqid": rqid,
        "side": { "name": "bot", "id": "p1", "pokemon": pokemon },
    })
    .to_string()
}

/// A move request where each `(id, disabled)` pair is one move slot.
pub fn move_request_json(rqid: u64, moves: &[(&str, bool)]) -> String {
    let moves: Vec<_> = moves
        .iter()
        .map(|(id, disabled)| {
            serde_json::json!({ "move": id, "id": id, "pp": 10, "maxpp": 10, "disabled": disabled })
        })
        .collect();
    serde_json::json!({ "active": [{ "moves": moves }], "rqid": rqid }).to_string()
}

// ── Waiting helpers ─────────────────────────────────────────────────

/// Give the dispatcher and sessions a moment to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Receive events until one matches, failing after a second.
pub async fn expect_event(
    events: &mut mpsc::Receiver<ShowdownEvent>,
    mut matches: impl FnMut(&ShowdownEvent) -> bool,
) -> ShowdownEvent {
    let wait = async {
        loop {
            match events.recv().await {
                Some(event) if matches(&event) => return event,
                Some(_) => {}
                None => panic!("event channel closed while waiting"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(1), wait)
        .await
        .expect("timed out waiting for event")
}
