//! Notifications emitted by the client to the embedding application.

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Something the client observed or did.
///
/// Events are delivered on the bounded channel returned by
/// `ShowdownClient::start`. When the consumer falls behind, events are dropped
/// with a warning, except [`Disconnected`](ShowdownEvent::Disconnected), which
/// is always delivered and is always the last event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowdownEvent {
    /// The dispatcher is running.
    Connected,
    /// The server accepted our login.
    LoggedIn { username: String },
    /// A battle room was opened and a session started for it.
    RoomOpened { room: String },
    /// A battle room session ended and was removed.
    RoomClosed { room: String },
    /// A challenge was answered.
    ChallengeAnswered {
        challenger: String,
        format: String,
        accepted: bool,
    },
    /// The server sent an `error` message.
    ServerError { room: String, message: String },
    /// The connection ended.
    Disconnected { reason: Option<String> },
}

/// Queue an event without waiting. A full channel drops the event.
pub(crate) fn emit(event_tx: &mpsc::Sender<ShowdownEvent>, event: ShowdownEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Deliver [`ShowdownEvent::Disconnected`], waiting for room if needed.
pub(crate) async fn emit_disconnected(
    event_tx: &mpsc::Sender<ShowdownEvent>,
    reason: Option<String>,
) {
    if event_tx
        .send(ShowdownEvent::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("event channel closed, receiver dropped");
    }
}
