//! Async battle client: connection manager and dispatcher.
//!
//! [`ShowdownClient`] is a thin handle over a background dispatcher task. The
//! dispatcher is the only reader of the transport. It routes every decoded
//! message to a room session, the challenge manager, or the login latch, and
//! it is the only writer of outbound frames, which reach it over an
//! unbounded channel so frames from different tasks never interleave.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect(DEFAULT_SERVER_URL).await?;
//! let (mut client, mut events) = ShowdownClient::start(transport, ShowdownConfig::new());
//!
//! client.login(&Credentials::from_json_file("login.json")?).await?;
//! client.load_team_file("gen8ou", "team.txt", None).await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ShowdownEvent::RoomClosed { room } => println!("finished {room}"),
//!         ShowdownEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::auth::{Authenticator, Challstr, Credentials, LoginRequest};
use crate::challenge::ChallengeManager;
use crate::error::{Result, ShowdownError};
use crate::event::{self, ShowdownEvent};
use crate::policy::{DecisionPolicy, RandomPolicy};
use crate::protocol::{decode_frame, encode_frame, Command, Message, MessageKind};
use crate::roster::Roster;
use crate::session::{self, RoomHandle, SessionState};
use crate::team::{TeamEncoding, UnsetStats};
use crate::transport::Transport;

/// Public battle server websocket endpoint.
pub const DEFAULT_SERVER_URL: &str = "ws://sim.smogon.com:8000/showdown/websocket";

/// Public login endpoint.
pub const DEFAULT_LOGIN_URL: &str = "https://play.pokemonshowdown.com/action.php";

/// Formats where the server builds the team.
pub const DEFAULT_NO_TEAM_FORMATS: [&str; 2] = ["gen8randombattle", "gen9randombattle"];

/// Private message sent before rejecting a challenge.
pub const DEFAULT_DECLINE_MESSAGE: &str = "Sorry, I don't have a team for that format.";

const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`ShowdownClient`].
///
/// ```
/// use showdown_client::client::ShowdownConfig;
/// use std::time::Duration;
///
/// let config = ShowdownConfig::new()
///     .with_no_team_formats(["gen9randombattle"])
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.no_team_formats, vec!["gen9randombattle".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct ShowdownConfig {
    /// Websocket URL of the battle server. Used by callers that build a
    /// [`WebSocketTransport`](crate::transports::WebSocketTransport).
    pub server_url: String,
    /// Login endpoint used by [`ShowdownClient::login`].
    pub login_url: String,
    /// Formats pre-registered in the roster as needing no team.
    pub no_team_formats: Vec<String>,
    /// Text sent to a challenger before rejecting them.
    pub decline_message: String,
    /// How team export text writes EVs and IVs it does not mention.
    pub unset_stats: UnsetStats,
    /// Capacity of the bounded event channel.
    ///
    /// Events are dropped with a warning when the consumer falls behind,
    /// except `Disconnected`. Defaults to **256**. Values below 1 are clamped
    /// to 1.
    pub event_channel_capacity: usize,
    /// How long [`ShowdownClient::close`] waits for the dispatcher before
    /// aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl Default for ShowdownConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_owned(),
            login_url: DEFAULT_LOGIN_URL.to_owned(),
            no_team_formats: DEFAULT_NO_TEAM_FORMATS.map(String::from).to_vec(),
            decline_message: DEFAULT_DECLINE_MESSAGE.to_owned(),
            unset_stats: UnsetStats::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ShowdownConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    #[must_use]
    pub fn with_login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = url.into();
        self
    }

    /// Replace the set of formats that need no team.
    #[must_use]
    pub fn with_no_team_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.no_team_formats = formats.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_decline_message(mut self, message: impl Into<String>) -> Self {
        self.decline_message = message.into();
        self
    }

    #[must_use]
    pub fn with_unset_stats(mut self, unset_stats: UnsetStats) -> Self {
        self.unset_stats = unset_stats;
        self
    }

    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// A zero timeout aborts the dispatcher without waiting.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Outbound frames ─────────────────────────────────────────────────

/// Shared send primitive.
///
/// Queues one encoded frame for the dispatcher to write. Every task that
/// talks to the server (the client handle, room sessions, the challenge
/// manager) holds a clone.
#[derive(Debug, Clone)]
pub struct Outbox {
    frames: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
}

impl Outbox {
    pub(crate) fn new(frames: mpsc::UnboundedSender<String>, connected: Arc<AtomicBool>) -> Self {
        Self { frames, connected }
    }

    /// Queue `command` for `room` (empty for global commands).
    ///
    /// # Errors
    ///
    /// [`ShowdownError::NotConnected`] after the connection has ended.
    pub fn send(&self, room: &str, command: &Command) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ShowdownError::NotConnected);
        }
        let frame = encode_frame(room, command);
        trace!(room, "queueing frame");
        self.frames
            .send(frame)
            .map_err(|_| ShowdownError::NotConnected)
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the client handle and the dispatcher.
#[derive(Debug)]
struct ClientState {
    connected: Arc<AtomicBool>,
    logged_in: AtomicBool,
    /// Room id to session. Only the dispatcher inserts or removes.
    rooms: Mutex<HashMap<String, RoomHandle>>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(true)),
            logged_in: AtomicBool::new(false),
            rooms: Mutex::new(HashMap::new()),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running battle client.
///
/// Created with [`ShowdownClient::start`], which spawns the dispatcher and
/// returns this handle together with the event receiver.
pub struct ShowdownClient {
    outbox: Outbox,
    state: Arc<ClientState>,
    roster: Arc<RwLock<Roster>>,
    challstr: watch::Receiver<Option<Challstr>>,
    event_tx: mpsc::Sender<ShowdownEvent>,
    #[cfg_attr(not(feature = "http-login"), allow(dead_code))]
    login_url: String,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl ShowdownClient {
    /// Start the dispatcher over a connected transport, deciding battles
    /// with [`RandomPolicy`].
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        config: ShowdownConfig,
    ) -> (Self, mpsc::Receiver<ShowdownEvent>) {
        Self::start_with_policy(transport, config, Arc::new(RandomPolicy))
    }

    /// Start the dispatcher with a custom decision policy.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start_with_policy(
        transport: impl Transport,
        config: ShowdownConfig,
        policy: Arc<dyn DecisionPolicy>,
    ) -> (Self, mpsc::Receiver<ShowdownEvent>) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<String>();
        // tokio panics on a zero-capacity channel.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ShowdownEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (challstr_tx, challstr_rx) = watch::channel(None);
        let (ended_tx, ended_rx) = mpsc::unbounded_channel::<String>();

        let state = Arc::new(ClientState::new());
        let outbox = Outbox::new(frame_tx, Arc::clone(&state.connected));
        let roster = Arc::new(RwLock::new(
            Roster::with_no_team_formats(config.no_team_formats.iter().cloned())
                .with_unset_stats(config.unset_stats),
        ));

        let dispatcher = Dispatcher {
            state: Arc::clone(&state),
            outbox: outbox.clone(),
            policy,
            challenges: ChallengeManager::new(
                Arc::clone(&roster),
                outbox.clone(),
                event_tx.clone(),
                config.decline_message,
            ),
            challstr_tx,
            ended_tx,
            event_tx: event_tx.clone(),
        };

        let task = tokio::spawn(dispatch_loop(
            transport,
            dispatcher,
            frame_rx,
            ended_rx,
            shutdown_rx,
        ));

        let client = Self {
            outbox,
            state,
            roster,
            challstr: challstr_rx,
            event_tx,
            login_url: config.login_url,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Login ───────────────────────────────────────────────────────

    /// Log in through the configured HTTP login endpoint.
    ///
    /// # Errors
    ///
    /// See [`login_with`](Self::login_with).
    #[cfg(feature = "http-login")]
    pub async fn login(&mut self, credentials: &Credentials) -> Result<()> {
        let authenticator = crate::auth::HttpAuthenticator::new(self.login_url.clone());
        self.login_with(credentials, &authenticator).await
    }

    /// Log in with a custom [`Authenticator`].
    ///
    /// Waits for the server's `challstr` (one that already arrived is used
    /// immediately), exchanges it for an assertion, and confirms with `/trn`.
    ///
    /// # Errors
    ///
    /// - [`ShowdownError::NotConnected`] if the connection ends before a
    ///   challstr arrives.
    /// - [`ShowdownError::Auth`] if the exchange fails. The client is closed
    ///   before this is returned.
    pub async fn login_with<A>(&mut self, credentials: &Credentials, authenticator: &A) -> Result<()>
    where
        A: Authenticator + ?Sized,
    {
        let challstr = self.wait_for_challstr().await?;
        debug!(username = %credentials.username, key_id = %challstr.key_id, "challstr received");

        let request = LoginRequest::new(credentials, &challstr);
        let assertion = match authenticator.authenticate(&request).await {
            Ok(assertion) => assertion,
            Err(e) => {
                warn!(username = %credentials.username, "login failed: {e}");
                self.close().await;
                return Err(match e {
                    ShowdownError::Auth(_) => e,
                    other => ShowdownError::Auth(other.to_string()),
                });
            }
        };

        self.send(
            &Command::Trn {
                username: credentials.username.clone(),
                assertion,
            },
            "",
        )?;
        self.state.logged_in.store(true, Ordering::Release);
        info!(username = %credentials.username, "logged in");
        event::emit(
            &self.event_tx,
            ShowdownEvent::LoggedIn {
                username: credentials.username.clone(),
            },
        );
        Ok(())
    }

    async fn wait_for_challstr(&self) -> Result<Challstr> {
        if !self.is_connected() {
            return Err(ShowdownError::NotConnected);
        }
        let mut challstr = self.challstr.clone();
        let latched = challstr
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ShowdownError::NotConnected)?
            .clone();
        latched.ok_or(ShowdownError::NotConnected)
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Queue one command for `room` (empty for global commands).
    ///
    /// # Errors
    ///
    /// [`ShowdownError::NotConnected`] after close or disconnect.
    pub fn send(&self, command: &Command, room: &str) -> Result<()> {
        self.outbox.send(room, command)
    }

    /// A clone of the shared send primitive.
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Forfeit every open battle, close the transport, and stop the
    /// dispatcher.
    ///
    /// Waits up to the configured shutdown timeout before aborting the
    /// dispatcher. Calling it again is a no-op.
    pub async fn close(&mut self) {
        debug!("close requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("dispatcher terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("dispatcher did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("dispatcher aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
        self.state.logged_in.store(false, Ordering::Release);
        for (_, handle) in self.state.rooms.lock().await.drain() {
            handle.task.abort();
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.logged_in.load(Ordering::Acquire)
    }

    /// Ids of rooms with a live session, sorted.
    pub async fn active_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.state.rooms.lock().await.keys().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Current state of the session for `room`, if one is registered.
    pub async fn room_state(&self, room: &str) -> Option<SessionState> {
        self.state
            .rooms
            .lock()
            .await
            .get(room)
            .map(|handle| *handle.state.borrow())
    }

    /// The roster consulted when answering challenges.
    pub fn roster(&self) -> Arc<RwLock<Roster>> {
        Arc::clone(&self.roster)
    }

    /// Load a team file into the roster for `format`.
    ///
    /// # Errors
    ///
    /// As [`Roster::load_file`].
    pub async fn load_team_file(
        &self,
        format: &str,
        path: impl AsRef<Path>,
        encoding: Option<TeamEncoding>,
    ) -> Result<()> {
        self.roster.write().await.load_file(format, path, encoding)
    }
}

impl std::fmt::Debug for ShowdownClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShowdownClient")
            .field("connected", &self.is_connected())
            .field("logged_in", &self.is_logged_in())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ShowdownClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close here; aborting drops the
        // dispatcher future and the transport with it.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Dispatcher ──────────────────────────────────────────────────────

struct Dispatcher {
    state: Arc<ClientState>,
    outbox: Outbox,
    policy: Arc<dyn DecisionPolicy>,
    challenges: ChallengeManager,
    challstr_tx: watch::Sender<Option<Challstr>>,
    ended_tx: mpsc::UnboundedSender<String>,
    event_tx: mpsc::Sender<ShowdownEvent>,
}

/// Background loop multiplexing outbound frames, session ends, shutdown and
/// inbound frames via `tokio::select!`.
///
/// Exits when:
/// - [`ShowdownClient::close`] signals shutdown
/// - the transport returns `None` (server closed the connection)
/// - a transport error occurs
async fn dispatch_loop(
    mut transport: impl Transport,
    dispatcher: Dispatcher,
    mut frame_rx: mpsc::UnboundedReceiver<String>,
    mut ended_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("dispatcher started");
    event::emit(&dispatcher.event_tx, ShowdownEvent::Connected);

    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = transport.send(frame).await {
                            error!("transport send error: {e}");
                            dispatcher
                                .disconnect(Some(format!("transport send error: {e}")))
                                .await;
                            break;
                        }
                    }
                    None => {
                        debug!("frame channel closed, stopping dispatcher");
                        let _ = transport.close().await;
                        dispatcher.disconnect(Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                dispatcher.forfeit_all(&mut transport, &mut frame_rx).await;
                let _ = transport.close().await;
                dispatcher.disconnect(Some("client shut down".into())).await;
                break;
            }

            Some(room) = ended_rx.recv() => {
                dispatcher.remove_room(&room).await;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(raw)) => {
                        for msg in decode_frame(&raw) {
                            dispatcher.dispatch(msg).await;
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        dispatcher
                            .disconnect(Some(format!("transport receive error: {e}")))
                            .await;
                        break;
                    }
                    None => {
                        debug!("transport closed by server");
                        dispatcher.disconnect(None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("dispatcher exited");
}

impl Dispatcher {
    /// Route one decoded message.
    async fn dispatch(&self, msg: Message) {
        if !msg.is_global() {
            let mailbox = self
                .state
                .rooms
                .lock()
                .await
                .get(&msg.room)
                .map(|handle| handle.mailbox.clone());
            if let Some(mailbox) = mailbox {
                if mailbox.send(msg).is_err() {
                    debug!("session mailbox closed, dropping message");
                }
                return;
            }
        }

        match &msg.kind {
            MessageKind::UpdateChallenges if msg.is_global() => {
                let challenges = self.challenges.clone();
                let payload = msg.payload();
                tokio::spawn(async move { challenges.handle(&payload).await });
            }
            MessageKind::Init if !msg.is_global() => self.open_room(msg.room).await,
            MessageKind::Error => {
                let message = msg.payload();
                warn!(room = %msg.room, "server error: {message}");
                event::emit(
                    &self.event_tx,
                    ShowdownEvent::ServerError {
                        room: msg.room,
                        message,
                    },
                );
            }
            MessageKind::Challstr if msg.is_global() => match Challstr::from_content(&msg.content) {
                Some(challstr) => {
                    debug!(key_id = %challstr.key_id, "challstr latched");
                    self.challstr_tx.send_replace(Some(challstr));
                }
                None => warn!("malformed challstr: {}", msg.payload()),
            },
            other => trace!(room = %msg.room, kind = other.as_str(), "ignoring message"),
        }
    }

    async fn open_room(&self, room: String) {
        let handle = session::spawn(
            room.clone(),
            self.outbox.clone(),
            Arc::clone(&self.policy),
            self.ended_tx.clone(),
        );
        if let Some(stale) = self.state.rooms.lock().await.insert(room.clone(), handle) {
            stale.task.abort();
        }
        info!(%room, "battle room opened");
        event::emit(&self.event_tx, ShowdownEvent::RoomOpened { room });
    }

    async fn remove_room(&self, room: &str) {
        if self.state.rooms.lock().await.remove(room).is_some() {
            debug!(%room, "session removed");
            event::emit(
                &self.event_tx,
                ShowdownEvent::RoomClosed {
                    room: room.to_owned(),
                },
            );
        }
    }

    /// Flush queued frames, then forfeit and drop every open session.
    async fn forfeit_all(
        &self,
        transport: &mut impl Transport,
        frame_rx: &mut mpsc::UnboundedReceiver<String>,
    ) {
        self.state.connected.store(false, Ordering::Release);

        while let Ok(frame) = frame_rx.try_recv() {
            if let Err(e) = transport.send(frame).await {
                warn!("failed to flush queued frame: {e}");
                break;
            }
        }

        let rooms: Vec<(String, RoomHandle)> = self.state.rooms.lock().await.drain().collect();
        for (room, handle) in rooms {
            handle.task.abort();
            info!(%room, "forfeiting battle");
            if let Err(e) = transport.send(encode_frame(&room, &Command::Forfeit)).await {
                warn!(%room, "failed to send forfeit: {e}");
            }
        }
    }

    /// Mark the connection dead, stop all sessions, and emit `Disconnected`.
    async fn disconnect(&self, reason: Option<String>) {
        self.state.connected.store(false, Ordering::Release);
        self.state.logged_in.store(false, Ordering::Release);
        for (_, handle) in self.state.rooms.lock().await.drain() {
            handle.task.abort();
        }
        event::emit_disconnected(&self.event_tx, reason).await;
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// Records sent frames and replays scripted incoming frames.
    struct MockTransport {
        incoming: VecDeque<Option<Result<String>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<Result<String>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
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
        async fn send(&mut self, frame: String) -> Result<()> {
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    struct FixedAuthenticator(Result<&'static str>);

    #[async_trait]
    impl Authenticator for FixedAuthenticator {
        async fn authenticate(&self, request: &LoginRequest) -> Result<String> {
            assert_eq!(request.challstr, "4|abcdef");
            match &self.0 {
                Ok(assertion) => Ok((*assertion).to_owned()),
                Err(_) => Err(ShowdownError::Auth("rejected".into())),
            }
        }
    }

    fn frame(text: &str) -> Option<Result<String>> {
        Some(Ok(text.to_owned()))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn config_defaults() {
        let config = ShowdownConfig::new();
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.login_url, DEFAULT_LOGIN_URL);
        assert_eq!(
            config.no_team_formats,
            vec!["gen8randombattle".to_string(), "gen9randombattle".to_string()]
        );
        assert_eq!(config.unset_stats, UnsetStats::Blank);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn event_channel_capacity_is_clamped_to_one() {
        let config = ShowdownConfig::new().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn start_emits_connected() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = ShowdownClient::start(transport, ShowdownConfig::new());
        assert_eq!(events.recv().await.unwrap(), ShowdownEvent::Connected);
        assert!(client.is_connected());
        assert!(!client.is_logged_in());
        client.close().await;
    }

    #[tokio::test]
    async fn login_uses_latched_challstr() {
        let (transport, sent, _closed) = MockTransport::new(vec![frame("|challstr|4|abcdef")]);
        let (mut client, mut events) = ShowdownClient::start(transport, ShowdownConfig::new());
        let _ = events.recv().await; // Connected
        settle().await;

        client
            .login_with(&Credentials::new("uname", "pass"), &FixedAuthenticator(Ok("signed")))
            .await
            .unwrap();
        assert!(client.is_logged_in());
        assert_eq!(
            events.recv().await.unwrap(),
            ShowdownEvent::LoggedIn {
                username: "uname".into()
            }
        );

        settle().await;
        assert_eq!(
            sent.lock().unwrap().as_slice(),
            ["|/trn uname,0,signed".to_string()]
        );
        client.close().await;
    }

    #[tokio::test]
    async fn failed_login_closes_client() {
        let (transport, sent, closed) = MockTransport::new(vec![frame("|challstr|4|abcdef")]);
        let (mut client, _events) = ShowdownClient::start(transport, ShowdownConfig::new());

        let err = client
            .login_with(
                &Credentials::new("uname", "pass"),
                &FixedAuthenticator(Err(ShowdownError::Timeout)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShowdownError::Auth(_)));
        assert!(!client.is_connected());
        assert!(closed.load(Ordering::Acquire));
        assert!(sent.lock().unwrap().is_empty());
        assert!(matches!(
            client.send(&Command::Chat("hi".into()), "lobby"),
            Err(ShowdownError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn login_without_challstr_fails_when_connection_drops() {
        let (transport, _sent, _closed) = MockTransport::new(vec![None]);
        let (mut client, _events) = ShowdownClient::start(transport, ShowdownConfig::new());
        let err = client
            .login_with(&Credentials::new("u", "p"), &FixedAuthenticator(Ok("x")))
            .await
            .unwrap_err();
        assert!(matches!(err, ShowdownError::NotConnected));
    }

    #[tokio::test]
    async fn init_opens_session_and_win_removes_it() {
        let (transport, sent, _closed) = MockTransport::new(vec![
            frame(">battle-gen8randombattle-1\n|init|battle\n|title|a vs. b"),
            frame(r#">battle-gen8randombattle-1
|request|{"forceSwitch":[true],"rqid":3,"side":{"pokemon":[{"ident":"p1: A","active":true,"condition":"0 fnt"},{"ident":"p1: B","active":false,"condition":"100/100"}]}}"#),
            frame(">battle-gen8randombattle-1\n|\n|win|bot"),
        ]);
        let (mut client, mut events) = ShowdownClient::start(transport, ShowdownConfig::new());

        assert_eq!(events.recv().await.unwrap(), ShowdownEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            ShowdownEvent::RoomOpened {
                room: "battle-gen8randombattle-1".into()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ShowdownEvent::RoomClosed {
                room: "battle-gen8randombattle-1".into()
            }
        );
        assert!(client.active_rooms().await.is_empty());

        settle().await;
        assert_eq!(
            sent.lock().unwrap().as_slice(),
            [
                "|/join battle-gen8randombattle-1".to_string(),
                "battle-gen8randombattle-1|/choose switch 2|3".to_string(),
                "battle-gen8randombattle-1|/leave".to_string(),
            ]
        );
        client.close().await;
    }

    #[tokio::test]
    async fn close_forfeits_open_rooms() {
        let (transport, sent, closed) =
            MockTransport::new(vec![frame(">battle-gen8ou-7\n|init|battle")]);
        let (mut client, mut events) = ShowdownClient::start(transport, ShowdownConfig::new());
        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // RoomOpened
        settle().await;

        assert_eq!(client.active_rooms().await, vec!["battle-gen8ou-7".to_string()]);
        assert_eq!(
            client.room_state("battle-gen8ou-7").await,
            Some(SessionState::Active)
        );

        client.close().await;

        assert!(closed.load(Ordering::Acquire));
        assert!(client.active_rooms().await.is_empty());
        assert!(!client.is_connected());
        let frames = sent.lock().unwrap().clone();
        assert_eq!(frames.last().unwrap(), "battle-gen8ou-7|/forfeit");
        assert!(matches!(
            events.recv().await.unwrap(),
            ShowdownEvent::Disconnected { .. }
        ));

        // Second close is a no-op.
        client.close().await;
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let (transport, _sent, _closed) =
            MockTransport::new(vec![frame("|error|/utm - unknown format")]);
        let (mut client, mut events) = ShowdownClient::start(transport, ShowdownConfig::new());
        let _ = events.recv().await; // Connected
        assert_eq!(
            events.recv().await.unwrap(),
            ShowdownEvent::ServerError {
                room: String::new(),
                message: "/utm - unknown format".into(),
            }
        );
        client.close().await;
    }

    #[tokio::test]
    async fn challenge_update_is_answered() {
        let (transport, sent, _closed) = MockTransport::new(vec![frame(
            r#"|updatechallenges|{"challengesFrom":{"alice":"gen8randombattle"},"challengeTo":null}"#,
        )]);
        let (mut client, mut events) = ShowdownClient::start(transport, ShowdownConfig::new());
        let _ = events.recv().await; // Connected
        assert_eq!(
            events.recv().await.unwrap(),
            ShowdownEvent::ChallengeAnswered {
                challenger: "alice".into(),
                format: "gen8randombattle".into(),
                accepted: true,
            }
        );
        settle().await;
        assert_eq!(
            sent.lock().unwrap().as_slice(),
            ["|/utm null".to_string(), "|/accept alice".to_string()]
        );
        client.close().await;
    }

    #[tokio::test]
    async fn unrelated_room_messages_are_ignored() {
        let (transport, sent, _closed) = MockTransport::new(vec![
            frame(">lobby\n|c|~|hello"),
            frame(">battle-x\n|request|{}"),
        ]);
        let (mut client, mut events) = ShowdownClient::start(transport, ShowdownConfig::new());
        let _ = events.recv().await; // Connected
        settle().await;
        assert!(client.active_rooms().await.is_empty());
        assert!(sent.lock().unwrap().is_empty());
        client.close().await;
    }

    #[tokio::test]
    async fn disconnected_on_transport_close() {
        let (transport, _sent, _closed) = MockTransport::new(vec![None]);
        let (mut client, mut events) = ShowdownClient::start(transport, ShowdownConfig::new());
        let _ = events.recv().await; // Connected
        assert_eq!(
            events.recv().await.unwrap(),
            ShowdownEvent::Disconnected { reason: None }
        );
        assert!(!client.is_connected());
        client.close().await;
    }

    #[tokio::test]
    async fn receive_error_reports_reason() {
        let (transport, _sent, _closed) =
            MockTransport::new(vec![Some(Err(ShowdownError::TransportReceive("reset".into())))]);
        let (mut client, mut events) = ShowdownClient::start(transport, ShowdownConfig::new());
        let _ = events.recv().await; // Connected
        match events.recv().await.unwrap() {
            ShowdownEvent::Disconnected { reason: Some(reason) } => {
                assert!(reason.contains("reset"), "unexpected reason {reason}");
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
        client.close().await;
    }

    #[tokio::test]
    async fn not_connected_after_close() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, _events) = ShowdownClient::start(transport, ShowdownConfig::new());
        client.close().await;
        assert!(matches!(
            client.send(&Command::Join("lobby".into()), ""),
            Err(ShowdownError::NotConnected)
        ));
    }

    /// Transport whose `close()` never returns.
    struct HangingCloseTransport {
        dropped: Arc<AtomicBool>,
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _frame: String) -> Result<()> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn close_timeout_aborts_stuck_dispatcher() {
        let dropped = Arc::new(AtomicBool::new(false));
        let transport = HangingCloseTransport {
            dropped: Arc::clone(&dropped),
        };
        let config = ShowdownConfig::new().with_shutdown_timeout(Duration::from_millis(20));
        let (mut client, mut events) = ShowdownClient::start(transport, config);
        let _ = events.recv().await; // Connected

        client.close().await;

        assert!(dropped.load(Ordering::Acquire));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn load_team_file_feeds_challenges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("team.txt");
        std::fs::write(&path, "Pikachu @ Light Ball\n- Thunderbolt\n").unwrap();

        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, _events) = ShowdownClient::start(transport, ShowdownConfig::new());
        client.load_team_file("gen8ou", &path, None).await.unwrap();
        assert_eq!(
            client
                .roster()
                .read()
                .await
                .team_for("gen8ou")
                .unwrap()
                .wire_value(),
            "Pikachu||lightball||thunderbolt||,,,,,||,,,,,|||"
        );

        let err = client
            .load_team_file("gen8randombattle", &path, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShowdownError::NoTeamFormat { .. }));
        client.close().await;
    }
}
