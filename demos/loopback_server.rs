//! # Loopback Server Example
//!
//! Implements the [`Transport`] trait over in-process channels and drives a
//! complete battle against a scripted fake server:
//!
//! - the server sends a `challstr`, the client logs in with a stub authenticator
//! - a challenge arrives and is accepted with the configured team
//! - a battle room opens, one forced switch is requested, the battle ends
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_server
//! ```

use async_trait::async_trait;
use showdown_client::auth::LoginRequest;
use showdown_client::{
    Authenticator, Credentials, ShowdownClient, ShowdownConfig, ShowdownError, ShowdownEvent,
    Transport,
};
use tokio::sync::mpsc;

const ROOM: &str = "battle-gen8randombattle-1";

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-based transport and its server half
// ─────────────────────────────────────────────────────────────────────

/// Client half, handed to `ShowdownClient::start`.
pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Server half: read what the client wrote, push frames to it.
pub struct LoopbackServer {
    pub rx: mpsc::UnboundedReceiver<String>,
    pub tx: mpsc::UnboundedSender<String>,
}

fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackServer {
            rx: server_rx,
            tx: server_tx,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, frame: String) -> Result<(), ShowdownError> {
        self.tx
            .send(frame)
            .map_err(|e| ShowdownError::TransportSend(e.to_string()))
    }

    /// Cancel-safe because `mpsc::UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, ShowdownError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ShowdownError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: An authenticator that skips the HTTP round trip
// ─────────────────────────────────────────────────────────────────────

struct StubAuthenticator;

#[async_trait]
impl Authenticator for StubAuthenticator {
    async fn authenticate(&self, request: &LoginRequest) -> Result<String, ShowdownError> {
        tracing::info!("Authenticating {} with challstr {}", request.name, request.challstr);
        Ok(format!("{}-assertion", request.name))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Script the server
// ─────────────────────────────────────────────────────────────────────

/// Play the server side until the client leaves the battle room.
async fn run_server(
    mut server: LoopbackServer,
) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
    let mut received = Vec::new();
    server.tx.send("|challstr|4|f00dcafe".into())?;

    while let Some(frame) = server.rx.recv().await {
        tracing::info!("Server received: {frame}");
        received.push(frame.clone());

        if frame.starts_with("|/trn ") {
            let challenges = serde_json::json!({
                "challengesFrom": { "rival": "gen8randombattle" },
                "challengeTo": null,
            });
            server.tx.send(format!("|updatechallenges|{challenges}"))?;
        } else if frame.starts_with("|/accept ") {
            server.tx.send(format!(">{ROOM}\n|init|battle\n|title|bot vs. rival"))?;
        } else if frame == format!("|/join {ROOM}") {
            let request = serde_json::json!({
                "forceSwitch": [true],
                "rqid": 1,
                "side": { "pokemon": [
                    { "ident": "p1: Blissey", "active": true, "condition": "0 fnt" },
                    { "ident": "p1: Corviknight", "active": false, "condition": "100/100" },
                    { "ident": "p1: Clefable", "active": false, "condition": "88/100" },
                ]},
            });
            server.tx.send(format!(">{ROOM}\n|request|{request}"))?;
        } else if frame.starts_with(&format!("{ROOM}|/choose switch")) {
            server.tx.send(format!(">{ROOM}\n|\n|win|bot"))?;
        } else if frame == format!("{ROOM}|/leave") {
            break;
        }
    }
    Ok(received)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (transport, server) = loopback_pair();
    let server = tokio::spawn(run_server(server));

    let (mut client, mut event_rx) = ShowdownClient::start(transport, ShowdownConfig::new());
    client
        .login_with(&Credentials::new("bot", "secret"), &StubAuthenticator)
        .await?;

    while let Some(event) = event_rx.recv().await {
        tracing::info!("Event: {event:?}");
        if matches!(event, ShowdownEvent::RoomClosed { .. } | ShowdownEvent::Disconnected { .. }) {
            break;
        }
    }

    client.close().await;
    let received = server.await?.map_err(|e| e.to_string())?;
    tracing::info!("Done. The server saw {} frame(s).", received.len());
    Ok(())
}
