//! # Random Battler
//!
//! Logs in to a Showdown server and plays every challenge it can accept,
//! choosing moves and switches uniformly at random:
//!
//! 1. Connect to the battle server via WebSocket
//! 2. Log in with credentials from a JSON file
//! 3. Load a team for one format (random-battle formats need none)
//! 4. Accept challenges and battle until Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! # login.json: {"username": "...", "password": "..."}
//! cargo run --example random_battler -- login.json gen8ou team.txt
//!
//! # Random battles only:
//! cargo run --example random_battler -- login.json
//!
//! # Override the server URL:
//! SHOWDOWN_URL=ws://localhost:8000/showdown/websocket cargo run --example random_battler -- login.json
//! ```

use showdown_client::{
    Credentials, ShowdownClient, ShowdownConfig, ShowdownEvent, WebSocketTransport,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=showdown_client=debug` for per-turn output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let mut args = std::env::args().skip(1);
    let Some(login_path) = args.next() else {
        return Err("usage: random_battler <login.json> [<format> <team file>]".into());
    };
    let team = match (args.next(), args.next()) {
        (Some(format), Some(path)) => Some((format, path)),
        (None, None) => None,
        _ => return Err("a team needs both a format and a file".into()),
    };

    let credentials = Credentials::from_json_file(&login_path)?;
    let mut config = ShowdownConfig::new();
    if let Ok(url) = std::env::var("SHOWDOWN_URL") {
        config = config.with_server_url(url);
    }

    // ── Connect ─────────────────────────────────────────────────────
    tracing::info!("Connecting to {}", config.server_url);
    let transport = WebSocketTransport::connect(&config.server_url).await?;
    let (mut client, mut event_rx) = ShowdownClient::start(transport, config);

    if let Some((format, path)) = &team {
        client.load_team_file(format, path, None).await?;
        tracing::info!("Loaded team for {format} from {path}");
    }

    client.login(&credentials).await?;

    // ── Event loop ──────────────────────────────────────────────────
    let mut finished = 0usize;
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    ShowdownEvent::LoggedIn { username } => {
                        tracing::info!("Logged in as {username}, waiting for challenges");
                    }
                    ShowdownEvent::ChallengeAnswered { challenger, format, accepted } => {
                        if accepted {
                            tracing::info!("Accepted {format} challenge from {challenger}");
                        } else {
                            tracing::info!("Declined {format} challenge from {challenger}");
                        }
                    }
                    ShowdownEvent::RoomOpened { room } => {
                        tracing::info!("Battle started: {room}");
                    }
                    ShowdownEvent::RoomClosed { room } => {
                        finished += 1;
                        tracing::info!("Battle finished: {room} ({finished} so far)");
                    }
                    ShowdownEvent::ServerError { room, message } => {
                        tracing::warn!("Server error in '{room}': {message}");
                    }
                    ShowdownEvent::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("server closed"));
                        break;
                    }
                    ShowdownEvent::Connected => {}
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, forfeiting open battles");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.close().await;
    tracing::info!("Played {finished} battle(s). Goodbye!");
    Ok(())
}
