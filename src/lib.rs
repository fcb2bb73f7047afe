//! # Showdown Client
//!
//! Async client that plays battles on a Pokemon Showdown server unattended.
//!
//! The client logs in over one persistent connection, answers incoming
//! challenges from a per-format team [`Roster`], joins every battle room the
//! server opens, and picks moves and switches with a [`DecisionPolicy`].
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement the [`Transport`] trait for any backend
//! - **WebSocket built-in**: default `transport-websocket` feature provides `WebSocketTransport`
//! - **HTTP login**: default `http-login` feature provides `HttpAuthenticator`
//! - **Event-driven**: receive typed [`ShowdownEvent`]s via a channel
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use showdown_client::{Credentials, ShowdownClient, ShowdownConfig, WebSocketTransport};
//!
//! let config = ShowdownConfig::new();
//! let transport = WebSocketTransport::connect(&config.server_url).await?;
//! let (mut client, mut events) = ShowdownClient::start(transport, config);
//! client.login(&Credentials::from_json_file("login.json")?).await?;
//! ```

pub mod auth;
pub mod challenge;
pub mod client;
pub mod error;
pub mod event;
pub mod policy;
pub mod protocol;
pub mod roster;
pub mod session;
pub mod team;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use auth::{Authenticator, Credentials};
pub use client::{Outbox, ShowdownClient, ShowdownConfig};
pub use error::{Result, ShowdownError};
pub use event::ShowdownEvent;
pub use policy::{Choice, DecisionPolicy, RandomPolicy};
pub use protocol::{Command, Message, MessageKind};
pub use roster::{Roster, TeamSlot};
pub use session::SessionState;
pub use team::{TeamEncoding, UnsetStats};
pub use transport::Transport;

#[cfg(feature = "http-login")]
pub use auth::HttpAuthenticator;
#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
