//! Transport abstraction for the Showdown protocol.
//!
//! The [`Transport`] trait defines a bidirectional text frame channel between
//! the client and the battle server. Every frame is one UTF-8 string of the
//! form `<room>|<type>|<content...>` (possibly several such lines batched
//! behind a `>room` header), so a transport only has to preserve framing.
//!
//! # Connection Setup
//!
//! Connection setup is NOT part of this trait. Construct a connected
//! transport externally, then pass it to `ShowdownClient::start`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use showdown_client::error::ShowdownError;
//! use showdown_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), ShowdownError> {
//!         // Write one complete frame
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ShowdownError>> {
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ShowdownError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ShowdownError;

/// A bidirectional text frame transport.
///
/// Each call to [`send`](Transport::send) writes one complete frame before
/// returning, and each call to [`recv`](Transport::recv) yields one complete
/// frame. The dispatcher is the only caller of `recv`.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the dispatcher
/// polls it inside `tokio::select!`. Channel-based implementations (e.g.,
/// wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Write one text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ShowdownError::TransportSend`] if the frame could not be
    /// written, or [`ShowdownError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, frame: String) -> Result<(), ShowdownError>;

    /// Receive the next text frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` for a complete frame
    /// - `Some(Err(e))` when the transport failed
    /// - `None` when the server closed the connection cleanly
    async fn recv(&mut self) -> Option<Result<String, ShowdownError>>;

    /// Close the connection.
    ///
    /// After this call `send` fails and `recv` returns `None` or an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), ShowdownError>;
}
