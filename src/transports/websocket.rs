//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The battle server speaks plain text over a raw WebSocket endpoint
//! (`/showdown/websocket`). Each WebSocket text message is one protocol
//! frame, which may batch several `|type|...` lines behind a `>room` header.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), showdown_client::ShowdownError> {
//! use showdown_client::{Transport, WebSocketTransport};
//!
//! let mut transport =
//!     WebSocketTransport::connect("ws://localhost:8000/showdown/websocket").await?;
//!
//! // The server greets every connection with a challstr.
//! if let Some(Ok(frame)) = transport.recv().await {
//!     println!("received: {frame}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use crate::error::ShowdownError;
use crate::transport::Transport;

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection to the battle server.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future before
/// completion never loses a frame.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ShowdownError::Io`] if the URL is invalid or the handshake
    /// fails. I/O error kinds are preserved; other failures map to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, ShowdownError> {
        tracing::debug!(url = %url, "connecting to battle server");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            ShowdownError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "battle server connection established");
        Ok(Self::from_stream(stream))
    }

    /// Open a connection, failing with [`ShowdownError::Timeout`] if the
    /// handshake does not finish within `timeout`.
    ///
    /// # Errors
    ///
    /// Any error [`connect`](Self::connect) returns, or `Timeout`.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, ShowdownError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| ShowdownError::Timeout)?
    }

    /// Wrap an already-established stream (custom TLS, proxies, headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), ShowdownError> {
        if self.closed {
            return Err(ShowdownError::TransportClosed);
        }
        tracing::trace!(%frame, "ws >>");
        self.stream
            .send(WsMessage::Text(frame.into()))
            .await
            .map_err(|e| ShowdownError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ShowdownError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(ShowdownError::TransportReceive(e.to_string()))),
            };

            match msg {
                WsMessage::Text(text) => {
                    tracing::trace!(frame = %text, "ws <<");
                    return Some(Ok(text.to_string()));
                }
                // The server never sends binary frames, but a UTF-8 payload is
                // still a usable protocol frame.
                WsMessage::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => tracing::warn!("skipping non-UTF-8 binary frame"),
                },
                WsMessage::Close(frame) => {
                    tracing::debug!(?frame, "server sent close frame");
                    return None;
                }
                // tungstenite queues pongs itself.
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), ShowdownError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| ShowdownError::TransportSend(e.to_string()))
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
    use tokio::net::TcpListener;

    /// Run `handler` as the server side of a local WebSocket and return its URL.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}/showdown/websocket")
    }

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, ShowdownError::Io(_)));
    }

    #[tokio::test]
    async fn recv_yields_batched_frame_verbatim() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(WsMessage::Text("|challstr|4|abcdef".into()))
                .await
                .unwrap();
            ws.send(WsMessage::Text(">battle-gen8ou-1\n|init|battle\n|title|a vs. b".into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            "|challstr|4|abcdef"
        );
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            ">battle-gen8ou-1\n|init|battle\n|title|a vs. b"
        );
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_accepts_utf8_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(WsMessage::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(WsMessage::Binary(b"|updateuser|guest".to_vec().into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            "|updateuser|guest"
        );
    }

    #[tokio::test]
    async fn send_reaches_server() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(WsMessage::Text(text))) = ws.next().await {
                ws.send(WsMessage::Text(format!("echo:{text}").into()))
                    .await
                    .unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send("|/join battle-gen8ou-1".to_string())
            .await
            .unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            "echo:|/join battle-gen8ou-1"
        );
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("|/logout".to_string()).await.unwrap_err();
        assert!(matches!(err, ShowdownError::TransportClosed));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            std::time::Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ShowdownError::Timeout));
    }
}
