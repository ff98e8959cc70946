//! WebSocket Transport
//!
//! Implements the transport port over `tokio-tungstenite`. Each `connect()`
//! opens a fresh socket; the returned session encodes control messages and
//! decodes inbound frames with [`JsonCodec`].
//!
//! Pings are answered by tungstenite itself, which queues the pong and
//! flushes it on the next read or write.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::codec::{CodecError, JsonCodec};
use crate::application::ports::{
    ControlMessage, Transport, TransportError, TransportEvent, TransportSession,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport that connects to a price feed WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
    codec: JsonCodec,
}

impl WsTransport {
    /// Create a transport for a `ws://` or `wss://` endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            codec: JsonCodec::new(),
        }
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn TransportSession>, TransportError> {
        tracing::debug!(url = %self.url, "Opening WebSocket");

        let (socket, response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        Ok(Box::new(WsSession::new(socket, self.codec.clone())))
    }
}

/// One open WebSocket connection.
pub struct WsSession<S = Socket> {
    socket: S,
    codec: JsonCodec,
    /// Decoded events not yet handed out.
    pending: VecDeque<TransportEvent>,
    closed: bool,
}

impl<S> WsSession<S> {
    /// Wrap an established socket.
    pub const fn new(socket: S, codec: JsonCodec) -> Self {
        Self {
            socket,
            codec,
            pending: VecDeque::new(),
            closed: false,
        }
    }

    fn decode_text(&mut self, text: &str) {
        let received_at_ms = chrono::Utc::now().timestamp_millis();

        match self.codec.decode(text, received_at_ms) {
            Ok(samples) => {
                self.pending
                    .extend(samples.into_iter().map(TransportEvent::Price));
            }
            Err(CodecError::Remote(message)) => {
                self.pending
                    .push_back(TransportEvent::Error(TransportError::Session(message)));
            }
            Err(e) => self.pending.push_back(TransportEvent::Malformed(e.to_string())),
        }
    }
}

#[async_trait]
impl<S> TransportSession for WsSession<S>
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin
        + Send,
{
    async fn send(&mut self, message: &ControlMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::SendFailed("session closed".to_string()));
        }

        let json = self
            .codec
            .encode(message)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        self.socket
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn next_event(&mut self) -> TransportEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }

            if self.closed {
                return TransportEvent::Closed;
            }

            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => self.decode_text(text.as_str()),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => self.decode_text(text),
                    Err(_) => {
                        return TransportEvent::Malformed("binary frame is not UTF-8".to_string());
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Server sent close frame");
                    self.closed = true;
                }
                Some(Ok(_)) => {
                    // Ping, pong and raw frames
                }
                Some(Err(e)) => {
                    self.closed = true;
                    return TransportEvent::Error(TransportError::Session(e.to_string()));
                }
                None => {
                    tracing::info!("WebSocket stream ended");
                    self.closed = true;
                }
            }
        }
    }

    async fn close(&mut self) {
        self.closed = true;

        // Also runs after the peer closed: flushes tungstenite's queued
        // close reply, or reports that the socket is already gone
        if let Err(e) = self.socket.close().await {
            tracing::debug!(error = %e, "WebSocket close handshake failed");
        }
    }
}
