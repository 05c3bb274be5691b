//! `WebSocket` transport abstraction for the gateway.
//!
//! The shard talks to a [`Transport`] that yields a split
//! [`FrameSink`]/[`FrameStream`] pair, so the writer task and the event
//! loop each own one half. [`TungsteniteTransport`] is the real
//! implementation; tests substitute scripted ones.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::trace;

use crate::error::GatewayResult;

/// RFC 6455 code for a close frame that carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// A gateway frame, as seen by the shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A JSON text frame.
    Text(String),
    /// A close frame.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

impl Frame {
    /// A close frame with an empty reason.
    #[must_use]
    pub fn close(code: u16) -> Self {
        Self::Close {
            code,
            reason: String::new(),
        }
    }
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame. Sending [`Frame::Close`] starts the close handshake.
    async fn send(&mut self, frame: Frame) -> GatewayResult<()>;
}

/// Read half of a connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Wait for the next frame. `None` means the connection ended
    /// without a close frame.
    async fn recv(&mut self) -> Option<GatewayResult<Frame>>;
}

/// An open connection.
pub struct Connection {
    /// Write half.
    pub sink: Box<dyn FrameSink>,
    /// Read half.
    pub stream: Box<dyn FrameStream>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens gateway connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to `url`.
    async fn connect(&self, url: &str) -> GatewayResult<Connection>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Transport`] over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> GatewayResult<Connection> {
        let (ws, _response) = connect_async(url).await?;
        let (writer, reader) = ws.split();
        Ok(Connection {
            sink: Box::new(TungsteniteSink { writer }),
            stream: Box::new(TungsteniteStream { reader }),
        })
    }
}

struct TungsteniteSink {
    writer: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send(&mut self, frame: Frame) -> GatewayResult<()> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Close { code, reason } => Message::Close(Some(CloseFrame {
                code: code.into(),
                reason: reason.into(),
            })),
        };
        self.writer.send(message).await?;
        Ok(())
    }
}

struct TungsteniteStream {
    reader: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for TungsteniteStream {
    async fn recv(&mut self) -> Option<GatewayResult<Frame>> {
        loop {
            match self.reader.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text.to_string()))),
                Ok(Message::Close(frame)) => return Some(Ok(close_frame(frame))),
                Ok(Message::Binary(_)) => {
                    // Compressed transports are not negotiated.
                    trace!("Skipping binary frame");
                },
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {},
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Map a `WebSocket` close to a [`Frame::Close`].
fn close_frame(frame: Option<CloseFrame<'_>>) -> Frame {
    match frame {
        Some(f) => Frame::Close {
            code: f.code.into(),
            reason: f.reason.to_string(),
        },
        None => Frame::Close {
            code: CLOSE_NO_STATUS,
            reason: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::close_code::{self, CloseAction};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    #[test]
    fn close_without_status_keeps_the_session() {
        assert_eq!(close_frame(None), Frame::close(CLOSE_NO_STATUS));
        assert_eq!(close_code::classify(CLOSE_NO_STATUS), CloseAction::Resume);
    }

    #[test]
    fn close_status_and_reason_are_kept() {
        let frame = CloseFrame {
            code: CloseCode::from(4009),
            reason: "Session timed out".into(),
        };
        assert_eq!(
            close_frame(Some(frame)),
            Frame::Close {
                code: 4009,
                reason: "Session timed out".into()
            }
        );
    }

    #[test]
    fn close_helper_has_empty_reason() {
        assert_eq!(
            Frame::close(4000),
            Frame::Close {
                code: 4000,
                reason: String::new()
            }
        );
    }

    #[tokio::test]
    async fn connect_to_unreachable_host_fails() {
        let result = TungsteniteTransport.connect("ws://127.0.0.1:1/").await;
        assert!(result.is_err());
    }
}
