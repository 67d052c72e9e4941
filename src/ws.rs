//! WebSocket transport for the RTM socket.
//!
//! [`connect`] dials the one-time address from `rtm.start` and splits the
//! socket so the two session pumps can own one half each:
//!
//! ```text
//! write pump ──► WsWriter ──► socket ──► WsReader ──► read pump
//!              (text, ping, close)     (text, pong, close)
//! ```
//!
//! Frames the session never acts on are filtered here. Pings are answered
//! by tungstenite itself, binary frames are logged and skipped.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Close code reported when the peer sent a close frame without one.
const NO_STATUS: u16 = 1005;

/// A frame the session cares about.
#[derive(Debug, PartialEq, Eq)]
pub enum WsMessage {
    /// One JSON event.
    Text(String),
    /// Answer to our keepalive ping.
    Pong,
    /// The peer closed the socket.
    Close {
        /// Close code (1005 when none was sent).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// Sending half, owned by the write pump.
#[derive(Debug)]
pub struct WsWriter {
    sink: SplitSink<Socket, Message>,
}

impl WsWriter {
    /// Send one JSON event.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send(Message::Text(text.to_owned()), "text frame").await
    }

    /// Send an empty keepalive ping.
    pub async fn send_ping(&mut self) -> Result<()> {
        self.send(Message::Ping(Vec::new()), "ping").await
    }

    /// Send a close frame and shut the sink.
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await.context("Closing WebSocket failed")
    }

    async fn send(&mut self, message: Message, what: &str) -> Result<()> {
        self.sink
            .send(message)
            .await
            .with_context(|| format!("Sending {what} failed"))
    }
}

/// Receiving half, owned by the read pump.
#[derive(Debug)]
pub struct WsReader {
    stream: SplitStream<Socket>,
}

impl WsReader {
    /// Next relevant frame; `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Result<WsMessage>> {
        while let Some(item) = self.stream.next().await {
            let message = match item {
                Ok(message) => message,
                Err(e) => return Some(Err(anyhow::Error::new(e).context("WebSocket read failed"))),
            };
            match message {
                Message::Text(text) => return Some(Ok(WsMessage::Text(text))),
                Message::Pong(_) => return Some(Ok(WsMessage::Pong)),
                Message::Close(frame) => {
                    let (code, reason) = frame.map_or_else(
                        || (NO_STATUS, String::new()),
                        |frame| (u16::from(frame.code), frame.reason.into_owned()),
                    );
                    return Some(Ok(WsMessage::Close { code, reason }));
                }
                Message::Binary(data) => {
                    log::debug!("[Slack] Skipping {}-byte binary frame", data.len());
                }
                Message::Ping(_) | Message::Frame(_) => {}
            }
        }
        None
    }
}

/// Dial `url` and split the socket.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (socket, _response) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("WebSocket connect to {url} failed"))?;
    log::debug!("[Slack] Socket open: {url}");

    let (sink, stream) = socket.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}
