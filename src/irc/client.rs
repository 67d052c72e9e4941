//! Minimal IRC client: registration, keepalive and channel messages.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────── IrcClient (Clone) ────────────┐
//! join/privmsg ──►│ command mpsc ──► writer task ──► socket   │
//!                 │                                   │       │
//! IrcEvent ◄──────│ event mpsc ◄── reader task ◄──────┘       │
//!                 └───────────────────────────────────────────┘
//! ```
//!
//! The event channel outlives individual connections: after a
//! `Disconnected` event the owner calls [`IrcClient::connect`] again and
//! keeps reading from the same receiver.

// Rust guideline compliant 2026-02

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;

use super::message::{ctcp_action, format_line, next_nick, Line};
use crate::constants;

/// Connection settings.
#[derive(Debug, Clone)]
pub struct IrcConfig {
    /// Server address (`host:port`).
    pub server: String,
    /// Preferred nickname.
    pub nick: String,
    /// Username (ident).
    pub user: String,
    /// Real name.
    pub realname: String,
    /// Connect over TLS.
    pub tls: bool,
    /// Message sent with `QUIT`.
    pub quit_message: String,
}

impl IrcConfig {
    /// Settings for `server` and `nick` with the bridge's ident and names.
    #[must_use]
    pub fn new(server: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            nick: nick.into(),
            user: "slackirc".to_string(),
            realname: "Slack <-> IRC bridge".to_string(),
            tls: false,
            quit_message: "Slack <-> IRC Bridge shutting down".to_string(),
        }
    }
}

/// Something that happened on the IRC side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    /// Registration completed (`001`).
    Connected {
        /// Nickname the server accepted.
        nick: String,
    },
    /// The connection ended.
    Disconnected {
        /// Why it ended.
        reason: String,
    },
    /// A `PRIVMSG`.
    Privmsg {
        /// Sender nickname.
        nick: String,
        /// Channel or nickname the message was sent to.
        target: String,
        /// Message text.
        text: String,
    },
    /// A CTCP `ACTION` (`/me`).
    Action {
        /// Sender nickname.
        nick: String,
        /// Channel or nickname the action was sent to.
        target: String,
        /// Action text without the `ACTION` tag.
        text: String,
    },
}

/// Outgoing command queued for the writer task.
#[derive(Debug)]
enum Command {
    Raw(String),
    Quit(String),
}

trait IrcStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> IrcStream for T {}

/// Handle to the IRC connection.
#[derive(Debug, Clone)]
pub struct IrcClient {
    config: Arc<IrcConfig>,
    events: mpsc::Sender<IrcEvent>,
    commands: Arc<Mutex<Option<mpsc::UnboundedSender<Command>>>>,
}

impl IrcClient {
    /// Create a client and the receiver its events arrive on.
    #[must_use]
    pub fn new(config: IrcConfig) -> (Self, mpsc::Receiver<IrcEvent>) {
        let (events, rx) = mpsc::channel(constants::IRC_EVENT_BUFFER);
        let client = Self {
            config: Arc::new(config),
            events,
            commands: Arc::new(Mutex::new(None)),
        };
        (client, rx)
    }

    /// Settings this client connects with.
    #[must_use]
    pub fn config(&self) -> &IrcConfig {
        &self.config
    }

    /// Dial the server and start registration.
    ///
    /// Returns once the socket is open; `Connected` follows when the server
    /// accepts the registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP connection or TLS handshake fails.
    pub async fn connect(&self) -> Result<()> {
        let stream = dial(&self.config).await?;
        log::info!("[IRC] Connected to {}", self.config.server);

        let (read, mut write) = tokio::io::split(stream);
        let (commands, mut queue) = mpsc::unbounded_channel::<Command>();

        tokio::spawn(async move {
            while let Some(command) = queue.recv().await {
                let (line, last) = match command {
                    Command::Raw(line) => (line, false),
                    Command::Quit(line) => (line, true),
                };
                log::trace!("[IRC] -> {}", line.trim_end());
                if let Err(e) = write.write_all(line.as_bytes()).await {
                    log::warn!("[IRC] Write failed: {e}");
                    break;
                }
                if last {
                    break;
                }
            }
            let _ = write.shutdown().await;
        });

        let nick = self.config.nick.as_str();
        let user = self.config.user.as_str();
        let _ = commands.send(Command::Raw(format_line("NICK", &[nick], None)));
        let _ = commands.send(Command::Raw(format_line(
            "USER",
            &[user, "0", "*"],
            Some(&self.config.realname),
        )));

        tokio::spawn(read_loop(
            Arc::clone(&self.config),
            BufReader::new(read),
            commands.clone(),
            self.events.clone(),
        ));

        *self
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(commands);
        Ok(())
    }

    /// Join `channel`.
    pub fn join(&self, channel: &str) {
        self.queue(Command::Raw(format_line("JOIN", &[channel], None)));
    }

    /// Send `text` to `target`.
    pub fn privmsg(&self, target: &str, text: &str) {
        self.queue(Command::Raw(format_line("PRIVMSG", &[target], Some(text))));
    }

    /// Send `QUIT` and close the connection once it is written.
    pub fn quit(&self) {
        let line = format_line("QUIT", &[], Some(&self.config.quit_message));
        self.queue(Command::Quit(line));
    }

    fn queue(&self, command: Command) {
        let commands = self
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match commands.as_ref() {
            Some(tx) if tx.send(command).is_ok() => {}
            _ => log::warn!("[IRC] Not connected, dropping command"),
        }
    }
}

/// Open the TCP connection, wrapped in TLS when configured.
async fn dial(config: &IrcConfig) -> Result<Box<dyn IrcStream>> {
    let tcp = TcpStream::connect(&config.server)
        .await
        .with_context(|| format!("TCP connect to {} failed", config.server))?;

    if !config.tls {
        return Ok(Box::new(tcp));
    }

    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .context("TLS protocol setup failed")?
    .with_root_certificates(roots)
    .with_no_client_auth();

    let host = config
        .server
        .rsplit_once(':')
        .map_or(config.server.as_str(), |(host, _)| host);
    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .with_context(|| format!("invalid TLS server name: {host}"))?;

    let tls = TlsConnector::from(Arc::new(tls_config))
        .connect(server_name, tcp)
        .await
        .with_context(|| format!("TLS handshake with {} failed", config.server))?;
    Ok(Box::new(tls))
}

/// Read lines until the connection ends, then report `Disconnected`.
async fn read_loop<R>(
    config: Arc<IrcConfig>,
    reader: BufReader<R>,
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::Sender<IrcEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    let mut nick = config.nick.clone();

    let reason = loop {
        match lines.next_line().await {
            Ok(Some(raw)) => {
                log::trace!("[IRC] <- {raw}");
                let Some(line) = Line::parse(&raw) else {
                    continue;
                };
                if let Some(event) = handle_line(&config, &mut nick, &line, &commands) {
                    if !deliver(&events, event).await {
                        return;
                    }
                }
            }
            Ok(None) => break "connection closed".to_string(),
            Err(e) => break e.to_string(),
        }
    };

    log::warn!("[IRC] Disconnected: {reason}");
    let _ = events.send(IrcEvent::Disconnected { reason }).await;
}

/// Hand `event` to the owner; false once the receiver is gone.
///
/// Chat lines are dropped when the owner falls behind so the reader keeps
/// answering `PING`. Lifecycle events always wait for room.
async fn deliver(events: &mpsc::Sender<IrcEvent>, event: IrcEvent) -> bool {
    match event {
        IrcEvent::Privmsg { .. } | IrcEvent::Action { .. } => match events.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                log::warn!("[IRC] Event buffer full, dropping {dropped:?}");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        },
        IrcEvent::Connected { .. } | IrcEvent::Disconnected { .. } => {
            events.send(event).await.is_ok()
        }
    }
}

/// React to one server line; returns the event to surface, if any.
fn handle_line(
    config: &IrcConfig,
    nick: &mut String,
    line: &Line,
    commands: &mpsc::UnboundedSender<Command>,
) -> Option<IrcEvent> {
    match line.command.as_str() {
        "PING" => {
            let token = line.param(0).unwrap_or_default();
            let _ = commands.send(Command::Raw(format_line("PONG", &[], Some(token))));
            None
        }
        "001" => {
            if let Some(accepted) = line.param(0) {
                accepted.clone_into(nick);
            }
            log::info!("[IRC] Registered as {nick}");
            Some(IrcEvent::Connected { nick: nick.clone() })
        }
        "433" => {
            *nick = next_nick(&config.nick, nick);
            log::warn!("[IRC] Nickname in use, trying {nick}");
            let _ = commands.send(Command::Raw(format_line("NICK", &[nick.as_str()], None)));
            None
        }
        "PRIVMSG" => {
            let sender = line.nick()?.to_string();
            let target = line.param(0)?.to_string();
            let text = line.param(1)?;
            if let Some(action) = ctcp_action(text) {
                Some(IrcEvent::Action {
                    nick: sender,
                    target,
                    text: action.to_string(),
                })
            } else if text.starts_with('\u{1}') {
                // Other CTCP queries are not relayed.
                None
            } else {
                Some(IrcEvent::Privmsg {
                    nick: sender,
                    target,
                    text: text.to_string(),
                })
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncBufRead;
    use tokio::net::TcpListener;

    async fn next_event(rx: &mut mpsc::Receiver<IrcEvent>) -> IrcEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for IRC event")
            .expect("event channel closed")
    }

    async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> String {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line))
            .await
            .expect("timed out waiting for client line")
            .unwrap();
        line
    }

    #[tokio::test]
    async fn test_registration_messages_and_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, mut events) = IrcClient::new(IrcConfig::new(addr.to_string(), "bot"));
        client.connect().await.unwrap();

        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut server = tokio::io::BufReader::new(read);

        assert_eq!(read_line(&mut server).await, "NICK bot\r\n");
        assert_eq!(
            read_line(&mut server).await,
            "USER slackirc 0 * :Slack <-> IRC bridge\r\n"
        );

        // Nick collision, then keepalive, then registration.
        write
            .write_all(b":srv 433 * bot :Nickname is already in use\r\n")
            .await
            .unwrap();
        assert_eq!(read_line(&mut server).await, "NICK bot_\r\n");

        write.write_all(b"PING :srv-token\r\n").await.unwrap();
        assert_eq!(read_line(&mut server).await, "PONG :srv-token\r\n");

        write.write_all(b":srv 001 bot_ :Welcome\r\n").await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            IrcEvent::Connected {
                nick: "bot_".to_string()
            }
        );

        client.join("#chan");
        assert_eq!(read_line(&mut server).await, "JOIN #chan\r\n");
        client.privmsg("#chan", "hi\nthere");
        assert_eq!(read_line(&mut server).await, "PRIVMSG #chan :hithere\r\n");

        write
            .write_all(b":alice!a@h PRIVMSG #chan :hello\r\n")
            .await
            .unwrap();
        write
            .write_all(b":alice!a@h PRIVMSG #chan :\x01ACTION waves\x01\r\n")
            .await
            .unwrap();
        write
            .write_all(b":alice!a@h PRIVMSG bot_ :\x01VERSION\x01\r\n")
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut events).await,
            IrcEvent::Privmsg {
                nick: "alice".to_string(),
                target: "#chan".to_string(),
                text: "hello".to_string()
            }
        );
        assert_eq!(
            next_event(&mut events).await,
            IrcEvent::Action {
                nick: "alice".to_string(),
                target: "#chan".to_string(),
                text: "waves".to_string()
            }
        );

        client.quit();
        assert_eq!(
            read_line(&mut server).await,
            "QUIT :Slack <-> IRC Bridge shutting down\r\n"
        );

        drop(write);
        drop(server);
        assert!(matches!(
            next_event(&mut events).await,
            IrcEvent::Disconnected { .. }
        ));
    }

    #[tokio::test]
    async fn test_ping_answered_while_events_pile_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // The event receiver is never drained.
        let (client, _events) = IrcClient::new(IrcConfig::new(addr.to_string(), "bot"));
        client.connect().await.unwrap();

        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut server = tokio::io::BufReader::new(read);
        read_line(&mut server).await;
        read_line(&mut server).await;

        let mut flood = String::new();
        for i in 0..constants::IRC_EVENT_BUFFER + 50 {
            flood.push_str(&format!(":alice!a@h PRIVMSG #chan :line {i}\r\n"));
        }
        flood.push_str("PING :keepalive\r\n");
        write.write_all(flood.as_bytes()).await.unwrap();

        assert_eq!(read_line(&mut server).await, "PONG :keepalive\r\n");
    }

    #[tokio::test]
    async fn test_connect_refused_is_error() {
        let (client, _events) = IrcClient::new(IrcConfig::new("127.0.0.1:1", "bot"));
        assert!(client.connect().await.is_err());
    }

    #[test]
    fn test_commands_before_connect_are_dropped() {
        let (client, _events) = IrcClient::new(IrcConfig::new("127.0.0.1:1", "bot"));
        client.join("#chan");
        client.privmsg("#chan", "hi");
        client.quit();
    }
}
