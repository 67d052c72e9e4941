//! Slack RTM client: lifecycle, public API and shared state.
//!
//! # Architecture
//!
//! ```text
//! Client (Clone, Arc<Inner>)
//!     │
//!     ├── ApiClient ─────────── rtm.start / files.sharedPublicURL
//!     ├── Directory ─────────── ArcSwap<Snapshot>
//!     ├── Dispatcher<Client> ── handler registry + worker pool
//!     ├── FilePublisher ─────── only with a user token
//!     ├── outbound queue ────── bounded mpsc, drained by the write pump
//!     └── state + Session ───── one live socket at a time
//! ```
//!
//! # State machine
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──hello──► Connected
//!      ▲                          │                     │
//!      │◄────────close()──────────┘          transport failure / close()
//!      │                                                ▼
//!      └──────────────── pumps joined ◄──────────── Disconnecting
//! ```
//!
//! Every transition is a compare-and-swap on one atomic, so of several
//! concurrent teardown triggers exactly one performs the teardown and, for
//! transport failures, emits `disconnected`.
//!
//! `close()` also latches the client shut. A handler that reconnects on
//! `disconnected` then gets [`SlackError::Closed`] instead of a new session.

// Rust guideline compliant 2026-02

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};

use super::api::ApiClient;
use super::directory::{Directory, Snapshot};
use super::dispatch::{self, Dispatcher};
use super::files::FilePublisher;
use super::session::{self, Session};
use super::types::{kind, Event, OutboundRequest};
use crate::constants;

/// Lifecycle state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionState {
    /// No session and no connect attempt in progress.
    #[default]
    Disconnected = 0,
    /// `connect` is bootstrapping, possibly retrying.
    Connecting = 1,
    /// A session is live.
    Connected = 2,
    /// A session is being torn down.
    Disconnecting = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disconnecting,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Atomic holder for [`ConnectionState`].
#[derive(Debug, Default)]
struct StateCell(AtomicU8);

impl StateCell {
    fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move from `from` to `to`; false if the current state is not `from`.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Errors returned by [`Client::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlackError {
    /// A session is already connecting, connected or being torn down.
    AlreadyActive(ConnectionState),
    /// `close` was called while `connect` was still retrying.
    Cancelled,
    /// The client has been closed and will not connect again.
    Closed,
}

impl fmt::Display for SlackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyActive(state) => write!(f, "Client already active ({state})"),
            Self::Cancelled => write!(f, "Connect cancelled by close"),
            Self::Closed => write!(f, "Client is closed"),
        }
    }
}

impl std::error::Error for SlackError {}

/// Builder for [`Client`].
#[derive(Debug)]
pub struct ClientBuilder {
    bot_token: String,
    user_token: Option<String>,
    api_base_url: String,
    retry_delay: Duration,
    pong_wait: Duration,
    dispatch_workers: usize,
}

impl ClientBuilder {
    /// Token used to publish files. Enables `file_public` handling.
    #[must_use]
    pub fn user_token(mut self, token: impl Into<String>) -> Self {
        self.user_token = Some(token.into());
        self
    }

    /// Web API base URL (default `https://slack.com/api`).
    #[must_use]
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Delay between bootstrap attempts (default 30 s).
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Read-timeout window (default 60 s). Pings go out every 9/10 of it.
    #[must_use]
    pub fn pong_wait(mut self, wait: Duration) -> Self {
        self.pong_wait = wait;
        self
    }

    /// Number of dispatch workers (default 4).
    #[must_use]
    pub fn dispatch_workers(mut self, workers: usize) -> Self {
        self.dispatch_workers = workers;
        self
    }

    /// Build the client.
    ///
    /// Must be called from within a Tokio runtime; the dispatch workers are
    /// spawned here.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn build(self) -> anyhow::Result<Client> {
        let api = ApiClient::new(self.api_base_url)?;
        let (outbound_tx, outbound_rx) = mpsc::channel(constants::OUTBOUND_QUEUE_CAPACITY);

        Ok(Client {
            inner: Arc::new(Inner {
                bot_token: self.bot_token,
                api,
                directory: Directory::new(),
                dispatcher: Dispatcher::new(self.dispatch_workers),
                publisher: self
                    .user_token
                    .filter(|token| !token.is_empty())
                    .map(FilePublisher::new),
                state: StateCell::default(),
                closed: AtomicBool::new(false),
                session: Mutex::new(None),
                cancel: Notify::new(),
                idle: Notify::new(),
                outbound_tx,
                outbound: tokio::sync::Mutex::new(outbound_rx),
                retry_delay: self.retry_delay,
                pong_wait: self.pong_wait,
            }),
        })
    }
}

/// Shared state behind every [`Client`] clone.
pub(crate) struct Inner {
    pub(crate) bot_token: String,
    pub(crate) api: ApiClient,
    pub(crate) directory: Directory,
    pub(crate) dispatcher: Dispatcher<Client>,
    pub(crate) publisher: Option<FilePublisher>,
    state: StateCell,
    /// Set once by `close`; never cleared.
    closed: AtomicBool,
    session: Mutex<Option<Session>>,
    /// Wakes a `connect` retry loop that is sleeping when `close` runs.
    cancel: Notify,
    /// Signalled whenever a teardown reaches `Disconnected`.
    idle: Notify,
    outbound_tx: mpsc::Sender<OutboundRequest>,
    /// Receiving end of the outbound queue, owned by the live write pump.
    pub(crate) outbound: tokio::sync::Mutex<mpsc::Receiver<OutboundRequest>>,
    pub(crate) pong_wait: Duration,
    retry_delay: Duration,
}

/// Slack RTM client.
///
/// Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<Inner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("api", &self.inner.api.base_url())
            .field("file_publishing", &self.inner.publisher.is_some())
            .field("dispatcher", &self.inner.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Start building a client for `bot_token`.
    #[must_use]
    pub fn builder(bot_token: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            bot_token: bot_token.into(),
            user_token: None,
            api_base_url: constants::SLACK_API_BASE_URL.to_string(),
            retry_delay: constants::SESSION_RETRY_DELAY,
            pong_wait: constants::PONG_WAIT,
            dispatch_workers: constants::DISPATCH_WORKERS,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.load()
    }

    /// Whether a session is live.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current directory snapshot.
    #[must_use]
    pub fn directory(&self) -> Arc<Snapshot> {
        self.inner.directory.snapshot()
    }

    /// Whether `event` was sent by the bridge itself.
    #[must_use]
    pub fn is_self_message(&self, event: &Event) -> bool {
        let snapshot = self.inner.directory.snapshot();
        let self_id = &snapshot.self_info().id;
        !self_id.is_empty() && event.user_id == *self_id
    }

    /// Register `handler` for events of `kind`.
    ///
    /// Handlers are append-only and may be registered before or after
    /// `connect`.
    pub fn handle_func<F, Fut>(&self, kind: &str, handler: F)
    where
        F: Fn(Client, Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.dispatcher.register(kind, dispatch::handler(handler));
    }

    /// Queue a message for `channel_name`.
    ///
    /// Waits while the outbound queue is full. Messages to unknown channels
    /// are dropped by the write pump.
    pub async fn send(&self, channel_name: &str, text: &str) {
        let request = OutboundRequest {
            channel_name: channel_name.to_string(),
            text: text.to_string(),
        };
        // Inner owns the receiver, so the queue cannot be closed here.
        if self.inner.outbound_tx.send(request).await.is_err() {
            log::warn!("[Slack] Outbound queue closed");
        }
    }

    /// Connect, retrying bootstrap and handshake until a session is live.
    ///
    /// Dispatches `connected` once the pumps are running.
    ///
    /// # Errors
    ///
    /// [`SlackError::AlreadyActive`] if the client is not disconnected,
    /// [`SlackError::Cancelled`] if `close` runs while still connecting,
    /// [`SlackError::Closed`] if `close` has already run.
    pub async fn connect(&self) -> Result<(), SlackError> {
        if self.is_closed() {
            return Err(SlackError::Closed);
        }
        if !self
            .inner
            .state
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
        {
            return Err(SlackError::AlreadyActive(self.state()));
        }
        // close() latches before it looks at the state, so one of the two
        // sides always sees the other.
        if self.is_closed() {
            self.inner
                .state
                .transition(ConnectionState::Connecting, ConnectionState::Disconnected);
            return Err(SlackError::Closed);
        }
        log::info!("[Slack] Connecting to {}", self.inner.api.base_url());

        let mut socket = loop {
            match session::establish(self).await {
                Ok(socket) => break Some(socket),
                Err(e) => {
                    log::warn!(
                        "[Slack] Connect failed: {e:#}; retrying in {:?}",
                        self.inner.retry_delay
                    );
                }
            }

            let cancelled = self.inner.cancel.notified();
            tokio::pin!(cancelled);
            cancelled.as_mut().enable();
            if self.state() != ConnectionState::Connecting {
                return Err(SlackError::Cancelled);
            }
            tokio::select! {
                () = tokio::time::sleep(self.inner.retry_delay) => {}
                () = &mut cancelled => {}
            }
            if self.state() != ConnectionState::Connecting {
                return Err(SlackError::Cancelled);
            }
        };

        {
            // Held until the session is stored so a racing teardown always
            // finds it.
            let mut slot = lock(&self.inner.session);
            if self
                .inner
                .state
                .transition(ConnectionState::Connecting, ConnectionState::Connected)
            {
                if let Some((writer, reader)) = socket.take() {
                    *slot = Some(Session::start(self, writer, reader));
                }
            }
        }
        if let Some((mut writer, _reader)) = socket {
            // close() won while the handshake was finishing.
            let _ = writer.close().await;
            return Err(SlackError::Cancelled);
        }

        log::info!("[Slack] Connected");
        self.inner
            .dispatcher
            .dispatch(self, Event::synthetic(kind::CONNECTED));
        Ok(())
    }

    /// Close the client for good.
    ///
    /// Dispatches `shutdown`, then tears down the live session (waiting for
    /// both pumps) or cancels a `connect` still in progress. If a transport
    /// teardown is already running, waits for it to finish. No
    /// `disconnected` event follows a deliberate close, and every later
    /// `connect` fails with [`SlackError::Closed`].
    pub async fn close(&self) {
        log::info!("[Slack] Closing");
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner
            .dispatcher
            .dispatch(self, Event::synthetic(kind::SHUTDOWN));

        if self
            .inner
            .state
            .transition(ConnectionState::Connecting, ConnectionState::Disconnected)
        {
            self.inner.cancel.notify_waiters();
            return;
        }
        if !self.teardown().await {
            self.wait_idle().await;
        }
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Wait until no teardown is in progress.
    async fn wait_idle(&self) {
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.state() != ConnectionState::Disconnecting {
                return;
            }
            idle.await;
        }
    }

    /// Tear down after a transport failure.
    ///
    /// Safe to call from any number of tasks at once: only the first caller
    /// tears down and dispatches `disconnected`.
    pub(crate) async fn handle_disconnect(self) {
        if self.teardown().await {
            log::info!("[Slack] Disconnected");
            self.inner
                .dispatcher
                .dispatch(&self, Event::synthetic(kind::DISCONNECTED));
        }
    }

    /// Stop the live session; true only for the caller that won the race.
    async fn teardown(&self) -> bool {
        if !self
            .inner
            .state
            .transition(ConnectionState::Connected, ConnectionState::Disconnecting)
        {
            return false;
        }

        let session = lock(&self.inner.session).take();
        if let Some(session) = session {
            session.stop().await;
        }
        self.inner.state.store(ConnectionState::Disconnected);
        self.inner.idle.notify_waiters();
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
