//! Relay between one Slack channel and one IRC channel.
//!
//! # Architecture
//!
//! ```text
//! Slack Client ──handlers──► IrcClient::privmsg                      (Slack → IRC)
//! IrcEvent rx ──irc loop──► relay queue ──relay task──► Client::send  (IRC → Slack)
//! ```
//!
//! The IRC loop only ever `try_send`s into the relay queue. While Slack is
//! down the relay task waits on the Slack outbound queue, the relay queue
//! fills up and further IRC lines are dropped, but IRC events keep being
//! drained and the IRC connection stays healthy.
//!
//! Slack reconnects from its `disconnected` handler; IRC reconnects from
//! the IRC event loop. Both sides post a status notice to the other when
//! their connection state changes.

// Rust guideline compliant 2026-02

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::config::{Config, IrcAuth};
use crate::constants;
use crate::irc::{IrcClient, IrcConfig, IrcEvent};
use crate::slack::{kind, Client, Event, SlackError};

/// Slack text for an IRC channel message.
#[must_use]
pub fn irc_line(nick: &str, text: &str) -> String {
    format!("[{nick}]: {text}")
}

/// Slack text for an IRC `/me` action.
#[must_use]
pub fn irc_action(nick: &str, text: &str) -> String {
    format!(" * {nick} {text}")
}

/// IRC lines for a Slack message; IRC cannot carry newlines, blank lines
/// are dropped.
#[must_use]
pub fn slack_to_irc_lines(sender: &str, body: &str) -> Vec<String> {
    format!("[{sender}]: {body}")
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// A running bridge.
#[derive(Debug)]
pub struct Bridge {
    slack: Client,
    irc: IrcClient,
    die: Arc<Notify>,
    irc_loop: JoinHandle<()>,
    relay: JoinHandle<()>,
}

impl Bridge {
    /// Build both clients, wire the relay and start connecting.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the Slack client cannot be built.
    pub fn start(config: &Config) -> Result<Self> {
        let mut builder = Client::builder(config.slack_bot_token.clone())
            .api_base_url(config.slack_api_url.clone());
        if let Some(token) = &config.slack_user_token {
            builder = builder.user_token(token.clone());
        }
        let slack = builder.build()?;

        let mut irc_config = IrcConfig::new(config.irc_server.clone(), config.irc_nick.clone());
        irc_config.tls = config.irc_tls;
        let (irc, irc_events) = IrcClient::new(irc_config);

        let die = Arc::new(Notify::new());
        register_slack_handlers(
            &slack,
            &irc,
            &config.slack_channel,
            &config.irc_channel,
            &die,
        );

        let (to_slack, relay) = spawn_slack_relay(slack.clone(), config.slack_channel.clone());
        let irc_loop = tokio::spawn(run_irc(
            irc.clone(),
            irc_events,
            to_slack,
            config.irc_channel.clone(),
            config.irc_auth.clone(),
        ));

        tokio::spawn({
            let slack = slack.clone();
            async move {
                if let Err(e) = slack.connect().await {
                    log::warn!("[Bridge] Slack connect ended: {e}");
                }
            }
        });

        log::info!(
            "[Bridge] Relaying Slack #{} <-> IRC {} on {}",
            config.slack_channel,
            config.irc_channel,
            config.irc_server
        );
        Ok(Self {
            slack,
            irc,
            die,
            irc_loop,
            relay,
        })
    }

    /// Slack client of this bridge.
    #[must_use]
    pub fn slack(&self) -> &Client {
        &self.slack
    }

    /// Resolves once a Slack admin has sent `die`.
    pub async fn died(&self) {
        self.die.notified().await;
    }

    /// Close Slack, then leave IRC.
    pub async fn shutdown(self) {
        log::info!("[Bridge] Shutting down");
        // Stop reacting to IRC first so the QUIT does not trigger a reconnect.
        self.irc_loop.abort();
        self.relay.abort();
        self.slack.close().await;
        // Let the shutdown handler post its notice before QUIT is queued.
        tokio::time::sleep(constants::SHUTDOWN_GRACE).await;
        self.irc.quit();
    }
}

fn register_slack_handlers(
    slack: &Client,
    irc: &IrcClient,
    slack_channel: &str,
    irc_channel: &str,
    die: &Arc<Notify>,
) {
    let notify_irc = |text: &'static str| {
        let irc = irc.clone();
        let irc_channel = irc_channel.to_string();
        move |_client: Client, _event: Arc<Event>| {
            log::info!("[Bridge] {text}");
            irc.privmsg(&irc_channel, text);
            async {}
        }
    };

    slack.handle_func(kind::CONNECTED, notify_irc("Connected to Slack."));
    slack.handle_func(kind::SHUTDOWN, notify_irc("Shutting down slack client"));

    {
        let irc = irc.clone();
        let irc_channel = irc_channel.to_string();
        slack.handle_func(kind::DISCONNECTED, move |client, _event| {
            log::info!("[Bridge] Disconnected from Slack. Reconnecting...");
            irc.privmsg(&irc_channel, "Disconnected from Slack. Reconnecting...");
            async move {
                match client.connect().await {
                    Ok(()) | Err(SlackError::Cancelled | SlackError::Closed) => {}
                    Err(e) => log::warn!("[Bridge] Slack reconnect: {e}"),
                }
            }
        });
    }

    {
        let die = Arc::clone(die);
        slack.handle_func(kind::ADMIN_COMMAND, move |_client, event| {
            if event.body() == "die" {
                log::info!("[Bridge] die requested by {}", event.sender());
                die.notify_one();
            }
            async {}
        });
    }

    {
        let irc = irc.clone();
        let irc_channel = irc_channel.to_string();
        let slack_channel = slack_channel.to_string();
        slack.handle_func(kind::MESSAGE, move |client, event| {
            if event.channel() == slack_channel
                && !client.is_self_message(&event)
                && !event.body().is_empty()
            {
                for line in slack_to_irc_lines(event.sender(), event.body()) {
                    irc.privmsg(&irc_channel, &line);
                }
            }
            async {}
        });
    }
}

/// Spawn the task that posts IRC-side text to the Slack channel.
fn spawn_slack_relay(
    slack: Client,
    slack_channel: String,
) -> (mpsc::Sender<String>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<String>(constants::SLACK_RELAY_BUFFER);
    let task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            slack.send(&slack_channel, &text).await;
        }
    });
    (tx, task)
}

/// Queue `text` for Slack without waiting.
fn relay_to_slack(to_slack: &mpsc::Sender<String>, text: String) {
    match to_slack.try_send(text) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(text)) => {
            log::warn!("[Bridge] Slack is backed up, dropping: {text}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            log::warn!("[Bridge] Slack relay stopped");
        }
    }
}

/// Drive the IRC side: connect, react to events, reconnect.
async fn run_irc(
    irc: IrcClient,
    mut events: mpsc::Receiver<IrcEvent>,
    to_slack: mpsc::Sender<String>,
    irc_channel: String,
    auth: Option<IrcAuth>,
) {
    connect_irc(&irc).await;

    while let Some(event) = events.recv().await {
        match event {
            IrcEvent::Connected { nick } => {
                if let Some(auth) = &auth {
                    log::info!("[Bridge] Authenticating {nick} with {}", auth.target);
                    tokio::time::sleep(constants::IRC_AUTH_DELAY).await;
                    irc.privmsg(&auth.target, &auth.message);
                    tokio::time::sleep(constants::IRC_AUTH_SETTLE).await;
                }
                irc.join(&irc_channel);
                relay_to_slack(&to_slack, "Connected to IRC.".to_string());
                log::info!("[Bridge] Connected to IRC.");
            }
            IrcEvent::Disconnected { reason } => {
                log::info!("[Bridge] Disconnected from IRC ({reason}). Reconnecting...");
                relay_to_slack(&to_slack, "Disconnected from IRC. Reconnecting...".to_string());
                connect_irc(&irc).await;
            }
            IrcEvent::Privmsg { nick, target, text } if target == irc_channel => {
                relay_to_slack(&to_slack, irc_line(&nick, &text));
            }
            IrcEvent::Action { nick, target, text } if target == irc_channel => {
                relay_to_slack(&to_slack, irc_action(&nick, &text));
            }
            IrcEvent::Privmsg { .. } | IrcEvent::Action { .. } => {}
        }
    }
}

/// Dial IRC until it succeeds.
async fn connect_irc(irc: &IrcClient) {
    loop {
        match irc.connect().await {
            Ok(()) => return,
            Err(e) => {
                log::warn!(
                    "[Bridge] IRC connect to {} failed: {e:#}; retrying in {:?}",
                    irc.config().server,
                    constants::IRC_RECONNECT_DELAY
                );
                tokio::time::sleep(constants::IRC_RECONNECT_DELAY).await;
            }
        }
    }
}
