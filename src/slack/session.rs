//! One live RTM session: handshake, read pump and write pump.
//!
//! # Architecture
//!
//! ```text
//! establish(): rtm.start ──► Directory::replace_all ──► ws::connect ──► await hello
//!
//!                 ┌──────────── watch<bool> shutdown ────────────┐
//!                 ▼                                              ▼
//! socket ──► read_pump ──► handle_frame ──► Dispatcher     write_pump ◄── outbound queue
//!                │                                              │   └──── ping ticker
//!                └──── on failure: spawn(handle_disconnect) ◄───┘
//! ```
//!
//! The pumps never tear the session down themselves. On a transport failure
//! they spawn [`Client::handle_disconnect`] and return, so the teardown can
//! await both pump handles without waiting on itself.

// Rust guideline compliant 2026-02

use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::client::Client;
use super::directory::Snapshot;
use super::markup;
use super::types::{kind, Event, FilePublicEvent, KindTag, UserEvent};
use crate::constants;
use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// Handles to the tasks of one live session.
#[derive(Debug)]
pub(crate) struct Session {
    shutdown: watch::Sender<bool>,
    read: JoinHandle<()>,
    write: JoinHandle<()>,
}

impl Session {
    /// Spawn both pumps for a freshly handshaken socket.
    pub(crate) fn start(client: &Client, writer: WsWriter, reader: WsReader) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let read = tokio::spawn(read_pump(client.clone(), reader, shutdown_rx.clone()));
        let write = tokio::spawn(write_pump(client.clone(), writer, shutdown_rx));
        Self {
            shutdown,
            read,
            write,
        }
    }

    /// Signal both pumps and wait until they have exited.
    pub(crate) async fn stop(self) {
        // Err only means every receiver is gone, i.e. both pumps already exited.
        let _ = self.shutdown.send(true);
        for (name, handle) in [("read", self.read), ("write", self.write)] {
            if let Err(e) = handle.await {
                log::warn!("[Slack] {name} pump ended abnormally: {e}");
            }
        }
    }
}

/// Bootstrap a session and open its socket.
///
/// Replaces the directory with the bootstrap snapshot, dials the one-time
/// address and requires `hello` as the first frame.
pub(crate) async fn establish(client: &Client) -> Result<(WsWriter, WsReader)> {
    let start = client
        .inner
        .api
        .start_session(&client.inner.bot_token)
        .await?;

    log::info!(
        "[Slack] Bootstrapped as {} ({}): {} users, {} channels",
        start.self_info.name,
        start.self_info.id,
        start.users.len(),
        start.channels.len()
    );
    client
        .inner
        .directory
        .replace_all(start.self_info, start.users, start.channels);

    let (mut writer, mut reader) = ws::connect(&start.url).await?;
    if let Err(e) = await_hello(&mut reader, client.inner.pong_wait).await {
        let _ = writer.close().await;
        return Err(e);
    }
    Ok((writer, reader))
}

/// Wait for the `hello` marker, ignoring control frames.
async fn await_hello(reader: &mut WsReader, wait: Duration) -> Result<()> {
    let first = tokio::time::timeout(wait, async {
        loop {
            match reader.recv().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(text),
                Some(Ok(WsMessage::Pong)) => continue,
                Some(Ok(WsMessage::Close { code, reason })) => {
                    anyhow::bail!("socket closed before hello ({code}: {reason})")
                }
                Some(Err(e)) => return Err(e),
                None => anyhow::bail!("socket ended before hello"),
            }
        }
    })
    .await
    .context("timed out waiting for hello")??;

    let tag: KindTag =
        serde_json::from_str(&first).context("first frame is not a JSON event")?;
    if tag.kind != kind::HELLO {
        anyhow::bail!("expected hello as first frame, got '{}'", tag.kind);
    }
    Ok(())
}

/// Read frames until the socket fails or the session is shut down.
async fn read_pump(client: Client, mut reader: WsReader, mut shutdown: watch::Receiver<bool>) {
    let pong_wait = client.inner.pong_wait;
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => {
                log::debug!("[Slack] Read pump stopping");
                return;
            }
            frame = tokio::time::timeout_at(deadline, reader.recv()) => frame,
        };

        match frame {
            Err(_) => {
                log::warn!("[Slack] No pong within {pong_wait:?}, socket considered dead");
                break;
            }
            Ok(None) => {
                log::warn!("[Slack] Socket ended");
                break;
            }
            Ok(Some(Err(e))) => {
                log::warn!("[Slack] Read failed: {e:#}");
                break;
            }
            Ok(Some(Ok(WsMessage::Close { code, reason }))) => {
                log::info!("[Slack] Server closed socket: {code} {reason}");
                break;
            }
            Ok(Some(Ok(WsMessage::Pong))) => deadline = Instant::now() + pong_wait,
            Ok(Some(Ok(WsMessage::Text(text)))) => handle_frame(&client, &text),
        }
    }

    tokio::spawn(client.handle_disconnect());
}

/// Classify one inbound frame and route it.
pub(crate) fn handle_frame(client: &Client, text: &str) {
    log::trace!("[Slack] <- {text}");

    let tag: KindTag = match serde_json::from_str(text) {
        Ok(tag) => tag,
        Err(e) => {
            log::warn!("[Slack] Skipping undecodable frame: {e}");
            return;
        }
    };

    match tag.kind.as_str() {
        kind::FILE_PUBLIC if client.inner.publisher.is_some() => {
            match serde_json::from_str::<FilePublicEvent>(text) {
                Ok(FilePublicEvent { file_id }) => {
                    let client = client.clone();
                    tokio::spawn(async move {
                        if let Some(publisher) = client.inner.publisher.as_ref() {
                            publisher.publish(&client, &file_id).await;
                        }
                    });
                }
                Err(e) => log::warn!("[Slack] Malformed file_public frame: {e}"),
            }
        }
        kind::USER_CHANGE | kind::TEAM_JOIN => {
            match serde_json::from_str::<UserEvent>(text) {
                Ok(UserEvent { user }) => {
                    log::debug!("[Slack] {} for {}", tag.kind, user.id);
                    client.inner.directory.patch_user(user);
                }
                Err(e) => log::warn!("[Slack] Malformed {} frame: {e}", tag.kind),
            }
            return;
        }
        _ => {}
    }

    let mut event: Event = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            log::warn!("[Slack] Skipping undecodable '{}' event: {e}", tag.kind);
            return;
        }
    };

    if event.kind == kind::PRESENCE_CHANGE && !event.user_id.is_empty() {
        client
            .inner
            .directory
            .touch_presence(&event.user_id, &event.presence, SystemTime::now());
    }

    let snapshot = client.inner.directory.snapshot();
    event.text = markup::normalize(&event.text, &snapshot);
    snapshot.resolve_names(&mut event);
    classify_command(&mut event, &snapshot);

    client.inner.dispatcher.dispatch(client, event);
}

/// Reclassify a message addressed to the bridge as `command`/`admincommand`.
///
/// Works on already-normalized text, so a leading `<@UBOT>` has become
/// `@<self display name>`.
pub(crate) fn classify_command(event: &mut Event, snapshot: &Snapshot) {
    let name = snapshot.self_display_name();
    if name.is_empty() {
        return;
    }
    let Some(rest) = event
        .text
        .strip_prefix('@')
        .and_then(|text| text.strip_prefix(name))
    else {
        return;
    };

    event.text = rest.trim().to_string();
    event.kind = kind::COMMAND.to_string();
    if snapshot.user(&event.user_id).is_some_and(|user| user.is_admin) {
        log::info!("[Slack] Admin command from {}: {}", event.user_name, event.text);
        event.kind = kind::ADMIN_COMMAND.to_string();
    }
}

/// Drain the outbound queue and keep the socket alive until shutdown.
async fn write_pump(client: Client, mut writer: WsWriter, mut shutdown: watch::Receiver<bool>) {
    let period = constants::ping_period(client.inner.pong_wait);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Held for the life of the session; the previous session's pump has
    // always exited before a new one starts.
    let mut queue = client.inner.outbound.lock().await;
    let mut next_id: i64 = 1;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                log::debug!("[Slack] Write pump stopping");
                if let Err(e) = writer.close().await {
                    log::debug!("[Slack] Close frame not sent: {e:#}");
                }
                return;
            }
            request = queue.recv() => {
                // The client owns the sender, so the queue only closes with it.
                let Some(request) = request else { return };
                let snapshot = client.inner.directory.snapshot();
                let Some(event) = snapshot.address(request.clone(), next_id) else {
                    log::warn!(
                        "[Slack] Unknown channel '{}', dropping message",
                        request.channel_name
                    );
                    continue;
                };

                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::warn!("[Slack] Could not encode outbound message: {e}");
                        continue;
                    }
                };
                log::trace!("[Slack] -> {frame}");
                if let Err(e) = writer.send_text(&frame).await {
                    log::warn!("[Slack] Write failed: {e:#}");
                    break;
                }
                next_id += 1;
            }
            _ = ticker.tick() => {
                if let Err(e) = writer.send_ping().await {
                    log::warn!("[Slack] Ping failed: {e:#}");
                    break;
                }
            }
        }
    }

    drop(queue);
    tokio::spawn(client.handle_disconnect());
}
