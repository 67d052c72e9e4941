//! Public sharing of uploaded files.
//!
//! When a `file_public` frame arrives the publisher asks the Web API for a
//! public permalink and announces it as a synthesized `message` event in
//! every channel the file belongs to. File IDs are remembered once the
//! announcement has been dispatched, so repeated notifications for the same
//! file are no-ops. A failed publish is not remembered and may be retried by
//! a later notification.

use std::collections::HashSet;

use tokio::sync::Mutex;

use super::client::Client;
use super::types::{kind, Event};

/// Text body announcing a shared file.
#[must_use]
pub fn announcement(public_link: &str) -> String {
    format!("has shared a file: {public_link}")
}

/// Makes files public with a user token and announces them.
#[derive(Debug)]
pub struct FilePublisher {
    user_token: String,
    /// Files already announced. The lock is held for the whole publish so
    /// concurrent notifications for the same file serialize.
    published: Mutex<HashSet<String>>,
}

impl FilePublisher {
    /// Create a publisher acting with `user_token`.
    #[must_use]
    pub fn new(user_token: impl Into<String>) -> Self {
        Self {
            user_token: user_token.into(),
            published: Mutex::new(HashSet::new()),
        }
    }

    /// Whether `file_id` has already been announced.
    pub async fn is_published(&self, file_id: &str) -> bool {
        self.published.lock().await.contains(file_id)
    }

    /// Publish `file_id` and dispatch one announcement per channel.
    pub async fn publish(&self, client: &Client, file_id: &str) {
        let mut published = self.published.lock().await;
        if published.contains(file_id) {
            log::debug!("[Files] {file_id} already published");
            return;
        }

        let file = match client
            .inner
            .api
            .share_public_url(&self.user_token, file_id)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                log::warn!("[Files] Publishing {file_id} failed: {e:#}");
                return;
            }
        };

        let snapshot = client.inner.directory.snapshot();
        let text = announcement(&file.public_link);
        for channel_id in &file.channels {
            let mut event = Event {
                kind: kind::MESSAGE.to_string(),
                user_id: file.user_id.clone(),
                channel_id: channel_id.clone(),
                text: text.clone(),
                ..Event::default()
            };
            snapshot.resolve_names(&mut event);
            client.inner.dispatcher.dispatch(client, event);
        }

        log::info!(
            "[Files] Published {file_id} to {} channel(s)",
            file.channels.len()
        );
        published.insert(file_id.to_string());
    }
}
