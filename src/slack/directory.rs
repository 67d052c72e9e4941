//! Identity and channel name resolution.
//!
//! The directory publishes immutable [`Snapshot`]s through an `ArcSwap`.
//! Readers (read pump, write pump, handlers) load the current snapshot
//! without locking and always see one consistent whole. Writers never
//! mutate a published snapshot: bootstrap builds a fresh one from scratch,
//! bookkeeping events copy the current one, patch the copy and publish it.
//!
//! Channels are dual-indexed (by ID and by name). Both indices hold the same
//! `Arc<Channel>` and are only ever built together in [`Snapshot::build`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;

use super::types::{kind, Channel, Event, OutboundRequest, SelfInfo, User};

/// One consistent view of the workspace.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    self_info: SelfInfo,
    users: HashMap<String, Arc<User>>,
    channels_by_id: HashMap<String, Arc<Channel>>,
    channels_by_name: HashMap<String, Arc<Channel>>,
}

impl Snapshot {
    /// Build a snapshot from a bootstrap response.
    #[must_use]
    pub fn build(self_info: SelfInfo, users: Vec<User>, channels: Vec<Channel>) -> Self {
        let users = users
            .into_iter()
            .map(|user| (user.id.clone(), Arc::new(user)))
            .collect();

        let mut channels_by_id = HashMap::with_capacity(channels.len());
        let mut channels_by_name = HashMap::with_capacity(channels.len());
        for channel in channels {
            let channel = Arc::new(channel);
            channels_by_id.insert(channel.id.clone(), Arc::clone(&channel));
            channels_by_name.insert(channel.name.clone(), channel);
        }

        Self {
            self_info,
            users,
            channels_by_id,
            channels_by_name,
        }
    }

    /// The bridge's own identity.
    #[must_use]
    pub fn self_info(&self) -> &SelfInfo {
        &self.self_info
    }

    /// Name the bridge is mentioned by: its own user record's display name,
    /// else the bootstrap login name.
    #[must_use]
    pub fn self_display_name(&self) -> &str {
        match self.users.get(&self.self_info.id) {
            Some(user) if !user.profile.display_name.is_empty() => &user.profile.display_name,
            _ => &self.self_info.name,
        }
    }

    /// Look up a user by ID.
    #[must_use]
    pub fn user(&self, id: &str) -> Option<&Arc<User>> {
        self.users.get(id)
    }

    /// Look up a channel by ID.
    #[must_use]
    pub fn channel_by_id(&self, id: &str) -> Option<&Arc<Channel>> {
        self.channels_by_id.get(id)
    }

    /// Look up a channel by its current name.
    #[must_use]
    pub fn channel_by_name(&self, name: &str) -> Option<&Arc<Channel>> {
        self.channels_by_name.get(name)
    }

    /// Number of known users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of known channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels_by_id.len()
    }

    /// Fill an event's display names from its IDs.
    ///
    /// Unknown senders fall back to the raw user ID; unknown channels leave
    /// the channel name empty.
    pub fn resolve_names(&self, event: &mut Event) {
        if let Some(channel) = self.channel_by_id(&event.channel_id) {
            event.channel_name.clone_from(&channel.name);
        }
        if !event.user_id.is_empty() {
            event.user_name = self
                .user(&event.user_id)
                .map_or_else(|| event.user_id.clone(), |user| user.display_name().to_string());
        }
    }

    /// Turn an outbound request into a fully addressed message frame.
    ///
    /// Returns `None` if the destination channel name is unknown.
    #[must_use]
    pub fn address(&self, request: OutboundRequest, id: i64) -> Option<Event> {
        let channel = self.channel_by_name(&request.channel_name)?;
        Some(Event {
            id,
            kind: kind::MESSAGE.to_string(),
            channel_id: channel.id.clone(),
            channel_name: request.channel_name,
            text: request.text,
            ..Event::default()
        })
    }
}

/// Atomically swapped directory of users and channels.
#[derive(Debug, Default)]
pub struct Directory {
    current: ArcSwap<Snapshot>,
}

impl Directory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Discard everything and publish a snapshot built from a bootstrap.
    pub fn replace_all(&self, self_info: SelfInfo, users: Vec<User>, channels: Vec<Channel>) {
        let snapshot = Snapshot::build(self_info, users, channels);
        log::debug!(
            "[Slack] Directory rebuilt: {} users, {} channels",
            snapshot.user_count(),
            snapshot.channel_count()
        );
        self.current.store(Arc::new(snapshot));
    }

    /// Insert or replace one user record, keyed by its ID.
    pub fn patch_user(&self, user: User) {
        let user = Arc::new(user);
        self.current.rcu(|current| {
            let mut next = Snapshot::clone(current);
            next.users.insert(user.id.clone(), Arc::clone(&user));
            next
        });
    }

    /// Record a presence change for a known user and stamp its last-seen time.
    ///
    /// Unknown users are ignored.
    pub fn touch_presence(&self, user_id: &str, presence: &str, seen_at: SystemTime) {
        self.current.rcu(|current| {
            let mut next = Snapshot::clone(current);
            if let Some(existing) = next.users.get(user_id) {
                let mut user = User::clone(existing);
                user.presence = presence.to_string();
                user.last_seen = Some(seen_at);
                next.users.insert(user_id.to_string(), Arc::new(user));
            }
            next
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::slack::types::Profile;

    pub(crate) fn user(id: &str, name: &str, display: &str) -> User {
        User {
            id: id.to_string(),
            name: name.to_string(),
            profile: Profile {
                display_name: display.to_string(),
            },
            ..User::default()
        }
    }

    pub(crate) fn channel(id: &str, name: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: name.to_string(),
            is_channel: true,
            ..Channel::default()
        }
    }

    pub(crate) fn sample_directory() -> Directory {
        let directory = Directory::new();
        directory.replace_all(
            SelfInfo {
                id: "UBOT".to_string(),
                name: "bridge".to_string(),
            },
            vec![
                user("U1", "alice_login", "alice"),
                user("U2", "bob", ""),
                user("UBOT", "bridge", ""),
            ],
            vec![channel("C1", "general"), channel("C2", "dev")],
        );
        directory
    }

    #[test]
    fn test_empty_directory_resolves_nothing() {
        let directory = Directory::new();
        let snapshot = directory.snapshot();
        assert!(snapshot.user("U1").is_none());
        assert!(snapshot.channel_by_name("general").is_none());
        assert_eq!(snapshot.self_info(), &SelfInfo::default());
    }

    #[test]
    fn test_channels_reachable_by_id_and_name_share_one_record() {
        let snapshot = sample_directory().snapshot();
        for (id, name) in [("C1", "general"), ("C2", "dev")] {
            let by_id = snapshot.channel_by_id(id).unwrap();
            let by_name = snapshot.channel_by_name(name).unwrap();
            assert!(Arc::ptr_eq(by_id, by_name));
            assert_eq!(by_id.id, id);
            assert_eq!(by_id.name, name);
        }
    }

    #[test]
    fn test_every_user_maps_to_matching_id() {
        let snapshot = sample_directory().snapshot();
        for id in ["U1", "U2", "UBOT"] {
            assert_eq!(snapshot.user(id).unwrap().id, id);
        }
        assert_eq!(snapshot.user_count(), 3);
    }

    #[test]
    fn test_replace_all_discards_previous_session() {
        let directory = sample_directory();
        let old = directory.snapshot();

        directory.replace_all(
            SelfInfo {
                id: "UNEW".to_string(),
                name: "new".to_string(),
            },
            vec![user("U9", "zed", "")],
            vec![channel("C9", "random")],
        );

        let new = directory.snapshot();
        assert!(new.user("U1").is_none());
        assert!(new.channel_by_name("general").is_none());
        assert!(new.channel_by_id("C9").is_some());
        assert_eq!(new.self_info().id, "UNEW");
        // Readers holding the old snapshot keep a consistent view.
        assert!(old.user("U1").is_some());
    }

    #[test]
    fn test_patch_user_publishes_new_snapshot() {
        let directory = sample_directory();
        let before = directory.snapshot();

        directory.patch_user(user("U2", "bob", "Bobby"));
        directory.patch_user(user("U3", "carol", ""));

        let after = directory.snapshot();
        assert_eq!(after.user("U2").unwrap().display_name(), "Bobby");
        assert_eq!(after.user("U3").unwrap().display_name(), "carol");
        assert_eq!(before.user("U2").unwrap().display_name(), "bob");
        assert!(Arc::ptr_eq(
            after.channel_by_id("C1").unwrap(),
            before.channel_by_id("C1").unwrap()
        ));
    }

    #[test]
    fn test_touch_presence_updates_known_user_only() {
        let directory = sample_directory();
        let now = SystemTime::now();
        directory.touch_presence("U1", "away", now);
        directory.touch_presence("UX", "away", now);

        let snapshot = directory.snapshot();
        let alice = snapshot.user("U1").unwrap();
        assert_eq!(alice.presence, "away");
        assert_eq!(alice.last_seen, Some(now));
        assert!(snapshot.user("UX").is_none());
    }

    #[test]
    fn test_resolve_names() {
        let snapshot = sample_directory().snapshot();

        let mut known = Event {
            channel_id: "C2".to_string(),
            user_id: "U1".to_string(),
            ..Event::default()
        };
        snapshot.resolve_names(&mut known);
        assert_eq!(known.channel(), "dev");
        assert_eq!(known.sender(), "alice");

        let mut unknown = Event {
            channel_id: "C404".to_string(),
            user_id: "U404".to_string(),
            ..Event::default()
        };
        snapshot.resolve_names(&mut unknown);
        assert_eq!(unknown.channel(), "");
        assert_eq!(unknown.sender(), "U404");
    }

    #[test]
    fn test_self_display_name_prefers_profile() {
        let directory = sample_directory();
        assert_eq!(directory.snapshot().self_display_name(), "bridge");

        directory.patch_user(user("UBOT", "bridge", "Bridge Bot"));
        assert_eq!(directory.snapshot().self_display_name(), "Bridge Bot");
    }

    #[test]
    fn test_address_resolves_channel_or_drops() {
        let snapshot = sample_directory().snapshot();
        let event = snapshot
            .address(
                OutboundRequest {
                    channel_name: "general".to_string(),
                    text: "hi".to_string(),
                },
                4,
            )
            .unwrap();
        assert_eq!(event.id, 4);
        assert_eq!(event.channel_id, "C1");
        assert_eq!(event.kind, "message");

        assert!(snapshot
            .address(
                OutboundRequest {
                    channel_name: "nope".to_string(),
                    text: "hi".to_string(),
                },
                5,
            )
            .is_none());
    }
}
