//! Wire types for the Slack Web API and the RTM event stream.
//!
//! Inbound frames are decoded leniently: every field the bridge does not
//! strictly need carries `#[serde(default)]` so that a frame with missing
//! fields still decodes. Display names (`channel_name`, `user_name`) are
//! never on the wire; the read pump fills them from the directory.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Well-known event kinds.
///
/// Kinds are open strings; anything Slack sends can be registered for.
pub mod kind {
    /// First frame on every fresh socket.
    pub const HELLO: &str = "hello";
    /// A chat message.
    pub const MESSAGE: &str = "message";
    /// Synthesized once a session is up.
    pub const CONNECTED: &str = "connected";
    /// Synthesized once a transport failure has been fully torn down.
    pub const DISCONNECTED: &str = "disconnected";
    /// Synthesized when the client is closed deliberately.
    pub const SHUTDOWN: &str = "shutdown";
    /// A message that starts with a mention of the bridge itself.
    pub const COMMAND: &str = "command";
    /// A command sent by a workspace admin.
    pub const ADMIN_COMMAND: &str = "admincommand";
    /// Bookkeeping: a user's profile changed.
    pub const USER_CHANGE: &str = "user_change";
    /// Bookkeeping: a user joined the workspace.
    pub const TEAM_JOIN: &str = "team_join";
    /// A user's presence changed.
    pub const PRESENCE_CHANGE: &str = "presence_change";
    /// A file was made public.
    pub const FILE_PUBLIC: &str = "file_public";
    /// Error reported by the RTM server.
    pub const ERROR: &str = "error";
}

/// Identity of the bridge's own session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SelfInfo {
    /// User ID of the bot.
    #[serde(default)]
    pub id: String,
    /// Login name of the bot.
    #[serde(default)]
    pub name: String,
}

/// Profile sub-object of a user record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Profile {
    /// Display name chosen by the user (may be empty).
    #[serde(default)]
    pub display_name: String,
}

/// A workspace member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct User {
    /// Unique user ID (`U…`).
    pub id: String,
    /// Login name.
    #[serde(default)]
    pub name: String,
    /// Full name.
    #[serde(default)]
    pub real_name: String,
    /// Profile data.
    #[serde(default)]
    pub profile: Profile,
    /// Whether the account has been deactivated.
    #[serde(default)]
    pub deleted: bool,
    /// Whether the account is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// Whether the account is a workspace admin.
    #[serde(default)]
    pub is_admin: bool,
    /// `active` or `away`.
    #[serde(default)]
    pub presence: String,
    /// Last time a presence change was observed for this user.
    #[serde(skip)]
    pub last_seen: Option<SystemTime>,
}

impl User {
    /// Name to render for this user: display name, else login name, else ID.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if !self.profile.display_name.is_empty() {
            &self.profile.display_name
        } else if !self.name.is_empty() {
            &self.name
        } else {
            &self.id
        }
    }
}

/// A workspace channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Channel {
    /// Unique channel ID (`C…`).
    pub id: String,
    /// Channel name without the leading `#`.
    #[serde(default)]
    pub name: String,
    /// Whether this is a public channel.
    #[serde(default)]
    pub is_channel: bool,
    /// User ID of the creator.
    #[serde(default, rename = "creator")]
    pub creator_id: String,
    /// Whether the channel is archived.
    #[serde(default, rename = "is_archived")]
    pub archived: bool,
}

/// Error object carried by RTM `error` frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code.
    #[serde(default)]
    pub code: i64,
    /// Error description.
    #[serde(default)]
    pub msg: String,
}

/// A single RTM event, inbound or outbound.
///
/// Once handed to a handler the event is shared as `Arc<Event>` and never
/// mutated again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Connection-scoped sequence number (outbound frames only).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    /// Event kind (`type` on the wire).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Channel ID.
    #[serde(rename = "channel", default, skip_serializing_if = "String::is_empty")]
    pub channel_id: String,
    /// Channel name, resolved from the directory.
    #[serde(skip)]
    pub channel_name: String,
    /// Sender user ID.
    #[serde(rename = "user", default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    /// Sender display name, resolved from the directory.
    #[serde(skip)]
    pub user_name: String,
    /// Message body, normalized for display on inbound events.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Presence (`presence_change` events).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub presence: String,
    /// Message subtype (`bot_message`, `channel_join`, …).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subtype: String,
    /// Team ID.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub team: String,
    /// Slack timestamp.
    #[serde(rename = "ts", default, skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
    /// Error details (`error` events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[allow(clippy::trivially_copy_pass_by_ref, reason = "serde skip_serializing_if signature")]
fn is_zero(id: &i64) -> bool {
    *id == 0
}

impl Event {
    /// Event with only a kind set, used for lifecycle notifications.
    #[must_use]
    pub fn synthetic(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Self::default()
        }
    }

    /// Display name of the sender.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.user_name
    }

    /// Message body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.text
    }

    /// Channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel_name
    }
}

/// Message queued by `Client::send`, addressed by channel name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// Destination channel name (without `#`).
    pub channel_name: String,
    /// Message body.
    pub text: String,
}

/// Response of `rtm.start`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartResponse {
    /// Whether the call succeeded.
    #[serde(default)]
    pub ok: bool,
    /// Error code when `ok` is false.
    #[serde(default)]
    pub error: String,
    /// The bot's own identity.
    #[serde(rename = "self", default)]
    pub self_info: SelfInfo,
    /// All workspace members.
    #[serde(default)]
    pub users: Vec<User>,
    /// All channels.
    #[serde(default)]
    pub channels: Vec<Channel>,
    /// One-time WebSocket address.
    #[serde(default)]
    pub url: String,
}

/// Slack file object as returned by `files.sharedPublicURL`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SharedFile {
    /// File ID.
    pub id: String,
    /// Owning user ID.
    #[serde(rename = "user", default)]
    pub user_id: String,
    /// Public permalink.
    #[serde(rename = "permalink_public", default)]
    pub public_link: String,
    /// Channels the file is shared in.
    #[serde(default)]
    pub channels: Vec<String>,
}

/// Response of `files.sharedPublicURL`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileResponse {
    /// Whether the call succeeded.
    #[serde(default)]
    pub ok: bool,
    /// Error code when `ok` is false.
    #[serde(default)]
    pub error: String,
    /// The file, when `ok` is true.
    #[serde(default)]
    pub file: Option<SharedFile>,
}

/// Frame header: only the `type` tag.
#[derive(Debug, Deserialize)]
pub(crate) struct KindTag {
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// `user_change` / `team_join` frame.
#[derive(Debug, Deserialize)]
pub(crate) struct UserEvent {
    pub user: User,
}

/// `file_public` frame.
#[derive(Debug, Deserialize)]
pub(crate) struct FilePublicEvent {
    pub file_id: String,
}
