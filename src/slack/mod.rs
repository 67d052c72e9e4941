//! Slack real-time messaging client.
//!
//! # Architecture
//!
//! ```text
//! Client
//!     │
//!     ├── api        Web API calls (bootstrap, file publishing)
//!     ├── session    handshake, read pump, write pump
//!     ├── directory  users and channels, swapped atomically
//!     ├── markup     message markup → display text
//!     ├── dispatch   handler registry and worker pool
//!     └── files      public file announcements
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let client = Client::builder(bot_token).build()?;
//! client.handle_func(kind::MESSAGE, |client, event| async move {
//!     if !client.is_self_message(&event) {
//!         log::info!("{} in #{}: {}", event.sender(), event.channel(), event.body());
//!     }
//! });
//! client.connect().await?;
//! client.send("general", "hello").await;
//! ```

pub mod api;
pub mod client;
pub mod directory;
pub mod dispatch;
pub mod files;
pub mod markup;
mod session;
pub mod types;

pub use client::{Client, ClientBuilder, ConnectionState, SlackError};
pub use directory::{Directory, Snapshot};
pub use types::{kind, Channel, Event, SelfInfo, User};
