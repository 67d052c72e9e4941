//! slackirc - Slack <-> IRC relay daemon.
//!
//! This crate provides the Slack real-time messaging client, a minimal IRC
//! client and the glue that relays messages between one channel on each
//! network.
//!
//! # Architecture
//!
//! - **Slack** - RTM session client: bootstrap, keepalive, reconnect,
//!   directory bookkeeping, markup normalization, handler dispatch
//! - **IRC** - line-oriented client: registration, keepalive, channel
//!   messages
//! - **Bridge** - relays messages and connection notices both ways
//!
//! # Modules
//!
//! - [`slack`] - Slack RTM client
//! - [`irc`] - IRC client
//! - [`bridge`] - relay glue
//! - [`config`] - configuration loading
//! - [`ws`] - WebSocket transport

// Library modules
pub mod bridge;
pub mod config;
pub mod constants;
pub mod irc;
pub mod slack;
pub mod ws;

// Re-export commonly used types
pub use bridge::Bridge;
pub use config::Config;
pub use slack::{Client, Event};
