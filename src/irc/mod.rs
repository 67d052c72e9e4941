//! IRC side of the bridge.
//!
//! Only what the relay needs: register, stay alive, join one channel,
//! send and receive channel messages.

pub mod client;
pub mod message;

pub use client::{IrcClient, IrcConfig, IrcEvent};
