//! Transport trait, the abstraction over chat backends
//!
//! All chat backends (Slack RTM, webhooks, in-memory, etc.) implement
//! `Transport` to give the bot a uniform way to receive events, post
//! messages, and look up channel and user metadata.

use crate::error::Result;
use crate::types::{
    BotIdentity, ChannelInfo, OutgoingMessage, PostedMessage, TransportEvent, UserInfo,
};
use async_trait::async_trait;

pub mod memory;

/// Core trait for chat backends
///
/// Connection management (reconnects, backoff) lives inside the
/// implementation; the bot only consumes the resulting event stream.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the inbound event stream and start managing the connection
    async fn connect(&self) -> Result<Box<dyn EventStream>>;

    /// The bot's own identity, or `None` while the connection is not ready
    async fn identity(&self) -> Result<Option<BotIdentity>>;

    /// Post a message to a channel
    async fn post_message(&self, channel: &str, message: OutgoingMessage)
        -> Result<PostedMessage>;

    /// Look up a channel by name (with or without `#`) or id
    ///
    /// A miss is `Ok(None)`; `Err` is reserved for transport failures.
    async fn channel_info(&self, identifier: &str) -> Result<Option<ChannelInfo>>;

    /// Look up a user by name (with or without `@`), id, or real name
    ///
    /// A miss is `Ok(None)`; `Err` is reserved for transport failures.
    async fn user_info(&self, identifier: &str) -> Result<Option<UserInfo>>;

    /// Transport name (e.g., "slack", "memory")
    fn name(&self) -> &str;
}

/// Async stream of inbound transport events
#[async_trait]
pub trait EventStream: Send {
    /// Receive the next event; `None` once the connection is closed for good
    async fn next(&mut self) -> Option<TransportEvent>;
}

/// Strip a leading sigil (`#`, `@`) from a human-friendly identifier
pub(crate) fn strip_sigil<'a>(identifier: &'a str, sigil: char) -> &'a str {
    identifier.strip_prefix(sigil).unwrap_or(identifier)
}
