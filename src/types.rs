//! Core message types for the a3s-bot runtime
//!
//! All wire-facing types use camelCase JSON serialization, matching the
//! rest of the A3S crates.

use serde::{Deserialize, Serialize};

/// An inbound chat message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    /// Channel the message was posted in
    pub channel: String,

    /// Sender identifier (empty for system messages)
    pub user: String,

    /// Message text
    pub text: String,

    /// Transport-assigned identifier of this message
    pub timestamp: String,

    /// Thread root identifier, if the message was posted in a thread
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,

    /// Whether the message was sent in a one-to-one conversation with the bot
    #[serde(default)]
    pub direct: bool,
}

impl MessageEvent {
    /// Create a top-level channel message
    pub fn new(
        channel: impl Into<String>,
        user: impl Into<String>,
        text: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            user: user.into(),
            text: text.into(),
            timestamp: timestamp.into(),
            thread: None,
            direct: false,
        }
    }

    /// Mark the message as posted in the given thread
    pub fn in_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    /// Mark the message as a one-to-one message
    pub fn direct(mut self) -> Self {
        self.direct = true;
        self
    }

    /// Thread key used for exchange correlation (empty when not threaded)
    pub fn thread_key(&self) -> &str {
        self.thread.as_deref().unwrap_or("")
    }
}

/// Events delivered by a transport's event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection was (re)established
    Connected { connection_count: u32 },
    /// A chat message was received
    Message(MessageEvent),
    /// A non-fatal transport error
    Error(String),
    /// The transport rejected the credentials; serving must stop
    InvalidCredentials,
}

/// A message to post through the transport
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    /// Message text
    pub text: String,

    /// Thread to reply in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,

    /// Post as the bot user rather than as an app
    #[serde(default)]
    pub as_user: bool,

    /// Rich attachments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl OutgoingMessage {
    /// Create a plain text message
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Reply inside the given thread
    pub fn in_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    /// Add an attachment
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Rich message attachment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub pretext: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<AttachmentField>,
}

/// A titled field inside an attachment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    #[serde(default)]
    pub short: bool,
}

/// Result of a successful post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    /// Channel the message landed in
    pub channel: String,
    /// Transport-assigned timestamp of the posted message
    pub timestamp: String,
}

/// The bot's own identity, as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: String,
    pub name: String,
}

impl BotIdentity {
    /// Prefix a message must start with to address the bot in a channel
    pub fn mention_prefix(&self) -> String {
        format!("<@{}> ", self.id)
    }
}

/// Channel metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
}

/// User metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub real_name: String,
}

/// Outcome of resolving a human-friendly identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Channel(ChannelInfo),
    User(UserInfo),
    NotFound,
}

impl Resolved {
    /// The resolved identifier, if any
    pub fn id(&self) -> Option<&str> {
        match self {
            Resolved::Channel(c) => Some(&c.id),
            Resolved::User(u) => Some(&u.id),
            Resolved::NotFound => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_key() {
        let ev = MessageEvent::new("C1", "U1", "hi", "1.0");
        assert_eq!(ev.thread_key(), "");
        let ev = ev.in_thread("0.5");
        assert_eq!(ev.thread_key(), "0.5");
    }

    #[test]
    fn test_outgoing_message_serialization() {
        let msg = OutgoingMessage::text("hello").in_thread("1.0");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["text"], "hello");
        assert_eq!(json["thread"], "1.0");
        assert_eq!(json["asUser"], false);
        assert!(json.get("attachments").is_none());
    }

    #[test]
    fn test_mention_prefix() {
        let id = BotIdentity {
            id: "B1".to_string(),
            name: "bee".to_string(),
        };
        assert_eq!(id.mention_prefix(), "<@B1> ");
    }

    #[test]
    fn test_resolved_id() {
        let r = Resolved::Channel(ChannelInfo {
            id: "C1".to_string(),
            name: "general".to_string(),
        });
        assert_eq!(r.id(), Some("C1"));
        assert_eq!(Resolved::NotFound.id(), None);
    }
}
