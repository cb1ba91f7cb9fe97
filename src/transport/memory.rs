//! In-memory transport for testing and single-process use
//!
//! Inbound events are injected through an unbounded channel and every
//! posted message is recorded, so tests can drive the bot end to end
//! without a real chat backend.

use super::{strip_sigil, EventStream, Transport};
use crate::error::{BotError, Result};
use crate::types::{
    BotIdentity, ChannelInfo, OutgoingMessage, PostedMessage, TransportEvent, UserInfo,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// A message recorded by the memory transport
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub channel: String,
    pub message: OutgoingMessage,
    pub timestamp: String,
}

/// In-memory transport
pub struct MemoryTransport {
    identity: RwLock<Option<BotIdentity>>,
    channels: RwLock<Vec<ChannelInfo>>,
    users: RwLock<Vec<UserInfo>>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    sent_notify: Arc<Notify>,
    fail_posts: AtomicBool,
    sequence: AtomicU64,
    tx: mpsc::UnboundedSender<TransportEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

impl MemoryTransport {
    /// Create a transport whose bot identity is immediately available
    pub fn new(identity: BotIdentity) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            identity: RwLock::new(Some(identity)),
            channels: RwLock::new(Vec::new()),
            users: RwLock::new(Vec::new()),
            sent: Arc::new(Mutex::new(Vec::new())),
            sent_notify: Arc::new(Notify::new()),
            fail_posts: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Register a known channel
    pub fn with_channel(self, id: impl Into<String>, name: impl Into<String>) -> Self {
        if let Ok(mut channels) = self.channels.write() {
            channels.push(ChannelInfo {
                id: id.into(),
                name: name.into(),
            });
        }
        self
    }

    /// Register a known user
    pub fn with_user(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        real_name: impl Into<String>,
    ) -> Self {
        if let Ok(mut users) = self.users.write() {
            users.push(UserInfo {
                id: id.into(),
                name: name.into(),
                real_name: real_name.into(),
            });
        }
        self
    }

    /// Replace the reported identity (`None` simulates a connection that never becomes ready)
    pub fn set_identity(&self, identity: Option<BotIdentity>) {
        if let Ok(mut current) = self.identity.write() {
            *current = identity;
        }
    }

    /// Make every subsequent post fail (or succeed again)
    pub fn fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::SeqCst);
    }

    /// Sender for injecting inbound events
    pub fn sender(&self) -> mpsc::UnboundedSender<TransportEvent> {
        self.tx.clone()
    }

    /// Inject a single inbound event
    pub fn push(&self, event: TransportEvent) {
        let _ = self.tx.send(event);
    }

    /// All messages posted so far
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Texts of all messages posted so far
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.message.text).collect()
    }

    /// Wait until at least `count` messages were posted, or the timeout elapses
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.sent_notify.notified();
                if self.sent().len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    fn next_timestamp(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}.{:06}", chrono::Utc::now().timestamp(), seq)
    }
}

struct MemoryEventStream {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl EventStream for MemoryEventStream {
    async fn next(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<Box<dyn EventStream>> {
        let rx = self
            .rx
            .lock()
            .map_err(|e| BotError::Connection(format!("Failed to acquire stream lock: {}", e)))?
            .take()
            .ok_or_else(|| BotError::Connection("memory transport already connected".into()))?;
        Ok(Box::new(MemoryEventStream { rx }))
    }

    async fn identity(&self) -> Result<Option<BotIdentity>> {
        let identity = self
            .identity
            .read()
            .map_err(|e| BotError::Connection(format!("Failed to acquire identity lock: {}", e)))?;
        Ok(identity.clone())
    }

    async fn post_message(
        &self,
        channel: &str,
        message: OutgoingMessage,
    ) -> Result<PostedMessage> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(BotError::Transport {
                channel: channel.to_string(),
                reason: "post rejected by memory transport".to_string(),
            });
        }

        let timestamp = self.next_timestamp();
        {
            let mut sent = self.sent.lock().map_err(|e| BotError::Transport {
                channel: channel.to_string(),
                reason: format!("Failed to acquire sent lock: {}", e),
            })?;
            sent.push(SentMessage {
                channel: channel.to_string(),
                message,
                timestamp: timestamp.clone(),
            });
        }
        self.sent_notify.notify_waiters();

        Ok(PostedMessage {
            channel: channel.to_string(),
            timestamp,
        })
    }

    async fn channel_info(&self, identifier: &str) -> Result<Option<ChannelInfo>> {
        let wanted = strip_sigil(identifier, '#');
        let channels = self
            .channels
            .read()
            .map_err(|e| BotError::Connection(format!("Failed to acquire channel lock: {}", e)))?;
        Ok(channels
            .iter()
            .find(|c| c.name == wanted || c.id == wanted)
            .cloned())
    }

    async fn user_info(&self, identifier: &str) -> Result<Option<UserInfo>> {
        let wanted = strip_sigil(identifier, '@');
        let users = self
            .users
            .read()
            .map_err(|e| BotError::Connection(format!("Failed to acquire user lock: {}", e)))?;
        Ok(users
            .iter()
            .find(|u| u.name == wanted || u.id == wanted || u.real_name == wanted)
            .cloned())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> MemoryTransport {
        MemoryTransport::new(BotIdentity {
            id: "B1".to_string(),
            name: "bee".to_string(),
        })
        .with_channel("C1", "general")
        .with_user("U1", "alice", "Alice Liddell")
    }

    #[tokio::test]
    async fn test_post_records_message() {
        let t = transport();
        let posted = t
            .post_message("C1", OutgoingMessage::text("hello"))
            .await
            .unwrap();

        assert_eq!(posted.channel, "C1");
        assert_eq!(t.sent_texts(), vec!["hello"]);
        assert_eq!(t.sent()[0].timestamp, posted.timestamp);
    }

    #[tokio::test]
    async fn test_post_failure() {
        let t = transport();
        t.fail_posts(true);
        let result = t.post_message("C1", OutgoingMessage::text("x")).await;
        assert!(matches!(result, Err(BotError::Transport { .. })));
        assert!(t.sent().is_empty());
    }

    #[tokio::test]
    async fn test_channel_lookup() {
        let t = transport();
        assert_eq!(t.channel_info("#general").await.unwrap().unwrap().id, "C1");
        assert_eq!(t.channel_info("general").await.unwrap().unwrap().id, "C1");
        assert_eq!(t.channel_info("C1").await.unwrap().unwrap().name, "general");
        assert!(t.channel_info("#random").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_lookup() {
        let t = transport();
        assert_eq!(t.user_info("@alice").await.unwrap().unwrap().id, "U1");
        assert_eq!(t.user_info("Alice Liddell").await.unwrap().unwrap().id, "U1");
        assert_eq!(t.user_info("U1").await.unwrap().unwrap().name, "alice");
        assert!(t.user_info("@bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connect_once() {
        let t = transport();
        let mut stream = t.connect().await.unwrap();
        assert!(t.connect().await.is_err());

        t.push(TransportEvent::Connected { connection_count: 1 });
        assert_eq!(
            stream.next().await,
            Some(TransportEvent::Connected { connection_count: 1 })
        );
    }

    #[tokio::test]
    async fn test_wait_for_sent() {
        let t = Arc::new(transport());
        let t2 = Arc::clone(&t);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            t2.post_message("C1", OutgoingMessage::text("late")).await.unwrap();
        });

        assert!(t.wait_for_sent(1, Duration::from_secs(2)).await);
        assert!(!t.wait_for_sent(5, Duration::from_millis(50)).await);
    }
}
